//! IBNR loading and derived loss-ratio metrics
//!
//! Takes an aggregated table, loads IBNR from an optional triangle, and fills
//! the derived columns: projected costs/counts, loss ratios, the necessary
//! rate adjustment against a target loss ratio, frequency, average cost, pure
//! premiums and the proposed gross written premium.

use super::table::{AnalysisRow, AnalysisTable, ConservationReport, DerivedMetrics, Kpis};
use super::triangle::LossTriangle;

/// Triangle metric carrying incremental capped-cost IBNR
pub const COST_METRIC: &str = "asif_total_cost_excl_LL";
/// Triangle metric carrying incremental claim-count IBNR
pub const COUNT_METRIC: &str = "claim_count";

/// Commercial parameters of the projection.
#[derive(Debug, Clone, Copy)]
pub struct ProjectionParams {
    /// Loss ratio the proposed premium should land on
    pub target_loss_ratio: f64,
    /// Relative loading for large losses above the cap
    pub large_loss_loading: f64,
    pub current_commission: f64,
    pub new_commission: f64,
}

impl Default for ProjectionParams {
    fn default() -> Self {
        Self {
            target_loss_ratio: 1.0,
            large_loss_loading: 0.0,
            current_commission: 0.0,
            new_commission: 0.0,
        }
    }
}

/// Per-row IBNR additions for one metric.
///
/// Percentage mode spreads `sum(series) / sum(column)` proportionally over
/// every row. Absolute mode assigns the series to the most recent buckets,
/// front-padding with zeros when the series is shorter than the table; the
/// Total row (when present) receives the sum either way.
fn ibnr_additions(
    rows: &[AnalysisRow],
    triangle: Option<&LossTriangle>,
    metric: &str,
    as_percentage: bool,
    value_of: impl Fn(&Kpis) -> f64,
) -> Vec<f64> {
    let group_count = rows.iter().filter(|r| !r.is_total()).count();
    let series = triangle.and_then(|t| t.ibnr_series(metric));

    let per_group: Vec<f64> = match series {
        None => vec![0.0; group_count],
        Some(series) if as_percentage => {
            let observed: f64 = rows
                .iter()
                .filter(|r| !r.is_total())
                .map(|r| value_of(&r.kpis))
                .sum();
            let ratio = if observed > 0.0 {
                series.iter().sum::<f64>() / observed
            } else {
                0.0
            };
            rows.iter()
                .filter(|r| !r.is_total())
                .map(|r| value_of(&r.kpis) * ratio)
                .collect()
        }
        Some(series) => {
            if series.len() > group_count {
                let dropped: f64 = series[group_count..].iter().sum();
                log::warn!(
                    "IBNR series for {} has {} entries against {} rows; {:.2} of IBNR dropped",
                    metric,
                    series.len(),
                    group_count,
                    dropped
                );
            }
            let mut padded = vec![0.0; group_count];
            let offset = group_count.saturating_sub(series.len());
            for (slot, value) in padded[offset..].iter_mut().zip(series) {
                *slot = *value;
            }
            padded
        }
    };

    let total_addition: f64 = per_group.iter().sum();
    let mut per_group = per_group.into_iter();
    rows.iter()
        .map(|row| {
            if row.is_total() {
                total_addition
            } else {
                per_group.next().unwrap_or(0.0)
            }
        })
        .collect()
}

fn derive_metrics(
    kpis: &Kpis,
    ibnr_cost: f64,
    ibnr_count: f64,
    params: &ProjectionParams,
    prediction: bool,
) -> DerivedMetrics {
    let projected_capped_cost = kpis.capped_cost + ibnr_cost;
    let projected_claim_count = kpis.claim_count + ibnr_count;

    let projected_capped_loss_ratio = projected_capped_cost / kpis.earned_premium;
    let projected_full_loss_ratio =
        projected_capped_loss_ratio * (1.0 + params.large_loss_loading);
    let necessary_rate_adjustment = projected_full_loss_ratio
        * (1.0 - params.new_commission)
        / (1.0 - params.current_commission)
        / params.target_loss_ratio
        - 1.0;

    // Zero exposure or zero projected count surface as non-finite, not 0
    let frequency = projected_claim_count / kpis.exposure;
    let average_cost = projected_capped_cost / projected_claim_count;
    let pure_premium_excl_ll = projected_capped_cost / kpis.exposure;
    let pure_premium_incl_ll = pure_premium_excl_ll * (1.0 + params.large_loss_loading);
    let proposed_gwp_excl_taxes = pure_premium_incl_ll / params.target_loss_ratio;

    DerivedMetrics {
        projected_capped_cost,
        projected_claim_count,
        observed_full_loss_ratio: (!prediction).then(|| kpis.full_cost / kpis.earned_premium),
        observed_capped_loss_ratio: (!prediction)
            .then(|| kpis.capped_cost / kpis.earned_premium),
        claim_occurred: prediction.then(|| kpis.claim_count > 0.0),
        projected_capped_loss_ratio,
        projected_full_loss_ratio,
        necessary_rate_adjustment,
        frequency,
        average_cost,
        pure_premium_excl_ll,
        pure_premium_incl_ll,
        proposed_gwp_excl_taxes,
    }
}

/// Fill the derived columns of every row in place.
pub fn project_table(
    table: &mut AnalysisTable,
    triangle: Option<&LossTriangle>,
    params: &ProjectionParams,
    ibnr_as_percentage: bool,
) {
    let prediction = table.has_policy_id;
    let cost_additions = ibnr_additions(
        &table.rows,
        triangle,
        COST_METRIC,
        ibnr_as_percentage,
        |k| k.capped_cost,
    );
    let count_additions = ibnr_additions(
        &table.rows,
        triangle,
        COUNT_METRIC,
        ibnr_as_percentage,
        |k| k.claim_count,
    );

    for (row, (ibnr_cost, ibnr_count)) in table
        .rows
        .iter_mut()
        .zip(cost_additions.into_iter().zip(count_additions))
    {
        row.derived = Some(derive_metrics(
            &row.kpis,
            ibnr_cost,
            ibnr_count,
            params,
            prediction,
        ));
    }
}

/// Compare the table's pre-IBNR premium/cost totals with the input sums.
///
/// A mismatch beyond one currency unit is logged but never fatal; the report
/// is attached to the table for callers that want to inspect it.
pub fn check_conservation(
    table: &mut AnalysisTable,
    premium_in: f64,
    cost_in: f64,
) {
    let summed = table.summed_kpis();
    let report = ConservationReport {
        premium_in,
        premium_out: summed.earned_premium,
        cost_in,
        cost_out: summed.capped_cost,
    };
    if !report.is_balanced() {
        log::warn!(
            "Aggregation lost amounts: earned premium {:.2} -> {:.2} (delta {:.2}), \
             capped cost {:.2} -> {:.2} (delta {:.2})",
            report.premium_in,
            report.premium_out,
            report.premium_delta(),
            report.cost_in,
            report.cost_out,
            report.cost_delta(),
        );
    }
    table.conservation = Some(report);
}
