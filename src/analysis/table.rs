//! Analysis table structures
//!
//! The `AnalysisTable` is the pipeline's terminal artifact: one row per
//! aggregation-key value (or per policy in prediction mode), KPI sums plus
//! derived ratios. Flat column names in the CSV serialization
//! (`asif_` / `projected_` prefixes) are the contract consumed by reporting
//! and prediction collaborators.

use std::collections::BTreeMap;
use std::error::Error;
use std::io::Write;

use serde::{Deserialize, Serialize};

use crate::allocation::PolicyYears;
use crate::calendar::Year;
use crate::portfolio::{ClaimRecord, FeatureValue};

/// Ordered aggregation key for one table row.
///
/// Field order drives row ordering: ascending year first, then policy id,
/// then feature and attribute values.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GroupKey {
    pub year: Option<Year>,
    pub policy_id: Option<String>,
    pub features: Vec<FeatureValue>,
    pub attributes: Vec<FeatureValue>,
}

impl GroupKey {
    pub fn empty() -> Self {
        Self {
            year: None,
            policy_id: None,
            features: Vec::new(),
            attributes: Vec::new(),
        }
    }

    pub fn for_year(year: Year) -> Self {
        Self {
            year: Some(year),
            ..Self::empty()
        }
    }
}

/// Row identity: a concrete aggregation key, or the synthesized Total row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RowLabel {
    Group(GroupKey),
    Total,
}

/// Summed KPI columns shared by every table shape.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Kpis {
    pub exposure: f64,
    pub written_premium: f64,
    pub earned_premium: f64,
    pub full_cost: f64,
    pub capped_cost: f64,
    pub claim_count: f64,
}

impl Kpis {
    /// Accumulate the portfolio-side KPIs of one policy row
    pub fn add_portfolio(&mut self, row: &PolicyYears) {
        self.exposure += row.exposure();
        self.written_premium += row.written_premium();
        self.earned_premium += row.earned_premium();
    }

    /// Accumulate the claim-side KPIs of one claim row
    pub fn add_claim(&mut self, claim: &ClaimRecord) {
        self.full_cost += claim.cost;
        self.capped_cost += claim.capped_cost;
        self.claim_count += claim.count;
    }

    /// Element-wise sum of all KPI columns
    pub fn add(&mut self, other: &Kpis) {
        self.exposure += other.exposure;
        self.written_premium += other.written_premium;
        self.earned_premium += other.earned_premium;
        self.full_cost += other.full_cost;
        self.capped_cost += other.capped_cost;
        self.claim_count += other.claim_count;
    }

    /// Sum only the claim-side columns, keeping the portfolio side broadcast
    pub fn add_claim_side(&mut self, other: &Kpis) {
        self.full_cost += other.full_cost;
        self.capped_cost += other.capped_cost;
        self.claim_count += other.claim_count;
    }
}

/// Ratios and projections derived by the loss-ratio projector.
///
/// Zero denominators are left to surface as non-finite values: a bucket with
/// zero exposure genuinely has undefined frequency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DerivedMetrics {
    /// Capped cost including the IBNR addition
    pub projected_capped_cost: f64,

    /// Claim count including the IBNR addition
    pub projected_claim_count: f64,

    /// Observed (pre-IBNR) ratios, summary tables only
    pub observed_full_loss_ratio: Option<f64>,
    pub observed_capped_loss_ratio: Option<f64>,

    /// Prediction tables only: whether the bucket had at least one claim
    pub claim_occurred: Option<bool>,

    pub projected_capped_loss_ratio: f64,
    pub projected_full_loss_ratio: f64,
    pub necessary_rate_adjustment: f64,
    pub frequency: f64,
    pub average_cost: f64,
    pub pure_premium_excl_ll: f64,
    pub pure_premium_incl_ll: f64,
    pub proposed_gwp_excl_taxes: f64,
}

/// One output row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRow {
    pub label: RowLabel,

    /// Representative policy features (prediction tables only)
    pub features: BTreeMap<String, FeatureValue>,

    pub kpis: Kpis,

    /// Filled by the projector; absent on a freshly aggregated table
    pub derived: Option<DerivedMetrics>,
}

impl AnalysisRow {
    pub fn new(key: GroupKey, kpis: Kpis) -> Self {
        Self {
            label: RowLabel::Group(key),
            features: BTreeMap::new(),
            kpis,
            derived: None,
        }
    }

    pub fn is_total(&self) -> bool {
        matches!(self.label, RowLabel::Total)
    }

    pub fn key(&self) -> Option<&GroupKey> {
        match &self.label {
            RowLabel::Group(key) => Some(key),
            RowLabel::Total => None,
        }
    }
}

/// Report of the premium/claim conservation check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConservationReport {
    pub premium_in: f64,
    pub premium_out: f64,
    pub cost_in: f64,
    pub cost_out: f64,
}

impl ConservationReport {
    /// Totals match to the nearest integer currency unit
    pub fn is_balanced(&self) -> bool {
        (self.premium_out - self.premium_in).abs().floor() == 0.0
            && (self.cost_out - self.cost_in).abs().floor() == 0.0
    }

    pub fn premium_delta(&self) -> f64 {
        self.premium_out - self.premium_in
    }

    pub fn cost_delta(&self) -> f64 {
        self.cost_out - self.cost_in
    }
}

/// The terminal table of the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisTable {
    /// Name of the year key column when the table is year-indexed
    /// (e.g. "occurrence_year")
    pub year_label: Option<String>,

    /// Whether rows are keyed by policy identifier (prediction tables)
    pub has_policy_id: bool,

    /// Portfolio feature columns in key order
    pub feature_names: Vec<String>,

    /// Claim attribute columns in key order
    pub attribute_names: Vec<String>,

    pub rows: Vec<AnalysisRow>,

    /// Conservation check result, when the pipeline ran it
    pub conservation: Option<ConservationReport>,
}

impl AnalysisTable {
    /// KPI sums over the non-Total rows
    pub fn summed_kpis(&self) -> Kpis {
        let mut total = Kpis::default();
        for row in self.rows.iter().filter(|r| !r.is_total()) {
            total.add(&row.kpis);
        }
        total
    }

    pub fn total_row(&self) -> Option<&AnalysisRow> {
        self.rows.iter().find(|r| r.is_total())
    }

    /// Find the row for a bare year key (year summaries)
    pub fn year_row(&self, year: Year) -> Option<&AnalysisRow> {
        self.rows
            .iter()
            .find(|r| r.key().map(|k| k.year == Some(year)).unwrap_or(false))
    }

    /// Serialize as flat CSV using the external column-naming contract.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<(), Box<dyn Error>> {
        let mut csv_writer = csv::Writer::from_writer(writer);
        let prediction = self.has_policy_id;

        let mut header: Vec<String> = Vec::new();
        if let Some(label) = &self.year_label {
            header.push(label.clone());
        }
        if prediction {
            header.push("policy_id".to_string());
        }
        header.extend(self.feature_names.iter().cloned());
        header.extend(self.attribute_names.iter().cloned());
        // Prediction rows additionally carry the representative features
        let extra_features: Vec<String> = if prediction {
            self.rows
                .first()
                .map(|r| r.features.keys().cloned().collect())
                .unwrap_or_default()
        } else {
            Vec::new()
        };
        header.extend(extra_features.iter().cloned());
        header.extend(
            [
                "exposure",
                "asif_written_premium_excl_taxes",
                "asif_earned_premium",
                "asif_total_cost",
                "asif_total_cost_excl_LL",
                "claim_count",
            ]
            .map(String::from),
        );

        let has_derived = self.rows.iter().any(|r| r.derived.is_some());
        if has_derived {
            if prediction {
                header.extend(["claim_occurred", "number_claims"].map(String::from));
            } else {
                header.extend(
                    ["observed_full_loss_ratio", "observed_capped_loss_ratio"].map(String::from),
                );
            }
            header.extend(
                [
                    "projected_capped_cost",
                    "projected_capped_loss_ratio",
                    "projected_full_loss_ratio",
                    "necessary_rate_adjustment",
                    "frequency",
                    "average_cost",
                    "pure_premium_excl_LL",
                    "pure_premium_incl_LL",
                    "proposed_gwp_excl_taxes",
                ]
                .map(String::from),
            );
        }
        csv_writer.write_record(&header)?;

        for row in &self.rows {
            let mut record: Vec<String> = Vec::new();
            match &row.label {
                RowLabel::Total => {
                    let key_width = usize::from(self.year_label.is_some())
                        + usize::from(prediction)
                        + self.feature_names.len()
                        + self.attribute_names.len();
                    for _ in 0..key_width {
                        record.push("Total".to_string());
                    }
                }
                RowLabel::Group(key) => {
                    if self.year_label.is_some() {
                        record.push(key.year.map(|y| y.to_string()).unwrap_or_default());
                    }
                    if prediction {
                        record.push(key.policy_id.clone().unwrap_or_default());
                    }
                    for value in &key.features {
                        record.push(value.to_string());
                    }
                    for value in &key.attributes {
                        record.push(value.to_string());
                    }
                }
            }
            for name in &extra_features {
                record.push(
                    row.features
                        .get(name)
                        .map(|v| v.to_string())
                        .unwrap_or_default(),
                );
            }

            let kpis = &row.kpis;
            for value in [
                kpis.exposure,
                kpis.written_premium,
                kpis.earned_premium,
                kpis.full_cost,
                kpis.capped_cost,
                kpis.claim_count,
            ] {
                record.push(format!("{:.6}", value));
            }

            if has_derived {
                if let Some(derived) = &row.derived {
                    if prediction {
                        record.push(
                            derived
                                .claim_occurred
                                .map(|o| if o { "1" } else { "0" }.to_string())
                                .unwrap_or_default(),
                        );
                        record.push(format!("{:.6}", derived.projected_claim_count));
                    } else {
                        record.push(fmt_opt(derived.observed_full_loss_ratio));
                        record.push(fmt_opt(derived.observed_capped_loss_ratio));
                    }
                    for value in [
                        derived.projected_capped_cost,
                        derived.projected_capped_loss_ratio,
                        derived.projected_full_loss_ratio,
                        derived.necessary_rate_adjustment,
                        derived.frequency,
                        derived.average_cost,
                        derived.pure_premium_excl_ll,
                        derived.pure_premium_incl_ll,
                        derived.proposed_gwp_excl_taxes,
                    ] {
                        record.push(format!("{:.6}", value));
                    }
                } else {
                    // 2 mode-specific columns + 9 shared projector columns
                    record.extend(std::iter::repeat(String::new()).take(11));
                }
            }

            csv_writer.write_record(&record)?;
        }

        csv_writer.flush()?;
        Ok(())
    }
}

fn fmt_opt(value: Option<f64>) -> String {
    value.map(|v| format!("{:.6}", v)).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kpis(earned: f64, capped: f64, count: f64) -> Kpis {
        Kpis {
            exposure: 1.0,
            written_premium: earned,
            earned_premium: earned,
            full_cost: capped,
            capped_cost: capped,
            claim_count: count,
        }
    }

    #[test]
    fn test_summed_kpis_skip_total() {
        let mut total_row = AnalysisRow::new(GroupKey::empty(), kpis(300.0, 80.0, 2.0));
        total_row.label = RowLabel::Total;

        let table = AnalysisTable {
            year_label: Some("occurrence_year".to_string()),
            has_policy_id: false,
            feature_names: Vec::new(),
            attribute_names: Vec::new(),
            rows: vec![
                AnalysisRow::new(GroupKey::for_year(2020), kpis(100.0, 30.0, 1.0)),
                AnalysisRow::new(GroupKey::for_year(2021), kpis(200.0, 50.0, 1.0)),
                total_row,
            ],
            conservation: None,
        };

        let summed = table.summed_kpis();
        assert_eq!(summed.earned_premium, 300.0);
        assert_eq!(summed.capped_cost, 80.0);
    }

    #[test]
    fn test_conservation_report_tolerance() {
        let balanced = ConservationReport {
            premium_in: 1000.0,
            premium_out: 1000.4,
            cost_in: 500.0,
            cost_out: 499.8,
        };
        assert!(balanced.is_balanced());

        let broken = ConservationReport {
            premium_in: 1000.0,
            premium_out: 1003.0,
            cost_in: 500.0,
            cost_out: 500.0,
        };
        assert!(!broken.is_balanced());
        assert!((broken.premium_delta() - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_key_ordering_year_first() {
        let a = GroupKey::for_year(2020);
        let b = GroupKey::for_year(2021);
        assert!(a < b);

        let mut c = GroupKey::for_year(2020);
        c.features.push(FeatureValue::from("z"));
        assert!(a < c && c < b);
    }

    #[test]
    fn test_csv_has_contract_columns() {
        let table = AnalysisTable {
            year_label: Some("occurrence_year".to_string()),
            has_policy_id: false,
            feature_names: Vec::new(),
            attribute_names: Vec::new(),
            rows: vec![AnalysisRow::new(GroupKey::for_year(2020), kpis(100.0, 30.0, 1.0))],
            conservation: None,
        };

        let mut out = Vec::new();
        table.write_csv(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let header = text.lines().next().unwrap();
        assert!(header.starts_with("occurrence_year"));
        assert!(header.contains("asif_earned_premium"));
        assert!(header.contains("asif_total_cost_excl_LL"));
    }
}
