//! Risk-performance analysis: aggregation, IBNR projection, output tables
//!
//! `build_table` is the single entry point: it applies rate loadings, filters
//! claims by guarantee, aggregates portfolio and claim KPIs according to the
//! requested mode, synthesizes the Total row, loads IBNR and derives the
//! loss-ratio metrics. `run_analysis_by_feature` and `run_all_analysis_by_year`
//! are the batch drivers on top of it.

mod aggregate;
mod projector;
mod table;
mod triangle;

pub use projector::{ProjectionParams, COST_METRIC, COUNT_METRIC};
pub use table::{
    AnalysisRow, AnalysisTable, ConservationReport, DerivedMetrics, GroupKey, Kpis, RowLabel,
};
pub use triangle::LossTriangle;

use std::collections::BTreeMap;

use thiserror::Error;

use crate::adjust::{apply_rate_adjustments, RateAdjustment};
use crate::allocation::{AllocationConfig, PolicyYears};
use crate::portfolio::{ClaimRecord, ColumnSchema, FeatureValue};

/// Which contract date indexes a year-keyed table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum YearLevel {
    /// Claim occurrence year; portfolio amounts come from the bucket maps
    Occurrence,
    /// First contract year of the policy
    Inception,
    /// Start year of the contract row in force
    Effective,
}

impl YearLevel {
    pub fn column_label(&self) -> &'static str {
        match self {
            YearLevel::Occurrence => "occurrence_year",
            YearLevel::Inception => "inception_year",
            YearLevel::Effective => "effective_year",
        }
    }
}

/// What the output table is keyed by.
#[derive(Debug, Clone)]
pub enum AnalysisMode {
    /// Grouped sums over portfolio features and/or claim attributes
    FeatureSummary {
        features: Vec<String>,
        attributes: Vec<String>,
    },
    /// Grouped sums per calendar year, optionally crossed with features
    /// and attributes
    YearSummary {
        level: YearLevel,
        features: Vec<String>,
        attributes: Vec<String>,
    },
    /// One row per policy, the wide table that feeds prediction models
    PredictionTable { level: YearLevel },
}

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("a summary needs at least one feature or claim attribute to group by")]
    NoGroupingDimension,
    #[error("prediction tables cannot be keyed by occurrence year")]
    OccurrenceLevelPrediction,
}

/// Everything one analysis run needs besides the data itself.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub mode: AnalysisMode,
    /// Segment rate loadings applied before aggregation, in order
    pub rate_adjustments: Vec<RateAdjustment>,
    /// Restrict claims to these guarantee values; `None` keeps all claims
    pub guarantees: Option<Vec<FeatureValue>>,
    pub params: ProjectionParams,
    pub triangle: Option<LossTriangle>,
}

impl AnalysisRequest {
    pub fn new(mode: AnalysisMode) -> Self {
        Self {
            mode,
            rate_adjustments: Vec::new(),
            guarantees: None,
            params: ProjectionParams::default(),
            triangle: None,
        }
    }

    fn with_mode(&self, mode: AnalysisMode) -> Self {
        Self {
            mode,
            ..self.clone()
        }
    }
}

/// Build one analysis table: loadings, guarantee filter, aggregation, Total
/// row, IBNR projection, and (for prediction tables) the conservation check.
pub fn build_table(
    portfolio: &[PolicyYears],
    claims: &[ClaimRecord],
    config: &AllocationConfig,
    schema: &ColumnSchema,
    request: &AnalysisRequest,
) -> Result<AnalysisTable, AnalysisError> {
    let portfolio = apply_rate_adjustments(portfolio, &request.rate_adjustments);
    let claims: Vec<ClaimRecord> = match &request.guarantees {
        Some(allowed) => claims
            .iter()
            .filter(|claim| {
                claim
                    .attribute(&schema.guarantee)
                    .map(|value| allowed.contains(value))
                    .unwrap_or(false)
            })
            .cloned()
            .collect(),
        None => claims.to_vec(),
    };

    let (prepared, year_label, feature_names, attribute_names, has_policy_id) =
        match &request.mode {
            AnalysisMode::FeatureSummary { features, attributes } => {
                if features.is_empty() && attributes.is_empty() {
                    return Err(AnalysisError::NoGroupingDimension);
                }
                (
                    aggregate::feature_summary(&portfolio, &claims, features, attributes),
                    None,
                    features.clone(),
                    attributes.clone(),
                    false,
                )
            }
            AnalysisMode::YearSummary {
                level,
                features,
                attributes,
            } => (
                aggregate::year_summary(
                    &portfolio, &claims, *level, features, attributes, config, schema,
                ),
                Some(level.column_label().to_string()),
                features.clone(),
                attributes.clone(),
                false,
            ),
            AnalysisMode::PredictionTable { level } => {
                if *level == YearLevel::Occurrence {
                    return Err(AnalysisError::OccurrenceLevelPrediction);
                }
                let per_year = *level == YearLevel::Effective;
                (
                    aggregate::prediction_rows(&portfolio, &claims, per_year),
                    per_year.then(|| YearLevel::Effective.column_label().to_string()),
                    Vec::new(),
                    Vec::new(),
                    true,
                )
            }
        };

    let mut rows = prepared.rows;
    aggregate::append_total(&mut rows, prepared.total_policy);
    log::info!(
        "Aggregated {} rows ({} claims after filtering)",
        rows.len(),
        claims.len()
    );

    let mut result = AnalysisTable {
        year_label,
        has_policy_id,
        feature_names,
        attribute_names,
        rows,
        conservation: None,
    };

    // Absolute per-bucket IBNR only lines up with bare occurrence-year rows;
    // every other shape spreads IBNR proportionally
    let absolute_ibnr = matches!(
        &request.mode,
        AnalysisMode::YearSummary {
            level: YearLevel::Occurrence,
            features,
            attributes,
        } if features.is_empty() && attributes.is_empty()
    );
    projector::project_table(
        &mut result,
        request.triangle.as_ref(),
        &request.params,
        !absolute_ibnr,
    );

    if has_policy_id {
        let premium_in: f64 = portfolio.iter().map(|row| row.earned_premium()).sum();
        let cost_in: f64 = claims.iter().map(|claim| claim.capped_cost).sum();
        projector::check_conservation(&mut result, premium_in, cost_in);
    }

    Ok(result)
}

/// One `FeatureSummary` table per requested feature, keyed by feature name.
pub fn run_analysis_by_feature(
    portfolio: &[PolicyYears],
    claims: &[ClaimRecord],
    config: &AllocationConfig,
    schema: &ColumnSchema,
    features: &[String],
    attributes: &[String],
    base: &AnalysisRequest,
) -> Result<BTreeMap<String, AnalysisTable>, AnalysisError> {
    let mut tables = BTreeMap::new();
    for feature in features {
        let request = base.with_mode(AnalysisMode::FeatureSummary {
            features: vec![feature.clone()],
            attributes: attributes.to_vec(),
        });
        let result = build_table(portfolio, claims, config, schema, &request)?;
        tables.insert(feature.clone(), result);
    }
    Ok(tables)
}

/// The three year summaries of one portfolio.
///
/// For single-row-per-policy portfolios the effective table duplicates the
/// inception table, since no amendments exist to tell the two apart.
#[derive(Debug, Clone)]
pub struct YearAnalyses {
    pub occurrence: AnalysisTable,
    pub inception: AnalysisTable,
    pub effective: AnalysisTable,
}

/// Occurrence, inception and effective year summaries in one call.
pub fn run_all_analysis_by_year(
    portfolio: &[PolicyYears],
    claims: &[ClaimRecord],
    config: &AllocationConfig,
    schema: &ColumnSchema,
    features: &[String],
    attributes: &[String],
    base: &AnalysisRequest,
) -> Result<YearAnalyses, AnalysisError> {
    let build = |level| {
        let request = base.with_mode(AnalysisMode::YearSummary {
            level,
            features: features.to_vec(),
            attributes: attributes.to_vec(),
        });
        build_table(portfolio, claims, config, schema, &request)
    };
    Ok(YearAnalyses {
        occurrence: build(YearLevel::Occurrence)?,
        inception: build(YearLevel::Inception)?,
        effective: build(YearLevel::Effective)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocation::{derive_portfolio_years, PortfolioShape};
    use crate::portfolio::PolicyRecord;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;
    use std::collections::BTreeMap;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn policy(id: &str, start: NaiveDate, premium: f64, formula: &str) -> PolicyRecord {
        let mut features = BTreeMap::new();
        features.insert("formula".to_string(), FeatureValue::from(formula));
        PolicyRecord {
            policy_id: id.to_string(),
            start_date: start,
            end_date: crate::calendar::add_years(start, 1),
            written_premium: premium,
            multiplier: 1,
            features,
        }
    }

    fn claim(policy_id: &str, date: NaiveDate, cost: f64, guarantee: &str) -> ClaimRecord {
        let mut attributes = BTreeMap::new();
        attributes.insert(
            "guarantee_impacted".to_string(),
            FeatureValue::from(guarantee),
        );
        ClaimRecord {
            policy_id: policy_id.to_string(),
            occurrence_date: date,
            cost,
            capped_cost: cost,
            count: 1.0,
            attributes,
        }
    }

    fn scenario() -> (Vec<PolicyYears>, Vec<ClaimRecord>, AllocationConfig) {
        // Three one-year policies 2019..2021, two claims in 2020. Contract
        // ends land on the next Jan-1 so each policy earns exactly one full
        // year of premium.
        let config = AllocationConfig {
            start_business_year: 2019,
            extraction_date: d(2021, 12, 31),
            shape: PortfolioShape::RowPerContractYear,
            add_one_day: true,
        };
        let policies = vec![
            policy("P1", d(2019, 1, 1), 1000.0, "f1"),
            policy("P2", d(2020, 1, 1), 2000.0, "f2"),
            policy("P3", d(2021, 1, 1), 1500.0, "f1"),
        ];
        let claims = vec![
            claim("P2", d(2020, 3, 15), 500.0, "fire"),
            claim("P2", d(2020, 9, 1), 300.0, "theft"),
        ];
        (derive_portfolio_years(&policies, &config), claims, config)
    }

    // P3 is cut one day short by the extraction date
    const P3_EARNED: f64 = 1500.0 * 364.0 / 365.0;

    #[test]
    fn test_end_to_end_occurrence_summary() {
        let (portfolio, claims, config) = scenario();
        let schema = ColumnSchema::default();
        let request = AnalysisRequest::new(AnalysisMode::YearSummary {
            level: YearLevel::Occurrence,
            features: Vec::new(),
            attributes: Vec::new(),
        });

        let result = build_table(&portfolio, &claims, &config, &schema, &request).unwrap();

        // 2019..=2021 plus the Total row
        assert_eq!(result.rows.len(), 4);
        assert!(result.rows.last().unwrap().is_total());
        assert_eq!(result.year_label.as_deref(), Some("occurrence_year"));

        // 2020 earned exactly the P2 premium, so the loss ratio is exact
        let row_2020 = result.year_row(2020).unwrap();
        assert_relative_eq!(row_2020.kpis.earned_premium, 2000.0);
        assert_relative_eq!(row_2020.kpis.capped_cost, 800.0);
        let derived = row_2020.derived.as_ref().unwrap();
        assert_relative_eq!(derived.observed_capped_loss_ratio.unwrap(), 0.4);

        // Total row sums every KPI column
        let total = result.total_row().unwrap();
        assert_relative_eq!(total.kpis.earned_premium, 3000.0 + P3_EARNED, epsilon = 1e-9);
        assert_relative_eq!(total.kpis.capped_cost, 800.0);
    }

    #[test]
    fn test_empty_grouping_is_an_error() {
        let (portfolio, claims, config) = scenario();
        let schema = ColumnSchema::default();
        let request = AnalysisRequest::new(AnalysisMode::FeatureSummary {
            features: Vec::new(),
            attributes: Vec::new(),
        });

        let result = build_table(&portfolio, &claims, &config, &schema, &request);
        assert!(matches!(result, Err(AnalysisError::NoGroupingDimension)));
    }

    #[test]
    fn test_occurrence_prediction_is_an_error() {
        let (portfolio, claims, config) = scenario();
        let schema = ColumnSchema::default();
        let request = AnalysisRequest::new(AnalysisMode::PredictionTable {
            level: YearLevel::Occurrence,
        });

        let result = build_table(&portfolio, &claims, &config, &schema, &request);
        assert!(matches!(
            result,
            Err(AnalysisError::OccurrenceLevelPrediction)
        ));
    }

    #[test]
    fn test_guarantee_filter_restricts_claims() {
        let (portfolio, claims, config) = scenario();
        let schema = ColumnSchema::default();
        let mut request = AnalysisRequest::new(AnalysisMode::YearSummary {
            level: YearLevel::Occurrence,
            features: Vec::new(),
            attributes: Vec::new(),
        });
        request.guarantees = Some(vec![FeatureValue::from("fire")]);

        let result = build_table(&portfolio, &claims, &config, &schema, &request).unwrap();
        let row_2020 = result.year_row(2020).unwrap();
        assert_relative_eq!(row_2020.kpis.capped_cost, 500.0);
        assert_relative_eq!(row_2020.kpis.claim_count, 1.0);
    }

    #[test]
    fn test_rate_adjustment_flows_into_summary() {
        let (portfolio, claims, config) = scenario();
        let schema = ColumnSchema::default();
        let mut request = AnalysisRequest::new(AnalysisMode::FeatureSummary {
            features: vec!["formula".to_string()],
            attributes: Vec::new(),
        });
        request.rate_adjustments = vec![RateAdjustment::new("formula", "f1", 0.10)];

        let result = build_table(&portfolio, &claims, &config, &schema, &request).unwrap();
        let f1 = result
            .rows
            .iter()
            .find(|r| {
                r.key()
                    .map(|k| k.features == vec![FeatureValue::from("f1")])
                    .unwrap_or(false)
            })
            .unwrap();
        // P1 + P3 earned premium, loaded by 10%
        assert_relative_eq!(
            f1.kpis.earned_premium,
            (1000.0 + P3_EARNED) * 1.10,
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_prediction_table_gets_conservation_report() {
        let (portfolio, claims, config) = scenario();
        let schema = ColumnSchema::default();
        let request = AnalysisRequest::new(AnalysisMode::PredictionTable {
            level: YearLevel::Inception,
        });

        let result = build_table(&portfolio, &claims, &config, &schema, &request).unwrap();
        assert_eq!(result.rows.len(), 3);
        let report = result.conservation.as_ref().unwrap();
        assert!(report.is_balanced());
        assert_relative_eq!(report.cost_out, 800.0);
    }

    #[test]
    fn test_run_analysis_by_feature_one_table_per_feature() {
        let (portfolio, claims, config) = scenario();
        let schema = ColumnSchema::default();
        let base = AnalysisRequest::new(AnalysisMode::FeatureSummary {
            features: Vec::new(),
            attributes: Vec::new(),
        });

        let tables = run_analysis_by_feature(
            &portfolio,
            &claims,
            &config,
            &schema,
            &["formula".to_string()],
            &[],
            &base,
        )
        .unwrap();

        assert_eq!(tables.len(), 1);
        let by_formula = &tables["formula"];
        // f1, f2 and the Total row
        assert_eq!(by_formula.rows.len(), 3);
        assert_relative_eq!(
            by_formula.summed_kpis().earned_premium,
            3000.0 + P3_EARNED,
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_run_all_analysis_by_year_levels() {
        let (portfolio, claims, config) = scenario();
        let schema = ColumnSchema::default();
        let base = AnalysisRequest::new(AnalysisMode::YearSummary {
            level: YearLevel::Occurrence,
            features: Vec::new(),
            attributes: Vec::new(),
        });

        let analyses =
            run_all_analysis_by_year(&portfolio, &claims, &config, &schema, &[], &[], &base)
                .unwrap();

        assert_eq!(
            analyses.occurrence.year_label.as_deref(),
            Some("occurrence_year")
        );
        assert_eq!(
            analyses.inception.year_label.as_deref(),
            Some("inception_year")
        );
        // Single-row portfolio: effective duplicates inception
        assert_eq!(
            analyses.effective.rows.len(),
            analyses.inception.rows.len()
        );
        for (effective, inception) in analyses
            .effective
            .rows
            .iter()
            .zip(&analyses.inception.rows)
        {
            assert_relative_eq!(
                effective.kpis.earned_premium,
                inception.kpis.earned_premium
            );
        }
    }
}
