//! Column-role configuration for the tabular inputs
//!
//! The pipeline never hard-codes column names: every recognized role is named
//! once in `ColumnSchema` and passed through. The defaults reproduce the
//! column vocabulary that reporting and prediction collaborators consume
//! (`asif_` prefixes, `<metric>_in_<year>` suffixes), so they double as the
//! external naming contract.

use serde::{Deserialize, Serialize};

use crate::calendar::Year;

/// Names of the recognized columns in the portfolio and claim datasets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnSchema {
    /// Policy identifier column, shared by both datasets
    pub policy_id: String,

    /// Contract start date (inception or amendment effective date)
    pub contract_start: String,

    /// Actual contract end date, inclusive
    pub contract_end: String,

    /// Written premium excluding taxes
    pub written_premium: String,

    /// Number of billed installments
    pub multiplier: String,

    /// Claim occurrence date
    pub occurrence_date: String,

    /// Incurred claim cost, uncapped
    pub claim_cost: String,

    /// Incurred claim cost capped at the large-loss threshold
    pub capped_claim_cost: String,

    /// Claim count (defaults to 1 per row when absent)
    pub claim_count: String,

    /// Claim attribute holding the guarantee impacted
    pub guarantee: String,

    /// Sentinel value marking rows with an unknown policy identifier
    pub unknown_policy_marker: String,

    /// chrono format string for date columns
    pub date_format: String,

    /// Portfolio feature columns carried through for grouping
    pub feature_columns: Vec<String>,

    /// Claim attribute columns carried through for grouping
    pub attribute_columns: Vec<String>,
}

impl Default for ColumnSchema {
    fn default() -> Self {
        Self {
            policy_id: "policy_id".to_string(),
            contract_start: "contract_start_date".to_string(),
            contract_end: "actual_contract_end_date".to_string(),
            written_premium: "written_premium_excl_taxes".to_string(),
            multiplier: "written_multiplier".to_string(),
            occurrence_date: "occurrence_date".to_string(),
            claim_cost: "total_cost".to_string(),
            capped_claim_cost: "total_cost_excl_LL".to_string(),
            claim_count: "claim_count".to_string(),
            guarantee: "guarantee_impacted".to_string(),
            unknown_policy_marker: "unknown".to_string(),
            date_format: "%d/%m/%Y".to_string(),
            feature_columns: Vec::new(),
            attribute_columns: Vec::new(),
        }
    }
}

impl ColumnSchema {
    /// Schema with the given portfolio feature columns
    pub fn with_features<I, S>(mut self, features: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.feature_columns = features.into_iter().map(Into::into).collect();
        self
    }

    /// Schema with the given claim attribute columns
    pub fn with_attributes<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attribute_columns = attributes.into_iter().map(Into::into).collect();
        self
    }

    /// Flat column name for a year-sliced metric, e.g. `exposure_in_2021`
    pub fn year_column(metric: &str, year: Year) -> String {
        format!("{}_in_{}", metric, year)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_names() {
        let schema = ColumnSchema::default();
        assert_eq!(schema.written_premium, "written_premium_excl_taxes");
        assert_eq!(schema.capped_claim_cost, "total_cost_excl_LL");
        assert_eq!(schema.unknown_policy_marker, "unknown");
    }

    #[test]
    fn test_year_column() {
        assert_eq!(ColumnSchema::year_column("exposure", 2021), "exposure_in_2021");
        assert_eq!(
            ColumnSchema::year_column("asif_earned_premium", 2019),
            "asif_earned_premium_in_2019"
        );
    }

    #[test]
    fn test_builders() {
        let schema = ColumnSchema::default()
            .with_features(["driver_age_bin", "formula"])
            .with_attributes(["guarantee_impacted"]);
        assert_eq!(schema.feature_columns.len(), 2);
        assert_eq!(schema.attribute_columns, vec!["guarantee_impacted"]);
    }
}
