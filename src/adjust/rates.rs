//! Segment-specific rate loadings
//!
//! Each adjustment targets the rows where one feature equals one value and
//! multiplies the written/earned premium KPIs and every per-year premium
//! bucket by `(1 + loading)`. Adjustments apply sequentially in input order;
//! loadings touching the same rows compose multiplicatively.

use crate::allocation::PolicyYears;
use crate::portfolio::FeatureValue;

/// One segment loading: `(feature, value, relative loading)`.
#[derive(Debug, Clone)]
pub struct RateAdjustment {
    pub feature: String,
    pub value: FeatureValue,
    pub loading: f64,
}

impl RateAdjustment {
    pub fn new(feature: impl Into<String>, value: impl Into<FeatureValue>, loading: f64) -> Self {
        Self {
            feature: feature.into(),
            value: value.into(),
            loading,
        }
    }
}

/// Apply an ordered list of rate adjustments, returning the adjusted rows.
///
/// An adjustment whose feature appears on no row cannot target anything; it
/// is skipped with one diagnostic rather than failing the run.
pub fn apply_rate_adjustments(
    rows: &[PolicyYears],
    adjustments: &[RateAdjustment],
) -> Vec<PolicyYears> {
    let mut adjusted: Vec<PolicyYears> = rows.to_vec();

    for adjustment in adjustments {
        let feature_known = adjusted
            .iter()
            .any(|row| row.policy.features.contains_key(&adjustment.feature));
        if !feature_known {
            log::warn!(
                "Rate adjustment on '{}' skipped: feature not present in the portfolio",
                adjustment.feature
            );
            continue;
        }

        let factor = 1.0 + adjustment.loading;
        for row in adjusted.iter_mut() {
            if row.policy.feature(&adjustment.feature) == Some(&adjustment.value) {
                row.policy.written_premium *= factor;
                row.buckets.scale_premiums(factor);
            }
        }
    }

    adjusted
}
