//! Portfolio and claim record structures
//!
//! Records are immutable inputs to the pipeline: every transformation clones
//! into a new vector rather than mutating in place.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::calendar::Year;

/// A grouping-key atom for an arbitrary feature or claim attribute.
///
/// Continuous variables are expected to be binned upstream; integral values
/// keep their numeric ordering, everything else groups lexicographically.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FeatureValue {
    Int(i64),
    Text(String),
}

impl FeatureValue {
    /// Parse a raw cell: integral values become `Int`, everything else `Text`.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().parse::<i64>() {
            Ok(n) => FeatureValue::Int(n),
            Err(_) => FeatureValue::Text(raw.trim().to_string()),
        }
    }

    /// Placeholder for a value that could not be resolved for a row.
    pub fn unknown() -> Self {
        FeatureValue::Text("unknown".to_string())
    }
}

impl fmt::Display for FeatureValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureValue::Int(n) => write!(f, "{}", n),
            FeatureValue::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for FeatureValue {
    fn from(s: &str) -> Self {
        FeatureValue::Text(s.to_string())
    }
}

impl From<i64> for FeatureValue {
    fn from(n: i64) -> Self {
        FeatureValue::Int(n)
    }
}

/// One portfolio row: either a full contract or a single contract-year
/// amendment, depending on the portfolio shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyRecord {
    /// Policy identifier (the unknown-policy sentinel is allowed here)
    pub policy_id: String,

    /// Contract start date (inception or amendment effective date)
    pub start_date: NaiveDate,

    /// Actual contract end date, inclusive
    pub end_date: NaiveDate,

    /// Written premium excluding taxes; rebased amounts overwrite this field
    pub written_premium: f64,

    /// Number of billed installments over the contract life
    pub multiplier: u32,

    /// Arbitrary categorical/numeric features used for grouping
    pub features: BTreeMap<String, FeatureValue>,
}

impl PolicyRecord {
    /// Contract start calendar year
    pub fn start_year(&self) -> Year {
        self.start_date.year()
    }

    /// Invariants: end >= start, and a positive premium requires a positive
    /// installment count.
    pub fn is_consistent(&self) -> bool {
        self.end_date >= self.start_date && (self.written_premium <= 0.0 || self.multiplier > 0)
    }

    pub fn feature(&self, name: &str) -> Option<&FeatureValue> {
        self.features.get(name)
    }
}

/// One claim row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimRecord {
    /// Policy identifier used to join back to the portfolio
    pub policy_id: String,

    /// Loss occurrence date
    pub occurrence_date: NaiveDate,

    /// Incurred cost, uncapped
    pub cost: f64,

    /// Incurred cost capped at the large-loss threshold
    pub capped_cost: f64,

    /// Claim count carried by the row (usually 1)
    pub count: f64,

    /// Claim attributes (guarantee impacted, ...) plus any policy features
    /// copied onto the claim for grouping
    pub attributes: BTreeMap<String, FeatureValue>,
}

impl ClaimRecord {
    /// Occurrence calendar year
    pub fn occurrence_year(&self) -> Year {
        self.occurrence_date.year()
    }

    pub fn attribute(&self, name: &str) -> Option<&FeatureValue> {
        self.attributes.get(name)
    }
}
