//! As-if inflation rebasing to the extraction year
//!
//! Written premiums rebase on the contract start year, claim costs on the
//! occurrence year. Rebasing happens before bucket derivation so every
//! downstream amount is already at the target valuation level.

use crate::calendar::Year;
use crate::portfolio::{ClaimRecord, PolicyRecord};

/// Inflation rebasing parameters.
#[derive(Debug, Clone)]
pub struct InflationConfig {
    /// Compound annual rate, e.g. 0.02
    pub annual_rate: f64,

    /// Target valuation year (the data extraction year)
    pub extraction_year: Year,

    /// Floor rebased amounts at zero (negative recoveries stay negative
    /// otherwise)
    pub floor_at_zero: bool,

    /// Portfolio-only: the premium on a row-per-full-contract row already
    /// reflects the latest rather than the first year's rate, so the exponent
    /// drops `multiplier - 1` years
    pub latest_premium: bool,
}

impl InflationConfig {
    pub fn new(annual_rate: f64, extraction_year: Year) -> Self {
        Self {
            annual_rate,
            extraction_year,
            floor_at_zero: false,
            latest_premium: false,
        }
    }

    fn factor(&self, base_year: Year, adjustment: i64) -> f64 {
        let exponent = (self.extraction_year - base_year) as i64 - adjustment;
        (1.0 + self.annual_rate).powi(exponent as i32)
    }

    fn apply(&self, amount: f64, base_year: Year, adjustment: i64) -> f64 {
        let rebased = amount * self.factor(base_year, adjustment);
        if self.floor_at_zero && rebased < 0.0 {
            0.0
        } else {
            rebased
        }
    }
}

/// Rebase portfolio written premiums to the extraction year.
pub fn inflate_portfolio(policies: &[PolicyRecord], config: &InflationConfig) -> Vec<PolicyRecord> {
    policies
        .iter()
        .map(|policy| {
            let adjustment = if config.latest_premium {
                policy.multiplier as i64 - 1
            } else {
                0
            };
            let mut rebased = policy.clone();
            rebased.written_premium =
                config.apply(policy.written_premium, policy.start_year(), adjustment);
            rebased
        })
        .collect()
}

/// Rebase claim costs (full and capped) to the extraction year.
pub fn inflate_claims(claims: &[ClaimRecord], config: &InflationConfig) -> Vec<ClaimRecord> {
    claims
        .iter()
        .map(|claim| {
            let base_year = claim.occurrence_year();
            let mut rebased = claim.clone();
            rebased.cost = config.apply(claim.cost, base_year, 0);
            rebased.capped_cost = config.apply(claim.capped_cost, base_year, 0);
            rebased
        })
        .collect()
}
