//! Inflation rebasing and segment rate loadings

mod inflation;
mod rates;

pub use inflation::{inflate_claims, inflate_portfolio, InflationConfig};
pub use rates::{apply_rate_adjustments, RateAdjustment};
