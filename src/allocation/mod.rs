//! Exposure and premium allocation into calendar-year buckets
//!
//! Converts irregular policy effective/end dates into per-calendar-year
//! earned-exposure fractions and written/earned premium amounts. Every
//! (policy, year) pair is independent, so bucket derivation parallelizes
//! across policies without changing output order.

mod buckets;
mod exposure;
mod premium;

pub use buckets::{derive_portfolio_years, write_portfolio_csv, PolicyYears, YearBuckets};
pub use exposure::annual_exposure;
pub use premium::{installment_amount, installment_count, written_premium_for_year};

use chrono::{Datelike, NaiveDate};

use crate::calendar::Year;

/// Shape of the portfolio dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortfolioShape {
    /// One row per contract-year amendment: the premium on each row is a
    /// single annual installment
    RowPerContractYear,
    /// One row per full contract: the premium spans the whole contract and
    /// is billed in `multiplier` installments
    RowPerContract,
}

/// Configuration for the allocation stage.
#[derive(Debug, Clone)]
pub struct AllocationConfig {
    /// First calendar year of business production
    pub start_business_year: Year,

    /// As-of date of the data extraction; exposure and billing are cut off here
    pub extraction_date: NaiveDate,

    /// Portfolio dataset shape
    pub shape: PortfolioShape,

    /// Add one day to the calendar-year upper bound when computing exposure,
    /// converting an inclusive contract end date into an exclusive boundary
    pub add_one_day: bool,
}

impl AllocationConfig {
    pub fn extraction_year(&self) -> Year {
        self.extraction_date.year()
    }

    /// Calendar years covered by the study, inclusive on both ends
    pub fn years(&self) -> std::ops::RangeInclusive<Year> {
        self.start_business_year..=self.extraction_year()
    }
}
