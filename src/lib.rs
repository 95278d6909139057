//! Pricing Engine - exposure allocation, premium earning and loss-ratio
//! analysis for non-life insurance portfolios
//!
//! This library provides:
//! - Calendar-year exposure and premium allocation per policy
//! - Inflation rebasing and segment rate loadings
//! - Grouped risk-performance summaries with IBNR projection
//! - Per-policy prediction tables with conservation checks

pub mod adjust;
pub mod allocation;
pub mod analysis;
pub mod calendar;
pub mod portfolio;

// Re-export commonly used types
pub use adjust::{InflationConfig, RateAdjustment};
pub use allocation::{AllocationConfig, PolicyYears, PortfolioShape, YearBuckets};
pub use analysis::{
    AnalysisMode, AnalysisRequest, AnalysisTable, LossTriangle, ProjectionParams, YearLevel,
};
pub use portfolio::{ClaimRecord, ColumnSchema, FeatureValue, PolicyRecord};
