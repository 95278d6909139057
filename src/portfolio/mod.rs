//! Portfolio and claim data model, column schema, and CSV loaders

mod data;
mod schema;
pub mod loader;

pub use data::{ClaimRecord, FeatureValue, PolicyRecord};
pub use loader::{load_claims, load_claims_from_reader, load_portfolio, load_portfolio_from_reader};
pub use schema::ColumnSchema;
