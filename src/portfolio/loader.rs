//! Load portfolio and claim tables from CSV
//!
//! Column roles come from a `ColumnSchema` rather than fixed struct fields,
//! so feature and attribute columns can vary per dataset. Required columns
//! missing from the header are an error; a missing claim-count column makes
//! every row count as one claim.

use std::collections::BTreeMap;
use std::error::Error;
use std::io::Read;
use std::path::Path;

use chrono::NaiveDate;
use csv::{Reader, StringRecord};

use super::{ClaimRecord, ColumnSchema, FeatureValue, PolicyRecord};

/// Header-to-index lookup for one CSV file
struct HeaderIndex {
    columns: BTreeMap<String, usize>,
}

impl HeaderIndex {
    fn new(headers: &StringRecord) -> Self {
        let columns = headers
            .iter()
            .enumerate()
            .map(|(i, name)| (name.trim().to_string(), i))
            .collect();
        Self { columns }
    }

    fn get<'r>(&self, record: &'r StringRecord, column: &str) -> Result<&'r str, Box<dyn Error>> {
        let index = self
            .columns
            .get(column)
            .ok_or_else(|| format!("Missing column: {}", column))?;
        Ok(record.get(*index).unwrap_or("").trim())
    }

    fn get_optional<'r>(&self, record: &'r StringRecord, column: &str) -> Option<&'r str> {
        self.columns
            .get(column)
            .and_then(|i| record.get(*i))
            .map(str::trim)
    }
}

fn parse_date(raw: &str, format: &str, column: &str) -> Result<NaiveDate, Box<dyn Error>> {
    NaiveDate::parse_from_str(raw, format)
        .map_err(|e| format!("Bad date '{}' in column {}: {}", raw, column, e).into())
}

fn parse_amount(raw: &str, column: &str) -> Result<f64, Box<dyn Error>> {
    if raw.is_empty() {
        return Ok(0.0);
    }
    raw.parse::<f64>()
        .map_err(|_| format!("Bad number '{}' in column {}", raw, column).into())
}

fn collect_values(
    index: &HeaderIndex,
    record: &StringRecord,
    columns: &[String],
) -> BTreeMap<String, FeatureValue> {
    columns
        .iter()
        .filter_map(|name| {
            index
                .get_optional(record, name)
                .filter(|raw| !raw.is_empty())
                .map(|raw| (name.clone(), FeatureValue::parse(raw)))
        })
        .collect()
}

fn record_to_policy(
    index: &HeaderIndex,
    record: &StringRecord,
    schema: &ColumnSchema,
) -> Result<PolicyRecord, Box<dyn Error>> {
    let start_raw = index.get(record, &schema.contract_start)?;
    let end_raw = index.get(record, &schema.contract_end)?;

    let multiplier = match index.get_optional(record, &schema.multiplier) {
        Some(raw) if !raw.is_empty() => raw
            .parse::<f64>()
            .map_err(|_| format!("Bad multiplier '{}'", raw))?
            .round() as u32,
        _ => 1,
    };

    let policy = PolicyRecord {
        policy_id: index.get(record, &schema.policy_id)?.to_string(),
        start_date: parse_date(start_raw, &schema.date_format, &schema.contract_start)?,
        end_date: parse_date(end_raw, &schema.date_format, &schema.contract_end)?,
        written_premium: parse_amount(
            index.get(record, &schema.written_premium)?,
            &schema.written_premium,
        )?,
        multiplier,
        features: collect_values(index, record, &schema.feature_columns),
    };

    if !policy.is_consistent() {
        log::warn!(
            "Inconsistent policy {}: end {} before start {} or zero multiplier with premium",
            policy.policy_id,
            policy.end_date,
            policy.start_date
        );
    }

    Ok(policy)
}

fn record_to_claim(
    index: &HeaderIndex,
    record: &StringRecord,
    schema: &ColumnSchema,
) -> Result<ClaimRecord, Box<dyn Error>> {
    let occurrence_raw = index.get(record, &schema.occurrence_date)?;
    let cost = parse_amount(index.get(record, &schema.claim_cost)?, &schema.claim_cost)?;

    // Capped cost falls back to the full cost when the dataset has no
    // large-loss threshold applied
    let capped_cost = match index.get_optional(record, &schema.capped_claim_cost) {
        Some(raw) if !raw.is_empty() => parse_amount(raw, &schema.capped_claim_cost)?,
        _ => cost,
    };

    let count = match index.get_optional(record, &schema.claim_count) {
        Some(raw) if !raw.is_empty() => parse_amount(raw, &schema.claim_count)?,
        _ => 1.0,
    };

    // Attributes and any copied portfolio features live in one map
    let mut attributes = collect_values(index, record, &schema.attribute_columns);
    for (name, value) in collect_values(index, record, &schema.feature_columns) {
        attributes.entry(name).or_insert(value);
    }

    Ok(ClaimRecord {
        policy_id: index.get(record, &schema.policy_id)?.to_string(),
        occurrence_date: parse_date(occurrence_raw, &schema.date_format, &schema.occurrence_date)?,
        cost,
        capped_cost,
        count,
        attributes,
    })
}

/// Load all portfolio rows from a CSV file
pub fn load_portfolio<P: AsRef<Path>>(
    path: P,
    schema: &ColumnSchema,
) -> Result<Vec<PolicyRecord>, Box<dyn Error>> {
    load_portfolio_from_reader(std::fs::File::open(path)?, schema)
}

/// Load portfolio rows from any reader (e.g. string buffer, network stream)
pub fn load_portfolio_from_reader<R: Read>(
    reader: R,
    schema: &ColumnSchema,
) -> Result<Vec<PolicyRecord>, Box<dyn Error>> {
    let mut csv_reader = Reader::from_reader(reader);
    let index = HeaderIndex::new(csv_reader.headers()?);

    let mut policies = Vec::new();
    for result in csv_reader.records() {
        let record = result?;
        policies.push(record_to_policy(&index, &record, schema)?);
    }
    Ok(policies)
}

/// Load all claim rows from a CSV file
pub fn load_claims<P: AsRef<Path>>(
    path: P,
    schema: &ColumnSchema,
) -> Result<Vec<ClaimRecord>, Box<dyn Error>> {
    load_claims_from_reader(std::fs::File::open(path)?, schema)
}

/// Load claim rows from any reader
pub fn load_claims_from_reader<R: Read>(
    reader: R,
    schema: &ColumnSchema,
) -> Result<Vec<ClaimRecord>, Box<dyn Error>> {
    let mut csv_reader = Reader::from_reader(reader);
    let index = HeaderIndex::new(csv_reader.headers()?);

    let mut claims = Vec::new();
    for result in csv_reader.records() {
        let record = result?;
        claims.push(record_to_claim(&index, &record, schema)?);
    }
    Ok(claims)
}
