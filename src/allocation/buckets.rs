//! Calendar-year buckets per policy
//!
//! A `YearBuckets` holds one amount per calendar year for each allocated
//! metric, indexed by year rather than by suffixed column name. The flat
//! `<metric>_in_<year>` columns only exist at the serialization boundary.

use std::collections::BTreeMap;
use std::io::Write;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::{annual_exposure, installment_amount, written_premium_for_year};
use super::{AllocationConfig, PortfolioShape};
use crate::calendar::Year;
use crate::portfolio::PolicyRecord;

/// Per-calendar-year allocation results for one policy row.
///
/// Never mutated after creation, except by the rate adjuster which rebuilds
/// scaled copies.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct YearBuckets {
    /// Earned exposure fraction per year, each in [0, 1]
    pub exposure: BTreeMap<Year, f64>,

    /// Written premium per year (row-per-full-contract shape only)
    pub written: BTreeMap<Year, f64>,

    /// Earned premium per year
    pub earned: BTreeMap<Year, f64>,
}

impl YearBuckets {
    pub fn exposure_in(&self, year: Year) -> f64 {
        self.exposure.get(&year).copied().unwrap_or(0.0)
    }

    pub fn written_in(&self, year: Year) -> f64 {
        self.written.get(&year).copied().unwrap_or(0.0)
    }

    pub fn earned_in(&self, year: Year) -> f64 {
        self.earned.get(&year).copied().unwrap_or(0.0)
    }

    /// Total earned exposure across all years
    pub fn total_exposure(&self) -> f64 {
        self.exposure.values().sum()
    }

    /// Total earned premium across all years
    pub fn total_earned(&self) -> f64 {
        self.earned.values().sum()
    }

    /// Scale every premium bucket by a multiplicative factor (rate loadings);
    /// exposure is a time fraction and is left untouched
    pub fn scale_premiums(&mut self, factor: f64) {
        for amount in self.written.values_mut() {
            *amount *= factor;
        }
        for amount in self.earned.values_mut() {
            *amount *= factor;
        }
    }
}

/// A policy row together with its calendar-year allocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyYears {
    pub policy: PolicyRecord,
    pub buckets: YearBuckets,
}

impl PolicyYears {
    /// Written premium KPI for this row (post inflation/rate adjustments)
    pub fn written_premium(&self) -> f64 {
        self.policy.written_premium
    }

    /// Earned premium KPI for this row
    pub fn earned_premium(&self) -> f64 {
        self.buckets.total_earned()
    }

    /// Exposure KPI for this row
    pub fn exposure(&self) -> f64 {
        self.buckets.total_exposure()
    }
}

/// Derive the year buckets for a single policy row.
pub fn derive_year_buckets(policy: &PolicyRecord, config: &AllocationConfig) -> YearBuckets {
    let mut buckets = YearBuckets::default();

    for year in config.years() {
        let exposure = annual_exposure(policy, year, config.extraction_date, config.add_one_day);
        buckets.exposure.insert(year, exposure);

        match config.shape {
            PortfolioShape::RowPerContractYear => {
                // The row already represents one annual installment; written
                // premium is attributed by effective year at aggregation time
                buckets
                    .earned
                    .insert(year, exposure * policy.written_premium);
            }
            PortfolioShape::RowPerContract => {
                buckets.written.insert(
                    year,
                    written_premium_for_year(policy, year, config.extraction_date),
                );
                buckets
                    .earned
                    .insert(year, exposure * installment_amount(policy));
            }
        }
    }

    buckets
}

/// Derive year buckets for a whole portfolio, in input order.
pub fn derive_portfolio_years(
    policies: &[PolicyRecord],
    config: &AllocationConfig,
) -> Vec<PolicyYears> {
    policies
        .par_iter()
        .map(|policy| PolicyYears {
            policy: policy.clone(),
            buckets: derive_year_buckets(policy, config),
        })
        .collect()
}

/// Write the enriched portfolio as flat CSV with `<metric>_in_<year>` columns.
///
/// This is the compatibility serialization of the bucket maps for downstream
/// collaborators; internal logic never reads these names back.
pub fn write_portfolio_csv<W: Write>(
    rows: &[PolicyYears],
    config: &AllocationConfig,
    writer: W,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut csv_writer = csv::Writer::from_writer(writer);

    let feature_names: Vec<String> = rows
        .first()
        .map(|r| r.policy.features.keys().cloned().collect())
        .unwrap_or_default();

    let mut header = vec!["policy_id".to_string()];
    header.extend(feature_names.iter().cloned());
    header.extend([
        "exposure".to_string(),
        "asif_written_premium_excl_taxes".to_string(),
        "asif_earned_premium".to_string(),
    ]);
    for year in config.years() {
        header.push(format!("exposure_in_{}", year));
        header.push(format!("asif_written_premium_in_{}", year));
        header.push(format!("asif_earned_premium_in_{}", year));
    }
    csv_writer.write_record(&header)?;

    for row in rows {
        let mut record = vec![row.policy.policy_id.clone()];
        for name in &feature_names {
            record.push(
                row.policy
                    .feature(name)
                    .map(|v| v.to_string())
                    .unwrap_or_default(),
            );
        }
        record.push(format!("{:.6}", row.exposure()));
        record.push(format!("{:.6}", row.written_premium()));
        record.push(format!("{:.6}", row.earned_premium()));
        for year in config.years() {
            record.push(format!("{:.6}", row.buckets.exposure_in(year)));
            record.push(format!("{:.6}", row.buckets.written_in(year)));
            record.push(format!("{:.6}", row.buckets.earned_in(year)));
        }
        csv_writer.write_record(&record)?;
    }

    csv_writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;
    use std::collections::BTreeMap;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn policy(id: &str, start: NaiveDate, end: NaiveDate, premium: f64, multiplier: u32) -> PolicyRecord {
        PolicyRecord {
            policy_id: id.to_string(),
            start_date: start,
            end_date: end,
            written_premium: premium,
            multiplier,
            features: BTreeMap::new(),
        }
    }

    fn config(shape: PortfolioShape) -> AllocationConfig {
        AllocationConfig {
            start_business_year: 2019,
            extraction_date: d(2023, 1, 1),
            shape,
            add_one_day: true,
        }
    }

    #[test]
    fn test_row_per_year_earned_tracks_exposure() {
        let p = policy("P1", d(2021, 4, 1), d(2022, 3, 31), 1200.0, 1);
        let buckets = derive_year_buckets(&p, &config(PortfolioShape::RowPerContractYear));

        let earned: f64 = buckets.earned.values().sum();
        assert_relative_eq!(earned, 1200.0, epsilon = 1200.0 / 365.0);
        assert!(buckets.written.is_empty());
        assert_relative_eq!(buckets.earned_in(2021), buckets.exposure_in(2021) * 1200.0);
    }

    #[test]
    fn test_full_contract_spreads_installments() {
        let p = policy("P2", d(2020, 1, 1), d(2023, 6, 30), 3000.0, 3);
        let buckets = derive_year_buckets(&p, &config(PortfolioShape::RowPerContract));

        assert_relative_eq!(buckets.written_in(2020), 1000.0);
        assert_relative_eq!(buckets.written_in(2021), 1000.0);
        assert_relative_eq!(buckets.written_in(2022), 1000.0);
        // Final anniversary (2023-01-01) is on the extraction date, so the
        // boundary-year installment is billed
        assert_relative_eq!(buckets.written_in(2023), 1000.0);
        // Earned premium per year is the exposed fraction of one installment
        assert_relative_eq!(
            buckets.earned_in(2020),
            buckets.exposure_in(2020) * 1000.0
        );
    }

    #[test]
    fn test_derivation_preserves_order() {
        let policies = vec![
            policy("B", d(2020, 1, 1), d(2020, 12, 31), 100.0, 1),
            policy("A", d(2021, 1, 1), d(2021, 12, 31), 200.0, 1),
        ];
        let rows = derive_portfolio_years(&policies, &config(PortfolioShape::RowPerContractYear));
        assert_eq!(rows[0].policy.policy_id, "B");
        assert_eq!(rows[1].policy.policy_id, "A");
    }

    #[test]
    fn test_flat_csv_headers() {
        let p = policy("P1", d(2021, 1, 1), d(2021, 12, 31), 100.0, 1);
        let cfg = AllocationConfig {
            start_business_year: 2021,
            extraction_date: d(2022, 1, 1),
            shape: PortfolioShape::RowPerContractYear,
            add_one_day: true,
        };
        let rows = derive_portfolio_years(&[p], &cfg);

        let mut out = Vec::new();
        write_portfolio_csv(&rows, &cfg, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let header = text.lines().next().unwrap();
        assert!(header.contains("exposure_in_2021"));
        assert!(header.contains("asif_earned_premium_in_2022"));
    }
}
