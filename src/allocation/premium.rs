//! Written-premium allocation for row-per-full-contract portfolios
//!
//! Premium is billed by installment, not continuously: a contract with
//! `multiplier` installments bills `premium / multiplier` once per contract
//! anniversary, so a calendar year only carries written premium when its
//! installment has actually fallen due by the extraction date.

use chrono::NaiveDate;

use crate::calendar::{add_years, Year};
use crate::portfolio::PolicyRecord;

/// Per-installment written premium; zero when the installment count is zero.
pub fn installment_amount(policy: &PolicyRecord) -> f64 {
    if policy.multiplier > 0 {
        policy.written_premium / policy.multiplier as f64
    } else {
        0.0
    }
}

/// Written premium attributable to `year` for a single-row contract.
///
/// Outside `[start.year, end.year]` the amount is zero. In the boundary year
/// (`year == end.year`) three not-yet-due rules apply, first match wins:
/// (a) the year is still within the first `multiplier` contract years and the
/// contract ends at or before the `multiplier - 1` anniversary;
/// (b) the contract ends at or before the `multiplier` anniversary;
/// (c) the extraction date precedes the `multiplier` anniversary, so the
/// installment has not been billed yet.
pub fn written_premium_for_year(
    policy: &PolicyRecord,
    year: Year,
    extraction_date: NaiveDate,
) -> f64 {
    let start_year = policy.start_year();
    let end_year = chrono::Datelike::year(&policy.end_date);

    if year < start_year || year > end_year {
        return 0.0;
    }

    let amount = installment_amount(policy);
    if year != end_year || policy.multiplier == 0 {
        return amount;
    }

    let multiplier = policy.multiplier as i32;
    let within_first_installments = year < start_year + multiplier;
    let penultimate_anniversary = add_years(policy.start_date, multiplier - 1);
    let final_anniversary = add_years(policy.start_date, multiplier);

    if within_first_installments && policy.end_date <= penultimate_anniversary {
        0.0
    } else if policy.end_date <= final_anniversary {
        0.0
    } else if extraction_date < final_anniversary {
        0.0
    } else {
        amount
    }
}

/// Installment count for a portfolio whose single row per policy carries only
/// the latest annual premium.
///
/// `nominal_length_years` is the contract length in whole years. A zero-length
/// or same-day contract bills nothing; otherwise the nominal count applies,
/// reduced by one (floored at one) when the contract actually ended at or
/// before its `nominal_length_years - 1` anniversary.
pub fn installment_count(start: NaiveDate, end: NaiveDate, nominal_length_years: u32) -> u32 {
    if nominal_length_years == 0 || end == start {
        return 0;
    }

    let derived_end = add_years(start, nominal_length_years as i32 - 1);
    if derived_end < end {
        nominal_length_years
    } else {
        (nominal_length_years - 1).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::collections::BTreeMap;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn policy(start: NaiveDate, end: NaiveDate, premium: f64, multiplier: u32) -> PolicyRecord {
        PolicyRecord {
            policy_id: "P1".to_string(),
            start_date: start,
            end_date: end,
            written_premium: premium,
            multiplier,
            features: BTreeMap::new(),
        }
    }

    #[test]
    fn test_outside_contract_years() {
        let p = policy(d(2020, 1, 1), d(2022, 12, 31), 3000.0, 3);
        let extraction = d(2023, 6, 1);
        assert_eq!(written_premium_for_year(&p, 2019, extraction), 0.0);
        assert_eq!(written_premium_for_year(&p, 2023, extraction), 0.0);
    }

    #[test]
    fn test_interior_year_bills_one_installment() {
        let p = policy(d(2020, 1, 1), d(2022, 12, 31), 3000.0, 3);
        assert_relative_eq!(written_premium_for_year(&p, 2020, d(2023, 6, 1)), 1000.0);
        assert_relative_eq!(written_premium_for_year(&p, 2021, d(2023, 6, 1)), 1000.0);
    }

    #[test]
    fn test_final_installment_not_yet_billed() {
        // multiplier=3, start=2020-01-01, end=2022-12-31, extraction=2021-06-01:
        // the 2022 installment is not due because the contract ends before the
        // third anniversary (2023-01-01)
        let p = policy(d(2020, 1, 1), d(2022, 12, 31), 3000.0, 3);
        assert_eq!(written_premium_for_year(&p, 2022, d(2021, 6, 1)), 0.0);
    }

    #[test]
    fn test_exact_boundary_contract() {
        // Contract exactly `multiplier` years long ending exactly at the
        // multiplier anniversary: the boundary-year installment is not due
        let start = d(2020, 3, 1);
        let p = policy(start, add_years(start, 3), 3000.0, 3);
        assert_eq!(written_premium_for_year(&p, 2023, d(2024, 1, 1)), 0.0);
    }

    #[test]
    fn test_extraction_before_final_anniversary() {
        // Contract runs past the final anniversary but the data extraction
        // precedes it: rule (c)
        let p = policy(d(2020, 1, 1), d(2023, 6, 30), 3000.0, 3);
        assert_eq!(written_premium_for_year(&p, 2023, d(2022, 12, 1)), 0.0);
        assert_relative_eq!(written_premium_for_year(&p, 2023, d(2023, 2, 1)), 1000.0);
    }

    #[test]
    fn test_zero_multiplier_short_circuits() {
        let p = policy(d(2020, 1, 1), d(2021, 12, 31), 1000.0, 0);
        assert_eq!(installment_amount(&p), 0.0);
        assert_eq!(written_premium_for_year(&p, 2020, d(2022, 1, 1)), 0.0);
    }

    #[test]
    fn test_installment_count() {
        let start = d(2020, 1, 1);
        assert_eq!(installment_count(start, start, 3), 0);
        assert_eq!(installment_count(start, d(2023, 6, 30), 3), 3);
        // Ended on the penultimate anniversary: one installment fewer
        assert_eq!(installment_count(start, d(2022, 1, 1), 3), 2);
        assert_eq!(installment_count(start, d(2020, 6, 1), 1), 1);
        assert_eq!(installment_count(start, d(2021, 1, 1), 0), 0);
    }
}
