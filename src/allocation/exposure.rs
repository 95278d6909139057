//! Per-policy, per-calendar-year earned exposure

use chrono::{Duration, NaiveDate};

use crate::calendar::{year_day_count, year_start, Year};
use crate::portfolio::PolicyRecord;

/// Fraction of `year` during which the policy was in force, in [0, 1].
///
/// `start = max(Jan-1 of year, policy start)`;
/// `end = min(extraction date, Jan-1 of year+1 [+1 day if add_one_day],
/// policy end)`; exposure is the day count between the two over the year's
/// day count, floored at zero when the policy does not overlap the year and
/// capped at one (the extra inclusive-end day would otherwise push an
/// interior full year just past it).
pub fn annual_exposure(
    policy: &PolicyRecord,
    year: Year,
    extraction_date: NaiveDate,
    add_one_day: bool,
) -> f64 {
    // A policy starting on or after next Jan-1 never overlaps this year;
    // without the guard the +1-day bound leaks one day of exposure backwards
    if policy.start_date >= year_start(year + 1) {
        return 0.0;
    }
    let start = policy.start_date.max(year_start(year));

    let mut year_bound = year_start(year + 1);
    if add_one_day {
        year_bound += Duration::days(1);
    }
    let end = extraction_date.min(year_bound).min(policy.end_date);

    let days = (end - start).num_days() as f64;
    (days / year_day_count(year) as f64).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::collections::BTreeMap;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn policy(start: NaiveDate, end: NaiveDate) -> PolicyRecord {
        PolicyRecord {
            policy_id: "P1".to_string(),
            start_date: start,
            end_date: end,
            written_premium: 1000.0,
            multiplier: 1,
            features: BTreeMap::new(),
        }
    }

    #[test]
    fn test_no_overlap_is_zero() {
        let p = policy(d(2021, 4, 1), d(2022, 3, 31));
        let extraction = d(2023, 1, 1);
        assert_eq!(annual_exposure(&p, 2020, extraction, true), 0.0);
        assert_eq!(annual_exposure(&p, 2023, extraction, true), 0.0);
    }

    #[test]
    fn test_start_on_next_jan_first_earns_nothing() {
        // The inclusive-end day extension must not pull a contract starting
        // exactly on next Jan-1 back into the prior year
        let p = policy(d(2021, 1, 1), d(2022, 1, 1));
        assert_eq!(annual_exposure(&p, 2020, d(2021, 12, 31), true), 0.0);
        assert!(annual_exposure(&p, 2021, d(2021, 12, 31), true) > 0.0);
    }

    #[test]
    fn test_partial_year_in_unit_interval() {
        let p = policy(d(2021, 4, 1), d(2022, 3, 31));
        let e = annual_exposure(&p, 2021, d(2023, 1, 1), true);
        assert!(e > 0.0 && e <= 1.0);
    }

    #[test]
    fn test_annual_contract_sums_to_one() {
        // start 2021-04-01, end 2022-03-31, extraction 2023-01-01
        let p = policy(d(2021, 4, 1), d(2022, 3, 31));
        let extraction = d(2023, 1, 1);
        let total = annual_exposure(&p, 2021, extraction, true)
            + annual_exposure(&p, 2022, extraction, true);
        assert_relative_eq!(total, 1.0, epsilon = 1.0 / 365.0);
    }

    #[test]
    fn test_full_calendar_year() {
        let p = policy(d(2020, 1, 1), d(2020, 12, 31));
        // Leap year: 366 exposed days require the inclusive-end conversion
        assert_relative_eq!(
            annual_exposure(&p, 2020, d(2021, 6, 1), false),
            365.0 / 366.0
        );
    }

    #[test]
    fn test_extraction_cutoff() {
        let p = policy(d(2021, 1, 1), d(2021, 12, 31));
        let e = annual_exposure(&p, 2021, d(2021, 7, 1), false);
        assert_relative_eq!(e, 181.0 / 365.0);
    }

    #[test]
    fn test_exposure_conservation_over_lifetime() {
        // Sum of yearly fractions equals exposed days over average year length
        let p = policy(d(2019, 6, 15), d(2022, 6, 14));
        let extraction = d(2023, 1, 1);
        let summed: f64 = (2019..=2023)
            .map(|y| annual_exposure(&p, y, extraction, true))
            .sum();

        let exposed_days =
            (p.end_date.min(extraction) - p.start_date).num_days() as f64 + 1.0;
        let avg_year = (2019..=2022).map(year_day_count).sum::<u32>() as f64 / 4.0;
        assert_relative_eq!(summed, exposed_days / avg_year, epsilon = 2.0 / 365.0);
    }
}
