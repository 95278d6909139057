//! Calendar arithmetic for exposure and premium allocation
//!
//! All allocation math works on `chrono::NaiveDate`. The one subtle operation
//! is `add_years`: installment due dates are anniversary dates, and a Feb-29
//! anniversary in a non-leap year must land on Mar-1 with exact-day semantics
//! (day-count offset between the two Jan-1s), not on the closest valid date.

use chrono::{Datelike, NaiveDate};

/// Calendar year (e.g. 2021)
pub type Year = i32;

/// Shift a date by `n` whole years.
///
/// When the target day does not exist (Feb-29 in a non-leap year), the result
/// is the original date plus the day-count difference between Jan-1 of the
/// target year and Jan-1 of the source year: `2020-02-29 + 1y == 2021-03-01`.
pub fn add_years(date: NaiveDate, n: i32) -> NaiveDate {
    match NaiveDate::from_ymd_opt(date.year() + n, date.month(), date.day()) {
        Some(shifted) => shifted,
        None => date + (year_start(date.year() + n) - year_start(date.year())),
    }
}

/// Number of days in a calendar year: 366 if leap, else 365.
pub fn year_day_count(year: Year) -> u32 {
    if is_leap_year(year) {
        366
    } else {
        365
    }
}

/// Jan-1 of the given year.
pub fn year_start(year: Year) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, 1, 1).expect("Jan-1 exists for every year")
}

fn is_leap_year(year: Year) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_add_years_plain() {
        assert_eq!(add_years(d(2019, 6, 15), 5), d(2024, 6, 15));
        assert_eq!(add_years(d(2021, 12, 31), 1), d(2022, 12, 31));
        assert_eq!(add_years(d(2024, 3, 1), -2), d(2022, 3, 1));
    }

    #[test]
    fn test_add_years_feb_29() {
        // Nonexistent Feb-29 target maps to the following Mar-1
        assert_eq!(add_years(d(2020, 2, 29), 1), d(2021, 3, 1));
        assert_eq!(add_years(d(2020, 2, 29), 4), d(2024, 2, 29));
    }

    #[test]
    fn test_year_day_count() {
        assert_eq!(year_day_count(2020), 366);
        assert_eq!(year_day_count(2021), 365);
        assert_eq!(year_day_count(2000), 366);
        assert_eq!(year_day_count(1900), 365);
    }

    #[test]
    fn test_year_start() {
        assert_eq!(year_start(2022), d(2022, 1, 1));
    }
}
