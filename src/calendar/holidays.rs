//! Generators for national holiday calendars.
//!
//! Japanese holidays follow the rules in force since 2020 (including the
//! Olympic moves of 2020 and 2021), the Emperor's Birthday change of 2019,
//! and the equinox approximation valid for 1980 through 2099.

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use std::collections::BTreeSet;

/// Find the nth occurrence of a weekday in a month.
pub fn nth_weekday(year: i32, month: u32, weekday: Weekday, n: u32) -> Option<NaiveDate> {
    NaiveDate::from_weekday_of_month_opt(year, month, weekday, u8::try_from(n).ok()?)
}

/// Find the last occurrence of a weekday in a month.
pub fn last_weekday(year: i32, month: u32, weekday: Weekday) -> Option<NaiveDate> {
    let first_of_next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    let mut date = first_of_next.pred_opt()?;
    while date.weekday() != weekday {
        date = date.pred_opt()?;
    }
    Some(date)
}

fn equinox_day(year: i32, base: f64) -> u32 {
    let elapsed = f64::from(year - 1980);
    let leap_corrections = (year - 1980).div_euclid(4);
    (base + 0.242_194 * elapsed).floor() as u32 - leap_corrections as u32
}

pub fn vernal_equinox(year: i32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, 3, equinox_day(year, 20.8431))
}

pub fn autumnal_equinox(year: i32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, 9, equinox_day(year, 23.2488))
}

/// Japanese national holidays for one year, sorted, including substitute
/// holidays and citizens' holidays sandwiched between two holidays.
pub fn japanese_holidays(year: i32) -> Vec<NaiveDate> {
    let ymd = |m: u32, d: u32| NaiveDate::from_ymd_opt(year, m, d);

    let (marine, sports, mountain) = match year {
        2020 => (ymd(7, 23), ymd(7, 24), ymd(8, 10)),
        2021 => (ymd(7, 22), ymd(7, 23), ymd(8, 8)),
        _ => (
            nth_weekday(year, 7, Weekday::Mon, 3),
            nth_weekday(year, 10, Weekday::Mon, 2),
            ymd(8, 11),
        ),
    };
    let emperor = match year {
        ..=2018 => ymd(12, 23),
        2019 => None,
        _ => ymd(2, 23),
    };

    let mut days: BTreeSet<NaiveDate> = [
        ymd(1, 1),
        nth_weekday(year, 1, Weekday::Mon, 2),
        ymd(2, 11),
        emperor,
        vernal_equinox(year),
        ymd(4, 29),
        ymd(5, 3),
        ymd(5, 4),
        ymd(5, 5),
        marine,
        mountain,
        nth_weekday(year, 9, Weekday::Mon, 3),
        autumnal_equinox(year),
        sports,
        ymd(11, 3),
        ymd(11, 23),
    ]
    .into_iter()
    .flatten()
    .collect();

    // A weekday squeezed between two holidays is itself a holiday.
    let sandwiched: Vec<NaiveDate> = days
        .iter()
        .filter_map(|day| {
            let middle = *day + Duration::days(1);
            let after = *day + Duration::days(2);
            (days.contains(&after) && !days.contains(&middle) && middle.weekday() != Weekday::Sun)
                .then_some(middle)
        })
        .collect();
    days.extend(sandwiched);

    // A holiday on Sunday moves to the next day that is not already one.
    let sundays: Vec<NaiveDate> = days
        .iter()
        .copied()
        .filter(|day| day.weekday() == Weekday::Sun)
        .collect();
    for sunday in sundays {
        let mut substitute = sunday + Duration::days(1);
        while days.contains(&substitute) {
            substitute += Duration::days(1);
        }
        days.insert(substitute);
    }

    days.into_iter().filter(|day| day.year() == year).collect()
}

/// US federal holidays for one year, sorted.
pub fn us_federal_holidays(year: i32) -> Vec<NaiveDate> {
    let ymd = |m: u32, d: u32| NaiveDate::from_ymd_opt(year, m, d);
    let mut days: Vec<NaiveDate> = [
        // New Year's Day
        ymd(1, 1),
        // Martin Luther King Jr. Day (3rd Monday in January)
        nth_weekday(year, 1, Weekday::Mon, 3),
        // Presidents' Day (3rd Monday in February)
        nth_weekday(year, 2, Weekday::Mon, 3),
        // Memorial Day (last Monday in May)
        last_weekday(year, 5, Weekday::Mon),
        ymd(6, 19),
        ymd(7, 4),
        // Labor Day (1st Monday in September)
        nth_weekday(year, 9, Weekday::Mon, 1),
        // Columbus Day (2nd Monday in October)
        nth_weekday(year, 10, Weekday::Mon, 2),
        ymd(11, 11),
        // Thanksgiving (4th Thursday in November)
        nth_weekday(year, 11, Weekday::Thu, 4),
        ymd(12, 25),
    ]
    .into_iter()
    .flatten()
    .collect();
    days.sort();
    days
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn japanese_2025_matches_official_list() {
        let expected = vec![
            d(2025, 1, 1),
            d(2025, 1, 13),
            d(2025, 2, 11),
            d(2025, 2, 23),
            d(2025, 2, 24),
            d(2025, 3, 20),
            d(2025, 4, 29),
            d(2025, 5, 3),
            d(2025, 5, 4),
            d(2025, 5, 5),
            d(2025, 5, 6),
            d(2025, 7, 21),
            d(2025, 8, 11),
            d(2025, 9, 15),
            d(2025, 9, 23),
            d(2025, 10, 13),
            d(2025, 11, 3),
            d(2025, 11, 23),
            d(2025, 11, 24),
        ];
        assert_eq!(japanese_holidays(2025), expected);
    }

    #[test]
    fn citizens_holiday_fills_september_gap() {
        // 2026: Respect for the Aged Day on 9/21, equinox on 9/23.
        let days = japanese_holidays(2026);
        assert!(days.contains(&d(2026, 9, 21)));
        assert!(days.contains(&d(2026, 9, 22)));
        assert!(days.contains(&d(2026, 9, 23)));
    }

    #[test]
    fn equinoxes_for_known_years() {
        assert_eq!(vernal_equinox(2024), Some(d(2024, 3, 20)));
        assert_eq!(autumnal_equinox(2024), Some(d(2024, 9, 22)));
        assert_eq!(vernal_equinox(2027), Some(d(2027, 3, 21)));
    }

    #[test]
    fn us_holidays_include_floating_mondays() {
        let days = us_federal_holidays(2025);
        assert!(days.contains(&d(2025, 1, 20)));
        assert!(days.contains(&d(2025, 5, 26)));
        assert!(days.contains(&d(2025, 11, 27)));
        assert_eq!(days.len(), 11);
    }

    #[test]
    fn last_weekday_handles_december() {
        assert_eq!(last_weekday(2025, 12, Weekday::Wed), Some(d(2025, 12, 31)));
    }
}
