use chrono::{Datelike, Duration, NaiveDate, Weekday};
use std::collections::HashSet;
use tracing::debug;

use super::HolidayLookup;
use crate::error::{ScheduleError, ScheduleResult};

/// Direction of travel along the calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

impl Direction {
    fn sign(self) -> i64 {
        match self {
            Direction::Forward => 1,
            Direction::Backward => -1,
        }
    }
}

/// Business-day arithmetic over a holiday source and a weekend rule.
///
/// Each call fetches the holidays it needs once, over a window of
/// `3 × |n|` calendar days plus padding in the direction of travel. If a
/// long run of holidays exhausts that window the next one is fetched.
pub struct BusinessDayCalculator<'a, H: HolidayLookup + ?Sized> {
    holidays: &'a H,
    non_working_days: [bool; 7],
    padding_days: i64,
}

impl<'a, H: HolidayLookup + ?Sized> BusinessDayCalculator<'a, H> {
    pub const DEFAULT_PADDING_DAYS: i64 = 14;

    /// Calculator with a Saturday/Sunday weekend.
    pub fn new(holidays: &'a H) -> Self {
        Self::with_weekend(holidays, &[Weekday::Sat, Weekday::Sun])
    }

    pub fn with_weekend(holidays: &'a H, non_working_days: &[Weekday]) -> Self {
        let mut mask = [false; 7];
        for day in non_working_days {
            mask[day.num_days_from_monday() as usize] = true;
        }
        Self {
            holidays,
            non_working_days: mask,
            padding_days: Self::DEFAULT_PADDING_DAYS,
        }
    }

    pub fn with_padding(mut self, padding_days: i64) -> Self {
        self.padding_days = padding_days.max(0);
        self
    }

    pub fn is_weekend(&self, date: NaiveDate) -> bool {
        self.non_working_days[date.weekday().num_days_from_monday() as usize]
    }

    /// Move `n` business days forward (`n > 0`) or backward (`n < 0`).
    pub fn add_business_days(
        &self,
        date: NaiveDate,
        n: i64,
        country: &str,
    ) -> ScheduleResult<NaiveDate> {
        if n == 0 {
            return Ok(date);
        }
        if self.non_working_days.iter().all(|&off| off) {
            return Err(ScheduleError::NoWorkingDays);
        }
        let direction = if n > 0 {
            Direction::Forward
        } else {
            Direction::Backward
        };
        let mut remaining = n.checked_abs().ok_or(ScheduleError::DateOutOfRange { date })?;
        let span = remaining
            .checked_mul(3)
            .and_then(|days| days.checked_add(self.padding_days))
            .ok_or(ScheduleError::DateOutOfRange { date })?;

        let mut frontier = shift(date, span * direction.sign())?;
        let mut holidays = self.fetch_toward(date, frontier, direction, country)?;

        let mut current = date;
        while remaining > 0 {
            current = shift(current, direction.sign())?;
            if passed(current, frontier, direction) {
                let next_frontier = shift(frontier, span * direction.sign())?;
                debug!(
                    country,
                    %date,
                    n,
                    %frontier,
                    %next_frontier,
                    "holiday window exhausted, fetching next window"
                );
                let from = shift(frontier, direction.sign())?;
                holidays.extend(self.fetch_toward(from, next_frontier, direction, country)?);
                frontier = next_frontier;
            }
            if !self.is_weekend(current) && !holidays.contains(&current) {
                remaining -= 1;
            }
        }
        Ok(current)
    }

    pub fn subtract_business_days(
        &self,
        date: NaiveDate,
        n: i64,
        country: &str,
    ) -> ScheduleResult<NaiveDate> {
        let negated = n.checked_neg().ok_or(ScheduleError::DateOutOfRange { date })?;
        self.add_business_days(date, negated, country)
    }

    /// Inclusive count of business days in `[start, end]`; negated when
    /// `start > end`.
    pub fn count_business_days_between(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        country: &str,
    ) -> ScheduleResult<i64> {
        if start > end {
            return self
                .count_business_days_between(end, start, country)
                .map(|count| -count);
        }
        let holidays: HashSet<NaiveDate> = self
            .holidays
            .holidays(country, start, end)?
            .into_iter()
            .collect();
        let count = start
            .iter_days()
            .take_while(|day| *day <= end)
            .filter(|day| !self.is_weekend(*day) && !holidays.contains(day))
            .count();
        Ok(count as i64)
    }

    pub fn is_business_day(&self, date: NaiveDate, country: &str) -> ScheduleResult<bool> {
        if self.is_weekend(date) {
            return Ok(false);
        }
        Ok(self.holidays.holidays(country, date, date)?.is_empty())
    }

    /// `date` itself when it is a business day, otherwise the nearest
    /// business day in `direction`.
    pub fn adjust_to_business_day(
        &self,
        date: NaiveDate,
        direction: Direction,
        country: &str,
    ) -> ScheduleResult<NaiveDate> {
        if self.is_business_day(date, country)? {
            return Ok(date);
        }
        self.add_business_days(date, direction.sign(), country)
    }

    fn fetch_toward(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        direction: Direction,
        country: &str,
    ) -> ScheduleResult<HashSet<NaiveDate>> {
        let (start, end) = match direction {
            Direction::Forward => (from, to),
            Direction::Backward => (to, from),
        };
        Ok(self
            .holidays
            .holidays(country, start, end)?
            .into_iter()
            .collect())
    }
}

fn shift(date: NaiveDate, days: i64) -> ScheduleResult<NaiveDate> {
    Duration::try_days(days)
        .and_then(|delta| date.checked_add_signed(delta))
        .ok_or(ScheduleError::DateOutOfRange { date })
}

fn passed(current: NaiveDate, frontier: NaiveDate, direction: Direction) -> bool {
    match direction {
        Direction::Forward => current > frontier,
        Direction::Backward => current < frontier,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::StaticHolidayCalendar;
    use crate::error::CalendarError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    struct Counting {
        inner: StaticHolidayCalendar,
        calls: AtomicUsize,
    }

    impl HolidayLookup for Counting {
        fn holidays(
            &self,
            country: &str,
            start: NaiveDate,
            end: NaiveDate,
        ) -> Result<Vec<NaiveDate>, CalendarError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.holidays(country, start, end)
        }
    }

    #[test]
    fn all_week_off_is_an_error_not_a_spin() {
        let cal = StaticHolidayCalendar::new();
        let week = [
            Weekday::Mon,
            Weekday::Tue,
            Weekday::Wed,
            Weekday::Thu,
            Weekday::Fri,
            Weekday::Sat,
            Weekday::Sun,
        ];
        let calc = BusinessDayCalculator::with_weekend(&cal, &week);
        assert!(matches!(
            calc.add_business_days(d(2025, 1, 6), 3, "JP"),
            Err(ScheduleError::NoWorkingDays)
        ));
        assert!(matches!(
            calc.adjust_to_business_day(d(2025, 1, 6), Direction::Backward, "JP"),
            Err(ScheduleError::NoWorkingDays)
        ));
        assert_eq!(calc.add_business_days(d(2025, 1, 6), 0, "JP").unwrap(), d(2025, 1, 6));
    }

    #[test]
    fn zero_days_is_identity() {
        let cal = StaticHolidayCalendar::new();
        let calc = BusinessDayCalculator::new(&cal);
        // Saturday stays Saturday.
        assert_eq!(calc.add_business_days(d(2025, 1, 4), 0, "JP").unwrap(), d(2025, 1, 4));
    }

    #[test]
    fn skips_weekends_both_ways() {
        let cal = StaticHolidayCalendar::new();
        let calc = BusinessDayCalculator::new(&cal);
        // Friday + 1 => Monday
        assert_eq!(calc.add_business_days(d(2025, 1, 3), 1, "JP").unwrap(), d(2025, 1, 6));
        // Monday - 1 => Friday
        assert_eq!(calc.subtract_business_days(d(2025, 1, 6), 1, "JP").unwrap(), d(2025, 1, 3));
        // Monday + 4 => Friday
        assert_eq!(calc.add_business_days(d(2025, 1, 6), 4, "JP").unwrap(), d(2025, 1, 10));
    }

    #[test]
    fn skips_golden_week_with_one_lookup() {
        let counting = Counting {
            inner: StaticHolidayCalendar::japan(2025, 2025),
            calls: AtomicUsize::new(0),
        };
        let calc = BusinessDayCalculator::new(&counting);
        // Fri 2025-05-02 + 1 => Wed 2025-05-07 (3-6 are holidays or weekend).
        assert_eq!(calc.add_business_days(d(2025, 5, 2), 1, "JP").unwrap(), d(2025, 5, 7));
        assert_eq!(counting.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn long_holiday_runs_extend_the_window() {
        let mut cal = StaticHolidayCalendar::new();
        // Three weeks of closure starting Monday 2025-08-04.
        cal.add_holidays("JP", d(2025, 8, 4).iter_days().take(21));
        let calc = BusinessDayCalculator::new(&cal).with_padding(0);
        assert_eq!(calc.add_business_days(d(2025, 8, 1), 1, "JP").unwrap(), d(2025, 8, 25));
    }

    #[test]
    fn counts_inclusive_and_signed() {
        let mut cal = StaticHolidayCalendar::new();
        cal.add_holiday("JP", d(2025, 1, 8));
        let calc = BusinessDayCalculator::new(&cal);
        // Mon 6 .. Fri 10 minus Wed 8
        assert_eq!(calc.count_business_days_between(d(2025, 1, 6), d(2025, 1, 10), "JP").unwrap(), 4);
        assert_eq!(calc.count_business_days_between(d(2025, 1, 10), d(2025, 1, 6), "JP").unwrap(), -4);
        assert_eq!(calc.count_business_days_between(d(2025, 1, 4), d(2025, 1, 5), "JP").unwrap(), 0);
    }

    #[test]
    fn adjust_moves_only_non_business_days() {
        let mut cal = StaticHolidayCalendar::new();
        cal.add_holiday("JP", d(2025, 1, 6));
        let calc = BusinessDayCalculator::new(&cal);
        assert_eq!(
            calc.adjust_to_business_day(d(2025, 1, 7), Direction::Backward, "JP").unwrap(),
            d(2025, 1, 7)
        );
        // Sunday backward => Friday
        assert_eq!(
            calc.adjust_to_business_day(d(2025, 1, 5), Direction::Backward, "JP").unwrap(),
            d(2025, 1, 3)
        );
        // Sunday forward skips the Monday holiday => Tuesday
        assert_eq!(
            calc.adjust_to_business_day(d(2025, 1, 5), Direction::Forward, "JP").unwrap(),
            d(2025, 1, 7)
        );
        assert!(!calc.is_business_day(d(2025, 1, 6), "JP").unwrap());
    }

    #[test]
    fn custom_weekend_is_respected() {
        let cal = StaticHolidayCalendar::new();
        let calc = BusinessDayCalculator::with_weekend(&cal, &[Weekday::Fri, Weekday::Sat]);
        // Thursday + 1 => Sunday
        assert_eq!(calc.add_business_days(d(2025, 1, 2), 1, "AE").unwrap(), d(2025, 1, 5));
    }

    #[test]
    fn overflow_is_reported() {
        let cal = StaticHolidayCalendar::new();
        let calc = BusinessDayCalculator::new(&cal);
        assert!(matches!(
            calc.add_business_days(NaiveDate::MAX, 1, "JP"),
            Err(ScheduleError::DateOutOfRange { .. })
        ));
    }
}
