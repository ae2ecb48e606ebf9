pub mod business_days;
pub mod holidays;

use chrono::NaiveDate;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::debug;

use crate::error::{CalendarError, ScheduleError, ScheduleResult};

pub use business_days::{BusinessDayCalculator, Direction};

/// Source of holiday dates per country.
pub trait HolidayLookup {
    /// Holidays for `country` within `[start, end]`, inclusive.
    fn holidays(
        &self,
        country: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<NaiveDate>, CalendarError>;
}

impl<T: HolidayLookup + ?Sized> HolidayLookup for &T {
    fn holidays(
        &self,
        country: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<NaiveDate>, CalendarError> {
        (**self).holidays(country, start, end)
    }
}

impl<T: HolidayLookup + ?Sized> HolidayLookup for Arc<T> {
    fn holidays(
        &self,
        country: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<NaiveDate>, CalendarError> {
        (**self).holidays(country, start, end)
    }
}

/// Parse a `YYYY-MM-DD` calendar date.
pub fn parse_date(input: &str) -> Result<NaiveDate, chrono::ParseError> {
    NaiveDate::parse_from_str(input.trim(), "%Y-%m-%d")
}

pub(crate) fn check_range(
    country: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<(), CalendarError> {
    if start > end {
        return Err(CalendarError::InvalidRange {
            country: country.to_string(),
            start,
            end,
        });
    }
    Ok(())
}

pub(crate) fn country_key(country: &str) -> String {
    country.trim().to_ascii_uppercase()
}

/// In-memory holiday calendar keyed by country code.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticHolidayCalendar {
    holidays: HashMap<String, BTreeSet<NaiveDate>>,
}

impl StaticHolidayCalendar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Japanese national holidays for `start_year..=end_year`, under "JP".
    pub fn japan(start_year: i32, end_year: i32) -> Self {
        let mut calendar = Self::new();
        calendar.add_japanese_holidays(start_year, end_year);
        calendar
    }

    /// US federal holidays for `start_year..=end_year`, under "US".
    pub fn united_states(start_year: i32, end_year: i32) -> Self {
        let mut calendar = Self::new();
        calendar.add_us_holidays(start_year, end_year);
        calendar
    }

    pub fn add_japanese_holidays(&mut self, start_year: i32, end_year: i32) {
        let (start, end) = ordered(start_year, end_year);
        for year in start..=end {
            self.add_holidays("JP", holidays::japanese_holidays(year));
        }
    }

    pub fn add_us_holidays(&mut self, start_year: i32, end_year: i32) {
        let (start, end) = ordered(start_year, end_year);
        for year in start..=end {
            self.add_holidays("US", holidays::us_federal_holidays(year));
        }
    }

    pub fn add_holiday(&mut self, country: &str, date: NaiveDate) {
        self.holidays
            .entry(country_key(country))
            .or_default()
            .insert(date);
    }

    pub fn add_holidays<I>(&mut self, country: &str, dates: I)
    where
        I: IntoIterator<Item = NaiveDate>,
    {
        self.holidays
            .entry(country_key(country))
            .or_default()
            .extend(dates);
    }

    /// Same month/day every year, e.g. company closure days.
    pub fn add_recurring_holiday(
        &mut self,
        country: &str,
        month: u32,
        day: u32,
        start_year: i32,
        end_year: i32,
    ) {
        let (start, end) = ordered(start_year, end_year);
        let dates = (start..=end).filter_map(|year| NaiveDate::from_ymd_opt(year, month, day));
        self.add_holidays(country, dates);
    }

    pub fn is_holiday(&self, country: &str, date: NaiveDate) -> bool {
        self.holidays
            .get(&country_key(country))
            .is_some_and(|dates| dates.contains(&date))
    }

    pub fn countries(&self) -> Vec<String> {
        let mut codes: Vec<String> = self.holidays.keys().cloned().collect();
        codes.sort();
        codes
    }
}

impl HolidayLookup for StaticHolidayCalendar {
    fn holidays(
        &self,
        country: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<NaiveDate>, CalendarError> {
        check_range(country, start, end)?;
        Ok(self
            .holidays
            .get(&country_key(country))
            .map(|dates| dates.range(start..=end).copied().collect())
            .unwrap_or_default())
    }
}

fn ordered(a: i32, b: i32) -> (i32, i32) {
    if a <= b { (a, b) } else { (b, a) }
}

/// One prefetched lookup over a fixed window. Queries inside the window are
/// answered from memory; anything outside goes to the upstream source.
pub struct HolidayWindow<'a, H: HolidayLookup + ?Sized> {
    upstream: &'a H,
    country: String,
    start: NaiveDate,
    end: NaiveDate,
    dates: BTreeSet<NaiveDate>,
}

impl<'a, H: HolidayLookup + ?Sized> HolidayWindow<'a, H> {
    pub fn prefetch(
        upstream: &'a H,
        country: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> ScheduleResult<Self> {
        let dates = upstream
            .holidays(country, start, end)
            .map_err(ScheduleError::from)?
            .into_iter()
            .collect();
        Ok(Self {
            upstream,
            country: country_key(country),
            start,
            end,
            dates,
        })
    }

    pub fn covers(&self, country: &str, start: NaiveDate, end: NaiveDate) -> bool {
        country_key(country) == self.country && start >= self.start && end <= self.end
    }

    pub fn bounds(&self) -> (NaiveDate, NaiveDate) {
        (self.start, self.end)
    }
}

impl<H: HolidayLookup + ?Sized> HolidayLookup for HolidayWindow<'_, H> {
    fn holidays(
        &self,
        country: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<NaiveDate>, CalendarError> {
        check_range(country, start, end)?;
        if self.covers(country, start, end) {
            return Ok(self.dates.range(start..=end).copied().collect());
        }
        debug!(
            country,
            %start,
            %end,
            window_start = %self.start,
            window_end = %self.end,
            "holiday query outside prefetched window"
        );
        self.upstream.holidays(country, start, end)
    }
}
