use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

/// One day of weather for one city, in metric units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherRecord {
    pub city: String,
    pub date: NaiveDate,
    /// Absent for providers that only report a single observation.
    pub temp_max: Option<f64>,
    pub temp_min: Option<f64>,
    pub temp_avg: f64,
    pub humidity: f64,
    pub precipitation: f64,
    /// km/h
    pub wind_speed: f64,
    pub conditions: String,
    /// Millibars, when the provider reports it.
    pub pressure: Option<f64>,
}

/// Natural key of a [`WeatherRecord`].
pub type RecordKey<'a> = (&'a str, NaiveDate);

impl WeatherRecord {
    pub fn key(&self) -> RecordKey<'_> {
        (self.city.as_str(), self.date)
    }
}

/// Strip region/country suffixes from a free-text location such as
/// `"Halifax,NS,Canada"`.
pub fn canonical_city(location: &str) -> &str {
    location.split(',').next().unwrap_or_default().trim()
}

/// Inclusive range of observation days ending on "today".
///
/// Only built through [`DateRange::today`] and [`DateRange::trailing`], so
/// `start <= end <= today` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    pub fn today(today: NaiveDate) -> Self {
        Self { start: today, end: today }
    }

    /// `days` days before `today` up to and including `today`.
    pub fn trailing(days: u32, today: NaiveDate) -> Self {
        let start = today
            .checked_sub_signed(Duration::days(i64::from(days)))
            .unwrap_or(NaiveDate::MIN);
        Self { start, end: today }
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn is_single_day(&self) -> bool {
        self.start == self.end
    }
}
