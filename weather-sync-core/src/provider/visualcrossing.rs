use chrono::NaiveDate;
use reqwest::Url;
use serde::Deserialize;

use crate::{
    error::FetchError,
    http::HttpRequest,
    model::{DateRange, WeatherRecord},
};

use super::{ProviderId, WeatherProvider};

pub const DEFAULT_BASE_URL: &str =
    "https://weather.visualcrossing.com/VisualCrossingWebServices/rest/services/timeline";

/// Visual Crossing timeline API: one entry per day in `days`.
#[derive(Debug, Clone)]
pub struct VisualCrossingProvider {
    api_key: String,
    base_url: String,
}

impl VisualCrossingProvider {
    pub fn new(api_key: String, base_url: Option<&str>) -> Self {
        Self {
            api_key,
            base_url: base_url.unwrap_or(DEFAULT_BASE_URL).to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct VcTimeline {
    days: Vec<VcDay>,
}

#[derive(Debug, Deserialize)]
struct VcDay {
    datetime: NaiveDate,
    tempmax: f64,
    tempmin: f64,
    temp: f64,
    humidity: f64,
    #[serde(default)]
    precip: Option<f64>,
    windspeed: f64,
    conditions: String,
    #[serde(default)]
    pressure: Option<f64>,
}

impl WeatherProvider for VisualCrossingProvider {
    fn id(&self) -> ProviderId {
        ProviderId::VisualCrossing
    }

    fn build_request(&self, location: &str, range: &DateRange) -> Result<HttpRequest, FetchError> {
        let base_err = |reason: String| FetchError::BaseUrl {
            url: self.base_url.clone(),
            reason,
        };

        let start = range.start().to_string();
        let end = range.end().to_string();

        let mut url = Url::parse(&self.base_url).map_err(|e| base_err(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|()| base_err("cannot be a base URL".to_string()))?
            .pop_if_empty()
            .extend([location, start.as_str(), end.as_str()]);

        Ok(HttpRequest::get(url.to_string())
            .query("unitGroup", "metric")
            .query("key", self.api_key.as_str())
            .query("include", "days")
            .query("contentType", "json"))
    }

    fn parse_response(
        &self,
        city: &str,
        _range: &DateRange,
        body: &str,
    ) -> Result<Vec<WeatherRecord>, FetchError> {
        let parsed: VcTimeline = serde_json::from_str(body).map_err(|source| FetchError::Parse {
            provider: self.id(),
            location: city.to_string(),
            source,
        })?;

        let mut records: Vec<WeatherRecord> = parsed
            .days
            .into_iter()
            .map(|day| WeatherRecord {
                city: city.to_string(),
                date: day.datetime,
                temp_max: Some(day.tempmax),
                temp_min: Some(day.tempmin),
                temp_avg: day.temp,
                humidity: day.humidity,
                precipitation: day.precip.unwrap_or(0.0),
                wind_speed: day.windspeed,
                conditions: day.conditions,
                pressure: day.pressure,
            })
            .collect();
        records.sort_by_key(|r| r.date);

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn provider() -> VisualCrossingProvider {
        VisualCrossingProvider::new("KEY".to_string(), None)
    }

    #[test]
    fn request_places_location_and_dates_in_path() {
        let range = DateRange::trailing(3, date("2024-06-04"));
        let req = provider().build_request("Halifax,NS,Canada", &range).unwrap();

        assert_eq!(
            req.url,
            format!("{DEFAULT_BASE_URL}/Halifax,NS,Canada/2024-06-01/2024-06-04")
        );
        assert_eq!(req.query_value("unitGroup"), Some("metric"));
        assert_eq!(req.query_value("key"), Some("KEY"));
        assert_eq!(req.query_value("include"), Some("days"));
    }

    #[test]
    fn request_escapes_spaces_and_tolerates_trailing_slash() {
        let provider = VisualCrossingProvider::new("KEY".into(), Some("https://vc.test/timeline/"));
        let range = DateRange::today(date("2024-06-01"));
        let req = provider.build_request("St. John's,NL", &range).unwrap();

        assert_eq!(req.url, "https://vc.test/timeline/St.%20John's,NL/2024-06-01/2024-06-01");
    }

    #[test]
    fn invalid_base_url_is_reported() {
        let provider = VisualCrossingProvider::new("KEY".into(), Some("not a url"));
        let err = provider
            .build_request("Toronto", &DateRange::today(date("2024-06-01")))
            .unwrap_err();
        assert!(matches!(err, FetchError::BaseUrl { .. }));
    }

    #[test]
    fn maps_day_fields_to_record() {
        let body = r#"{"days":[{"datetime":"2024-06-01","tempmax":25.0,"tempmin":15.0,"temp":20.0,"humidity":60,"windspeed":10.0,"conditions":"Clear"}]}"#;
        let range = DateRange::today(date("2024-06-01"));

        let records = provider().parse_response("Toronto", &range, body).unwrap();

        assert_eq!(
            records,
            vec![WeatherRecord {
                city: "Toronto".to_string(),
                date: date("2024-06-01"),
                temp_max: Some(25.0),
                temp_min: Some(15.0),
                temp_avg: 20.0,
                humidity: 60.0,
                precipitation: 0.0,
                wind_speed: 10.0,
                conditions: "Clear".to_string(),
                pressure: None,
            }]
        );
    }

    #[test]
    fn null_precip_defaults_to_zero_and_days_are_sorted() {
        let body = r#"{"days":[
            {"datetime":"2024-06-02","tempmax":1,"tempmin":0,"temp":0.5,"humidity":90,"precip":null,"windspeed":3,"conditions":"Snow","pressure":1012.5},
            {"datetime":"2024-06-01","tempmax":2,"tempmin":1,"temp":1.5,"humidity":80,"precip":4.2,"windspeed":5,"conditions":"Rain"}
        ]}"#;
        let range = DateRange::trailing(1, date("2024-06-02"));

        let records = provider().parse_response("Halifax", &range, body).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].date, date("2024-06-01"));
        assert_eq!(records[0].precipitation, 4.2);
        assert_eq!(records[1].precipitation, 0.0);
        assert_eq!(records[1].pressure, Some(1012.5));
        assert!(records.iter().all(|r| r.city == "Halifax"));
    }

    #[test]
    fn missing_required_field_is_parse_error() {
        let body = r#"{"days":[{"datetime":"2024-06-01","tempmin":15.0,"temp":20.0,"humidity":60,"windspeed":10.0,"conditions":"Clear"}]}"#;
        let err = provider()
            .parse_response("Toronto", &DateRange::today(date("2024-06-01")), body)
            .unwrap_err();

        assert!(matches!(err, FetchError::Parse { provider: ProviderId::VisualCrossing, .. }));
    }
}
