use serde::Deserialize;

use crate::{
    error::FetchError,
    http::HttpRequest,
    model::{DateRange, WeatherRecord},
};

use super::{ProviderId, WeatherProvider};

pub const DEFAULT_BASE_URL: &str = "https://api.weatherapi.com/v1";

/// WeatherAPI.com `current.json`: a single observation, recorded against the
/// last day of the requested range.
#[derive(Debug, Clone)]
pub struct WeatherApiProvider {
    api_key: String,
    base_url: String,
}

impl WeatherApiProvider {
    pub fn new(api_key: String, base_url: Option<&str>) -> Self {
        Self {
            api_key,
            base_url: base_url.unwrap_or(DEFAULT_BASE_URL).trim_end_matches('/').to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct WaCondition {
    text: String,
}

#[derive(Debug, Deserialize)]
struct WaCurrent {
    temp_c: f64,
    humidity: f64,
    wind_kph: f64,
    condition: WaCondition,
    pressure_mb: f64,
    #[serde(default)]
    precip_mm: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct WaResponse {
    current: WaCurrent,
}

impl WeatherProvider for WeatherApiProvider {
    fn id(&self) -> ProviderId {
        ProviderId::WeatherApi
    }

    fn build_request(&self, location: &str, range: &DateRange) -> Result<HttpRequest, FetchError> {
        if !range.is_single_day() {
            return Err(FetchError::Unsupported {
                provider: self.id(),
                what: format!(
                    "multi-day ranges ({}..={}); only current conditions are available",
                    range.start(),
                    range.end()
                ),
            });
        }

        Ok(HttpRequest::get(format!("{}/current.json", self.base_url))
            .query("key", self.api_key.as_str())
            .query("q", location)
            .query("aqi", "no"))
    }

    fn parse_response(
        &self,
        city: &str,
        range: &DateRange,
        body: &str,
    ) -> Result<Vec<WeatherRecord>, FetchError> {
        let parsed: WaResponse = serde_json::from_str(body).map_err(|source| FetchError::Parse {
            provider: self.id(),
            location: city.to_string(),
            source,
        })?;
        let current = parsed.current;

        Ok(vec![WeatherRecord {
            city: city.to_string(),
            date: range.end(),
            temp_max: None,
            temp_min: None,
            temp_avg: current.temp_c,
            humidity: current.humidity,
            precipitation: current.precip_mm.unwrap_or(0.0),
            wind_speed: current.wind_kph,
            conditions: current.condition.text,
            pressure: Some(current.pressure_mb),
        }])
    }
}
