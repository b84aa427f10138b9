use crate::{
    config::ProviderConfig,
    error::FetchError,
    http::HttpRequest,
    model::{DateRange, WeatherRecord},
    provider::{visualcrossing::VisualCrossingProvider, weatherapi::WeatherApiProvider},
};
use serde::{Deserialize, Serialize};
use std::{convert::TryFrom, fmt::Debug};

pub mod visualcrossing;
pub mod weatherapi;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    #[default]
    VisualCrossing,
    WeatherApi,
}

impl ProviderId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::VisualCrossing => "visualcrossing",
            ProviderId::WeatherApi => "weatherapi",
        }
    }

    pub const fn all() -> &'static [ProviderId] {
        &[ProviderId::VisualCrossing, ProviderId::WeatherApi]
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for ProviderId {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let lower = value.to_lowercase();

        match lower.as_str() {
            "visualcrossing" => Ok(ProviderId::VisualCrossing),
            "weatherapi" => Ok(ProviderId::WeatherApi),
            _ => Err(anyhow::anyhow!(
                "Unknown provider '{value}'. Supported providers: visualcrossing, weatherapi."
            )),
        }
    }
}

/// Provider-specific request shape and field mapping.
///
/// Transport, status handling and rate limiting live in
/// [`WeatherFetcher`](crate::fetch::WeatherFetcher); a provider only knows how
/// to ask and how to read the answer.
pub trait WeatherProvider: Send + Sync + Debug {
    fn id(&self) -> ProviderId;

    fn build_request(&self, location: &str, range: &DateRange) -> Result<HttpRequest, FetchError>;

    /// Map a successful response body into records for `city`, in day order.
    fn parse_response(
        &self,
        city: &str,
        range: &DateRange,
        body: &str,
    ) -> Result<Vec<WeatherRecord>, FetchError>;
}

/// Construct the configured provider with an already-resolved API key.
pub fn provider_from_config(config: &ProviderConfig, api_key: String) -> Box<dyn WeatherProvider> {
    match config.kind {
        ProviderId::VisualCrossing => Box::new(VisualCrossingProvider::new(
            api_key,
            config.base_url.as_deref(),
        )),
        ProviderId::WeatherApi => Box::new(WeatherApiProvider::new(
            api_key,
            config.base_url.as_deref(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_id_as_str_roundtrip() {
        for id in ProviderId::all() {
            let s = id.as_str();
            let parsed = ProviderId::try_from(s).expect("roundtrip should succeed");
            assert_eq!(*id, parsed);
        }
    }

    #[test]
    fn provider_id_parse_is_case_insensitive() {
        assert_eq!(ProviderId::try_from("WeatherAPI").unwrap(), ProviderId::WeatherApi);
    }

    #[test]
    fn unknown_provider_error() {
        let err = ProviderId::try_from("doesnotexist").unwrap_err();
        assert!(err.to_string().contains("Unknown provider"));
    }

    #[test]
    fn provider_from_config_honours_kind() {
        let cfg = ProviderConfig {
            kind: ProviderId::WeatherApi,
            ..ProviderConfig::default()
        };
        let provider = provider_from_config(&cfg, "KEY".to_string());
        assert_eq!(provider.id(), ProviderId::WeatherApi);

        let provider = provider_from_config(&ProviderConfig::default(), "KEY".to_string());
        assert_eq!(provider.id(), ProviderId::VisualCrossing);
    }
}
