use std::{sync::Arc, time::Duration};

use reqwest::StatusCode;

use crate::{
    error::FetchError,
    http::{HttpReply, HttpRequest, HttpTransport, Sleeper, truncate_body},
    model::{DateRange, WeatherRecord, canonical_city},
    provider::WeatherProvider,
};

pub const DEFAULT_RATE_LIMIT_DELAY: Duration = Duration::from_secs(60);

/// Issues provider requests and turns replies into records.
///
/// A `429 Too Many Requests` reply is retried exactly once after
/// `rate_limit_delay`; everything other than `200 OK` is a [`FetchError`].
#[derive(Debug)]
pub struct WeatherFetcher {
    provider: Box<dyn WeatherProvider>,
    transport: Arc<dyn HttpTransport>,
    sleeper: Arc<dyn Sleeper>,
    rate_limit_delay: Duration,
}

impl WeatherFetcher {
    pub fn new(
        provider: Box<dyn WeatherProvider>,
        transport: Arc<dyn HttpTransport>,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Self {
            provider,
            transport,
            sleeper,
            rate_limit_delay: DEFAULT_RATE_LIMIT_DELAY,
        }
    }

    pub fn with_rate_limit_delay(mut self, delay: Duration) -> Self {
        self.rate_limit_delay = delay;
        self
    }

    pub fn provider(&self) -> &dyn WeatherProvider {
        self.provider.as_ref()
    }

    /// Fetch every day of `range` for a free-text `location` such as
    /// `"Toronto,ON,Canada"`. Records carry the canonical city name.
    pub async fn fetch(
        &self,
        location: &str,
        range: &DateRange,
    ) -> Result<Vec<WeatherRecord>, FetchError> {
        let location = location.trim();
        let city = canonical_city(location);
        if city.is_empty() {
            return Err(FetchError::EmptyLocation);
        }

        let request = self.provider.build_request(location, range)?;
        let reply = self.send_with_retry(location, request).await?;

        if reply.status != StatusCode::OK {
            return Err(FetchError::Status {
                location: location.to_string(),
                status: reply.status,
                body: truncate_body(&reply.body),
            });
        }

        self.provider.parse_response(city, range, &reply.body)
    }

    async fn send_with_retry(
        &self,
        location: &str,
        request: HttpRequest,
    ) -> Result<HttpReply, FetchError> {
        let reply = self.send(location, request.clone()).await?;
        if reply.status != StatusCode::TOO_MANY_REQUESTS {
            return Ok(reply);
        }

        log::warn!(
            "Rate limited by {} for '{}', retrying once in {}s",
            self.provider.id(),
            location,
            self.rate_limit_delay.as_secs()
        );
        self.sleeper.sleep(self.rate_limit_delay).await;

        let retry = self.send(location, request).await?;
        if retry.status == StatusCode::TOO_MANY_REQUESTS {
            return Err(FetchError::RateLimited {
                location: location.to_string(),
                attempts: 2,
            });
        }

        Ok(retry)
    }

    async fn send(&self, location: &str, request: HttpRequest) -> Result<HttpReply, FetchError> {
        self.transport
            .send(request)
            .await
            .map_err(|source| FetchError::Transport {
                location: location.to_string(),
                source,
            })
    }
}
