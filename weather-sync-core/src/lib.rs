//! Core library for the `weather-sync` runner.
//!
//! This crate defines:
//! - Configuration (city list, provider, sinks)
//! - Abstraction over weather providers and the HTTP transport
//! - The fetch, merge and persist pipeline with its sinks
//!
//! It is used by `weather-sync-cli`, but can also be driven directly with
//! scripted transports and sinks.

pub mod config;
pub mod dedup;
pub mod error;
pub mod fetch;
pub mod http;
pub mod model;
pub mod pipeline;
pub mod provider;
pub mod sink;

#[cfg(test)]
mod testing;

pub use config::{Config, FileSinkConfig, HostedStoreConfig, ProviderConfig, WarehouseConfig};
pub use error::{FetchError, RunError, SinkError};
pub use fetch::WeatherFetcher;
pub use http::{HttpTransport, ReqwestTransport, Sleeper, TokioSleeper};
pub use model::{DateRange, WeatherRecord};
pub use pipeline::{Pipeline, RunPlan, RunReport};
pub use provider::{ProviderId, WeatherProvider};
pub use sink::{Sink, SinkKind};
