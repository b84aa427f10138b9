//! Destinations for a fetched batch.
//!
//! Each sink decides how a batch meets existing data:
//! - [`FileSink`] reads the whole file, merges and rewrites it.
//! - [`WarehouseSink`] appends; it never deduplicates.
//! - [`HostedStoreSink`] upserts on `(city, date)`.

use std::{fmt::Debug, sync::Arc};

use async_trait::async_trait;

use crate::{
    config::SinksConfig,
    error::SinkError,
    http::HttpTransport,
    model::WeatherRecord,
};

pub mod file;
pub mod hosted;
pub mod warehouse;

pub use file::{CsvLayout, FileSink};
pub use hosted::HostedStoreSink;
pub use warehouse::WarehouseSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkKind {
    File,
    WarehouseTable,
    HostedStore,
}

impl std::fmt::Display for SinkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            SinkKind::File => "file",
            SinkKind::WarehouseTable => "warehouse",
            SinkKind::HostedStore => "hosted store",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistSummary {
    /// Rows sent to the destination in this run.
    pub written: usize,
    /// Rows held by the destination afterwards, when known.
    pub total: Option<usize>,
}

#[async_trait]
pub trait Sink: Send + Sync + Debug {
    fn kind(&self) -> SinkKind;

    /// Human-readable destination, used in diagnostics.
    fn describe(&self) -> String;

    async fn persist(&self, batch: &[WeatherRecord]) -> Result<PersistSummary, SinkError>;
}

/// Build every configured sink. Credentials are looked up through `env` so a
/// missing one is reported before anything is fetched.
pub fn sinks_from_config(
    config: &SinksConfig,
    transport: Arc<dyn HttpTransport>,
    env: impl Fn(&str) -> Option<String>,
) -> Result<Vec<Box<dyn Sink>>, SinkError> {
    let mut sinks: Vec<Box<dyn Sink>> = Vec::new();

    if let Some(file) = &config.file {
        sinks.push(Box::new(FileSink::new(&file.path, file.layout)));
    }

    if let Some(warehouse) = &config.warehouse {
        let token = env(&warehouse.access_token_env)
            .ok_or_else(|| SinkError::MissingCredential(warehouse.access_token_env.clone()))?;
        sinks.push(Box::new(WarehouseSink::new(transport, warehouse.clone(), token)));
    }

    if let Some(hosted) = &config.hosted {
        let url = env(&hosted.database_url_env)
            .ok_or_else(|| SinkError::MissingCredential(hosted.database_url_env.clone()))?;
        sinks.push(Box::new(HostedStoreSink::connect_lazy(&url, &hosted.table)?));
    }

    Ok(sinks)
}
