use std::path::PathBuf;

use reqwest::StatusCode;
use thiserror::Error;

use crate::{http::TransportError, provider::ProviderId};

/// Failure to obtain records for a single city. The run skips the city and continues.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("location must not be empty")]
    EmptyLocation,

    #[error("{provider} does not support {what}")]
    Unsupported { provider: ProviderId, what: String },

    #[error("invalid base URL '{url}': {reason}")]
    BaseUrl { url: String, reason: String },

    #[error("request for '{location}' failed")]
    Transport {
        location: String,
        #[source]
        source: TransportError,
    },

    #[error("request for '{location}' was still rate limited after {attempts} attempts")]
    RateLimited { location: String, attempts: u32 },

    #[error("request for '{location}' failed with status {status}: {body}")]
    Status {
        location: String,
        status: StatusCode,
        body: String,
    },

    #[error("failed to parse {provider} response for '{location}'")]
    Parse {
        provider: ProviderId,
        location: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Failure to read or write a destination.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to access '{path}'")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed CSV in '{path}'")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("{sink} request failed")]
    Transport {
        sink: &'static str,
        #[source]
        source: TransportError,
    },

    #[error("{sink} {operation} failed with status {status}: {body}")]
    Status {
        sink: &'static str,
        operation: String,
        status: StatusCode,
        body: String,
    },

    #[error("{sink} rejected {rows} row(s): {detail}")]
    Rejected {
        sink: &'static str,
        rows: usize,
        detail: String,
    },

    #[error("unexpected {sink} response")]
    Response {
        sink: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("database operation failed")]
    Database(#[from] sqlx::Error),

    #[error("'{0}' is not a valid table name")]
    InvalidIdentifier(String),

    #[error("missing credential: environment variable {0} is not set")]
    MissingCredential(String),
}

/// Conditions that end a run before anything is persisted.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("no data collected: all {cities} location(s) failed to fetch")]
    EmptyResult { cities: usize },
}

/// Render an error together with its `source()` chain, `outer: inner: root`.
pub fn display_chain(err: &dyn std::error::Error) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        out.push_str(": ");
        out.push_str(&inner.to_string());
        source = inner.source();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_chain_includes_sources() {
        let err = FetchError::Transport {
            location: "Toronto".into(),
            source: TransportError::Unreachable("connection refused".into()),
        };

        assert_eq!(display_chain(&err), "request for 'Toronto' failed: connection refused");
    }

    #[test]
    fn empty_result_mentions_no_data() {
        let err = RunError::EmptyResult { cities: 1 };
        assert!(err.to_string().starts_with("no data collected"));
    }
}
