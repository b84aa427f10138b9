//! Thin seam over HTTP and wall-clock waiting.
//!
//! Providers and the warehouse sink describe requests as plain [`HttpRequest`]
//! values; a [`HttpTransport`] executes them. Production code uses reqwest and
//! tokio; tests substitute scripted implementations.

use std::{fmt::Debug, time::Duration};

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub bearer_token: Option<String>,
    pub json: Option<serde_json::Value>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            query: Vec::new(),
            bearer_token: None,
            json: None,
        }
    }

    pub fn post(url: impl Into<String>, json: serde_json::Value) -> Self {
        Self {
            method: Method::POST,
            json: Some(json),
            ..Self::get(url)
        }
    }

    pub fn query(mut self, key: &str, value: impl Into<String>) -> Self {
        self.query.push((key.to_string(), value.into()));
        self
    }

    pub fn bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    /// Value of the first query parameter named `key`.
    #[cfg(test)]
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct HttpReply {
    pub status: StatusCode,
    pub body: String,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),

    /// Failure reported by a transport that is not backed by reqwest.
    #[error("{0}")]
    Unreachable(String),
}

#[async_trait]
pub trait HttpTransport: Send + Sync + Debug {
    async fn send(&self, request: HttpRequest) -> Result<HttpReply, TransportError>;
}

#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    http: Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpReply, TransportError> {
        let mut builder = self
            .http
            .request(request.method, request.url.as_str())
            .query(&request.query);

        if let Some(token) = &request.bearer_token {
            builder = builder.bearer_auth(token);
        }
        if let Some(json) = &request.json {
            builder = builder.json(json);
        }

        let res = builder.send().await?;
        let status = res.status();
        let body = res.text().await?;

        Ok(HttpReply { status, body })
    }
}

#[async_trait]
pub trait Sleeper: Send + Sync + Debug {
    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

pub(crate) fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    if body.chars().count() > MAX {
        format!("{}...", body.chars().take(MAX).collect::<String>())
    } else {
        body.to_string()
    }
}
