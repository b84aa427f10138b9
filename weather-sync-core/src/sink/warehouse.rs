use std::sync::Arc;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::OnceCell;

use crate::{
    config::WarehouseConfig,
    error::SinkError,
    http::{HttpReply, HttpRequest, HttpTransport, truncate_body},
    model::WeatherRecord,
};

use super::{PersistSummary, Sink, SinkKind};

pub const DEFAULT_API_BASE: &str = "https://bigquery.googleapis.com/bigquery/v2";

const SINK: &str = "warehouse";

/// Append-only table in a BigQuery-compatible warehouse, reached over its REST API.
///
/// The dataset and table are created on first use if they do not exist.
#[derive(Debug)]
pub struct WarehouseSink {
    transport: Arc<dyn HttpTransport>,
    config: WarehouseConfig,
    access_token: String,
    ready: OnceCell<()>,
}

#[derive(Debug, Deserialize)]
struct InsertAllResponse {
    #[serde(default, rename = "insertErrors")]
    insert_errors: Vec<Value>,
}

impl WarehouseSink {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        config: WarehouseConfig,
        access_token: String,
    ) -> Self {
        Self {
            transport,
            config,
            access_token,
            ready: OnceCell::new(),
        }
    }

    fn api_base(&self) -> &str {
        self.config
            .api_base
            .as_deref()
            .unwrap_or(DEFAULT_API_BASE)
            .trim_end_matches('/')
    }

    fn datasets_url(&self) -> String {
        format!("{}/projects/{}/datasets", self.api_base(), self.config.project_id)
    }

    fn tables_url(&self) -> String {
        format!("{}/{}/tables", self.datasets_url(), self.config.dataset_id)
    }

    /// Fixed table schema; `pressure` is nullable because not every provider reports it.
    pub fn table_schema() -> Value {
        json!({
            "fields": [
                {"name": "city", "type": "STRING", "mode": "REQUIRED"},
                {"name": "date", "type": "DATE", "mode": "REQUIRED"},
                {"name": "temperature", "type": "FLOAT", "mode": "REQUIRED"},
                {"name": "humidity", "type": "FLOAT", "mode": "REQUIRED"},
                {"name": "wind_speed", "type": "FLOAT", "mode": "REQUIRED"},
                {"name": "description", "type": "STRING", "mode": "REQUIRED"},
                {"name": "pressure", "type": "FLOAT", "mode": "NULLABLE"},
            ]
        })
    }

    fn row(record: &WeatherRecord) -> Value {
        json!({
            "json": {
                "city": record.city,
                "date": record.date.to_string(),
                "temperature": record.temp_avg,
                "humidity": record.humidity,
                "wind_speed": record.wind_speed,
                "description": record.conditions,
                "pressure": record.pressure,
            }
        })
    }

    async fn send(&self, request: HttpRequest) -> Result<HttpReply, SinkError> {
        self.transport
            .send(request.bearer(self.access_token.as_str()))
            .await
            .map_err(|source| SinkError::Transport { sink: SINK, source })
    }

    /// Check-then-create. A 404 on lookup triggers creation; a 409 on creation
    /// means another run created it first.
    async fn ensure_exists(
        &self,
        what: &str,
        lookup_url: String,
        create_url: String,
        body: Value,
    ) -> Result<(), SinkError> {
        let found = self.send(HttpRequest::get(lookup_url)).await?;
        match found.status {
            StatusCode::OK => {
                log::debug!("{what} already exists");
                return Ok(());
            }
            StatusCode::NOT_FOUND => {}
            status => return Err(status_error(format!("lookup of {what}"), status, &found.body)),
        }

        let created = self.send(HttpRequest::post(create_url, body)).await?;
        match created.status {
            s if s.is_success() => {
                log::info!("Created {what}");
                Ok(())
            }
            StatusCode::CONFLICT => Ok(()),
            status => Err(status_error(format!("creation of {what}"), status, &created.body)),
        }
    }

    async fn ensure_resources(&self) -> Result<(), SinkError> {
        let cfg = &self.config;

        self.ensure_exists(
            &format!("dataset {}.{}", cfg.project_id, cfg.dataset_id),
            format!("{}/{}", self.datasets_url(), cfg.dataset_id),
            self.datasets_url(),
            json!({
                "datasetReference": {"projectId": cfg.project_id, "datasetId": cfg.dataset_id},
                "location": cfg.location,
            }),
        )
        .await?;

        self.ensure_exists(
            &format!("table {}.{}.{}", cfg.project_id, cfg.dataset_id, cfg.table_id),
            format!("{}/{}", self.tables_url(), cfg.table_id),
            self.tables_url(),
            json!({
                "tableReference": {
                    "projectId": cfg.project_id,
                    "datasetId": cfg.dataset_id,
                    "tableId": cfg.table_id,
                },
                "schema": Self::table_schema(),
            }),
        )
        .await
    }
}

fn status_error(operation: String, status: StatusCode, body: &str) -> SinkError {
    SinkError::Status {
        sink: SINK,
        operation,
        status,
        body: truncate_body(body),
    }
}

#[async_trait]
impl Sink for WarehouseSink {
    fn kind(&self) -> SinkKind {
        SinkKind::WarehouseTable
    }

    fn describe(&self) -> String {
        format!(
            "warehouse {}.{}.{}",
            self.config.project_id, self.config.dataset_id, self.config.table_id
        )
    }

    async fn persist(&self, batch: &[WeatherRecord]) -> Result<PersistSummary, SinkError> {
        self.ready
            .get_or_try_init(|| self.ensure_resources())
            .await?;

        let body = json!({
            "kind": "bigquery#tableDataInsertAllRequest",
            "rows": batch.iter().map(Self::row).collect::<Vec<_>>(),
        });
        let url = format!("{}/{}/insertAll", self.tables_url(), self.config.table_id);

        let reply = self.send(HttpRequest::post(url, body)).await?;
        if !reply.status.is_success() {
            return Err(status_error("insertAll".to_string(), reply.status, &reply.body));
        }

        let parsed: InsertAllResponse = serde_json::from_str(&reply.body)
            .map_err(|source| SinkError::Response { sink: SINK, source })?;
        if !parsed.insert_errors.is_empty() {
            return Err(SinkError::Rejected {
                sink: SINK,
                rows: parsed.insert_errors.len(),
                detail: truncate_body(&Value::from(parsed.insert_errors).to_string()),
            });
        }

        Ok(PersistSummary {
            written: batch.len(),
            total: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use reqwest::Method;

    use super::*;
    use crate::testing::{ScriptedTransport, record};

    const BASE: &str = "https://bq.test/v2";

    fn config() -> WarehouseConfig {
        WarehouseConfig {
            project_id: "canada-weather".into(),
            dataset_id: "weather_data".into(),
            table_id: "canada_weather".into(),
            api_base: Some(BASE.into()),
            ..WarehouseConfig::default()
        }
    }

    fn sink(transport: ScriptedTransport) -> (WarehouseSink, Arc<ScriptedTransport>) {
        let transport = Arc::new(transport);
        let sink = WarehouseSink::new(transport.clone(), config(), "TOKEN".into());
        (sink, transport)
    }

    #[tokio::test]
    async fn creates_missing_dataset_and_table_then_appends() {
        let (sink, transport) = sink(
            ScriptedTransport::new()
                .reply(StatusCode::NOT_FOUND, "{}")
                .reply(StatusCode::OK, "{}")
                .reply(StatusCode::NOT_FOUND, "{}")
                .reply(StatusCode::OK, "{}")
                .reply(StatusCode::OK, r#"{"kind":"bigquery#tableDataInsertAllResponse"}"#),
        );

        let summary = sink
            .persist(&[record("Toronto", "2025-02-20", -3.0)])
            .await
            .unwrap();
        assert_eq!(summary.written, 1);

        let requests = transport.requests();
        let calls: Vec<_> = requests
            .iter()
            .map(|r| (r.method.clone(), r.url.as_str()))
            .collect();
        assert_eq!(
            calls,
            vec![
                (Method::GET, "https://bq.test/v2/projects/canada-weather/datasets/weather_data"),
                (Method::POST, "https://bq.test/v2/projects/canada-weather/datasets"),
                (
                    Method::GET,
                    "https://bq.test/v2/projects/canada-weather/datasets/weather_data/tables/canada_weather"
                ),
                (Method::POST, "https://bq.test/v2/projects/canada-weather/datasets/weather_data/tables"),
                (
                    Method::POST,
                    "https://bq.test/v2/projects/canada-weather/datasets/weather_data/tables/canada_weather/insertAll"
                ),
            ]
        );
        assert!(requests.iter().all(|r| r.bearer_token.as_deref() == Some("TOKEN")));

        let dataset = requests[1].json.as_ref().unwrap();
        assert_eq!(dataset["location"], "US");

        let rows = &requests[4].json.as_ref().unwrap()["rows"];
        assert_eq!(rows[0]["json"]["city"], "Toronto");
        assert_eq!(rows[0]["json"]["date"], "2025-02-20");
        assert_eq!(rows[0]["json"]["temperature"], -3.0);
    }

    #[tokio::test]
    async fn resources_are_checked_once_and_writes_append() {
        let (sink, transport) = sink(
            ScriptedTransport::new()
                .reply(StatusCode::OK, "{}")
                .reply(StatusCode::OK, "{}")
                .reply(StatusCode::OK, "{}")
                .reply(StatusCode::OK, "{}"),
        );
        let batch = [record("Toronto", "2025-02-20", -3.0)];

        sink.persist(&batch).await.unwrap();
        sink.persist(&batch).await.unwrap();

        let urls: Vec<_> = transport.requests().into_iter().map(|r| r.url).collect();
        assert_eq!(urls.len(), 4);
        assert!(urls[2].ends_with("/insertAll"));
        assert!(urls[3].ends_with("/insertAll"));
    }

    #[tokio::test]
    async fn lookup_failure_is_reported() {
        let (sink, transport) =
            sink(ScriptedTransport::new().reply(StatusCode::FORBIDDEN, "access denied"));

        let err = sink
            .persist(&[record("Toronto", "2025-02-20", -3.0)])
            .await
            .unwrap_err();

        match err {
            SinkError::Status { status, operation, .. } => {
                assert_eq!(status, StatusCode::FORBIDDEN);
                assert!(operation.contains("dataset canada-weather.weather_data"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn concurrent_creation_conflict_is_tolerated() {
        let (sink, _transport) = sink(
            ScriptedTransport::new()
                .reply(StatusCode::NOT_FOUND, "{}")
                .reply(StatusCode::CONFLICT, "already exists")
                .reply(StatusCode::OK, "{}")
                .reply(StatusCode::OK, "{}"),
        );

        assert!(sink.persist(&[record("Toronto", "2025-02-20", -3.0)]).await.is_ok());
    }

    #[tokio::test]
    async fn row_level_errors_are_rejections() {
        let (sink, _transport) = sink(
            ScriptedTransport::new()
                .reply(StatusCode::OK, "{}")
                .reply(StatusCode::OK, "{}")
                .reply(
                    StatusCode::OK,
                    r#"{"insertErrors":[{"index":0,"errors":[{"reason":"invalid"}]}]}"#,
                ),
        );

        let err = sink
            .persist(&[record("Toronto", "2025-02-20", -3.0)])
            .await
            .unwrap_err();
        assert!(matches!(err, SinkError::Rejected { rows: 1, .. }));
    }
}
