use async_trait::async_trait;
use sqlx::{PgPool, postgres::PgPoolOptions};
use tokio::sync::OnceCell;

use crate::{
    dedup::merge,
    error::{SinkError, display_chain},
    model::WeatherRecord,
};

use super::{PersistSummary, Sink, SinkKind};

/// Postgres-compatible hosted table with a `(city, date)` primary key.
/// Rows are upserted, so the store itself never holds duplicates.
#[derive(Debug)]
pub struct HostedStoreSink {
    pool: PgPool,
    table: String,
    schema_ready: OnceCell<()>,
}

impl HostedStoreSink {
    /// The pool connects on first use, so construction never touches the network.
    pub fn connect_lazy(database_url: &str, table: &str) -> Result<Self, SinkError> {
        validate_identifier(table)?;
        let pool = PgPoolOptions::new()
            .max_connections(2)
            .connect_lazy(database_url)?;

        Ok(Self {
            pool,
            table: table.to_string(),
            schema_ready: OnceCell::new(),
        })
    }

    async fn ensure_table(&self) -> Result<(), SinkError> {
        sqlx::query(&create_table_statement(&self.table))
            .execute(&self.pool)
            .await?;
        log::debug!("Hosted table {} is ready", self.table);
        Ok(())
    }

    /// Number of rows currently stored.
    pub async fn count(&self) -> Result<usize, SinkError> {
        let (count,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {}", self.table))
            .fetch_one(&self.pool)
            .await?;
        Ok(usize::try_from(count).unwrap_or_default())
    }
}

/// Plain SQL identifiers only: a letter or underscore, then letters, digits or underscores.
fn validate_identifier(name: &str) -> Result<(), SinkError> {
    let mut chars = name.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

    if valid {
        Ok(())
    } else {
        Err(SinkError::InvalidIdentifier(name.to_string()))
    }
}

fn create_table_statement(table: &str) -> String {
    format!(
        r#"
        CREATE TABLE IF NOT EXISTS {table} (
            city TEXT NOT NULL,
            date DATE NOT NULL,
            temp_max DOUBLE PRECISION,
            temp_min DOUBLE PRECISION,
            temp_avg DOUBLE PRECISION NOT NULL,
            humidity DOUBLE PRECISION NOT NULL,
            precipitation DOUBLE PRECISION NOT NULL DEFAULT 0,
            wind_speed DOUBLE PRECISION NOT NULL,
            conditions TEXT NOT NULL,
            pressure DOUBLE PRECISION,
            updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            PRIMARY KEY (city, date)
        )
        "#
    )
}

fn upsert_statement(table: &str) -> String {
    format!(
        r#"
        INSERT INTO {table}
            (city, date, temp_max, temp_min, temp_avg, humidity, precipitation, wind_speed, conditions, pressure)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        ON CONFLICT (city, date) DO UPDATE SET
            temp_max = EXCLUDED.temp_max,
            temp_min = EXCLUDED.temp_min,
            temp_avg = EXCLUDED.temp_avg,
            humidity = EXCLUDED.humidity,
            precipitation = EXCLUDED.precipitation,
            wind_speed = EXCLUDED.wind_speed,
            conditions = EXCLUDED.conditions,
            pressure = EXCLUDED.pressure,
            updated_at = now()
        "#
    )
}

#[async_trait]
impl Sink for HostedStoreSink {
    fn kind(&self) -> SinkKind {
        SinkKind::HostedStore
    }

    fn describe(&self) -> String {
        format!("hosted store table {}", self.table)
    }

    async fn persist(&self, batch: &[WeatherRecord]) -> Result<PersistSummary, SinkError> {
        self.schema_ready
            .get_or_try_init(|| self.ensure_table())
            .await?;

        let rows = merge(Vec::new(), batch.to_vec());
        let statement = upsert_statement(&self.table);

        let mut tx = self.pool.begin().await?;
        for r in &rows {
            sqlx::query(&statement)
                .bind(&r.city)
                .bind(r.date)
                .bind(r.temp_max)
                .bind(r.temp_min)
                .bind(r.temp_avg)
                .bind(r.humidity)
                .bind(r.precipitation)
                .bind(r.wind_speed)
                .bind(&r.conditions)
                .bind(r.pressure)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        let total = best_effort_total(&self.table, self.count().await);
        Ok(PersistSummary {
            written: rows.len(),
            total,
        })
    }
}

/// The upsert is already committed; a failed count only loses the total.
fn best_effort_total(table: &str, count: Result<usize, SinkError>) -> Option<usize> {
    count
        .map_err(|err| log::warn!("Could not count rows in {}: {}", table, display_chain(&err)))
        .ok()
}
