use std::{
    fs,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{
    dedup::{merge, sort_by_key},
    error::SinkError,
    model::WeatherRecord,
};

use super::{PersistSummary, Sink, SinkKind};

/// Column layout of the CSV file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CsvLayout {
    /// `city,date,temp_max,temp_min,temp_avg,humidity,precipitation,wind_speed,conditions`
    #[default]
    Daily,
    /// `city,date,temperature,humidity,wind_speed,description,pressure`
    Current,
}

#[derive(Debug, Serialize, Deserialize)]
struct DailyRow {
    city: String,
    date: NaiveDate,
    temp_max: Option<f64>,
    temp_min: Option<f64>,
    temp_avg: f64,
    humidity: f64,
    precipitation: Option<f64>,
    wind_speed: f64,
    conditions: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct CurrentRow {
    city: String,
    date: NaiveDate,
    temperature: f64,
    humidity: f64,
    wind_speed: f64,
    description: String,
    pressure: Option<f64>,
}

impl From<&WeatherRecord> for DailyRow {
    fn from(r: &WeatherRecord) -> Self {
        Self {
            city: r.city.clone(),
            date: r.date,
            temp_max: r.temp_max,
            temp_min: r.temp_min,
            temp_avg: r.temp_avg,
            humidity: r.humidity,
            precipitation: Some(r.precipitation),
            wind_speed: r.wind_speed,
            conditions: r.conditions.clone(),
        }
    }
}

impl From<DailyRow> for WeatherRecord {
    fn from(row: DailyRow) -> Self {
        Self {
            city: row.city,
            date: row.date,
            temp_max: row.temp_max,
            temp_min: row.temp_min,
            temp_avg: row.temp_avg,
            humidity: row.humidity,
            precipitation: row.precipitation.unwrap_or(0.0),
            wind_speed: row.wind_speed,
            conditions: row.conditions,
            pressure: None,
        }
    }
}

impl From<&WeatherRecord> for CurrentRow {
    fn from(r: &WeatherRecord) -> Self {
        Self {
            city: r.city.clone(),
            date: r.date,
            temperature: r.temp_avg,
            humidity: r.humidity,
            wind_speed: r.wind_speed,
            description: r.conditions.clone(),
            pressure: r.pressure,
        }
    }
}

impl From<CurrentRow> for WeatherRecord {
    fn from(row: CurrentRow) -> Self {
        Self {
            city: row.city,
            date: row.date,
            temp_max: None,
            temp_min: None,
            temp_avg: row.temperature,
            humidity: row.humidity,
            precipitation: 0.0,
            wind_speed: row.wind_speed,
            conditions: row.description,
            pressure: row.pressure,
        }
    }
}

/// Local CSV file, fully rewritten on every run with the merged, sorted batch.
#[derive(Debug, Clone)]
pub struct FileSink {
    path: PathBuf,
    layout: CsvLayout,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>, layout: CsvLayout) -> Self {
        Self {
            path: path.into(),
            layout,
        }
    }

    /// Records currently in the file; empty when the file does not exist.
    pub fn read_existing(&self) -> Result<Vec<WeatherRecord>, SinkError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let mut reader = csv::Reader::from_path(&self.path).map_err(|e| self.csv_err(e))?;
        match self.layout {
            CsvLayout::Daily => reader
                .deserialize::<DailyRow>()
                .map(|row| row.map(WeatherRecord::from).map_err(|e| self.csv_err(e)))
                .collect(),
            CsvLayout::Current => reader
                .deserialize::<CurrentRow>()
                .map(|row| row.map(WeatherRecord::from).map_err(|e| self.csv_err(e)))
                .collect(),
        }
    }

    /// Write to a temp file beside the target, then rename it over the target,
    /// so a failed write leaves the previous contents intact.
    fn write_all(&self, records: &[WeatherRecord]) -> Result<(), SinkError> {
        let dir = match self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(parent) => {
                fs::create_dir_all(parent).map_err(|source| SinkError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
                parent
            }
            None => Path::new("."),
        };

        let tmp = tempfile::NamedTempFile::new_in(dir).map_err(|source| SinkError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let mut writer = csv::Writer::from_writer(tmp);
        for record in records {
            let written = match self.layout {
                CsvLayout::Daily => writer.serialize(DailyRow::from(record)),
                CsvLayout::Current => writer.serialize(CurrentRow::from(record)),
            };
            written.map_err(|e| self.csv_err(e))?;
        }
        let tmp = writer.into_inner().map_err(|e| SinkError::Io {
            path: self.path.clone(),
            source: e.into_error(),
        })?;

        tmp.persist(&self.path).map_err(|e| SinkError::Io {
            path: self.path.clone(),
            source: e.error,
        })?;
        Ok(())
    }

    fn csv_err(&self, source: csv::Error) -> SinkError {
        SinkError::Csv {
            path: self.path.clone(),
            source,
        }
    }
}

#[async_trait]
impl Sink for FileSink {
    fn kind(&self) -> SinkKind {
        SinkKind::File
    }

    fn describe(&self) -> String {
        format!("file {}", self.path.display())
    }

    async fn persist(&self, batch: &[WeatherRecord]) -> Result<PersistSummary, SinkError> {
        let existing = self.read_existing()?;
        if !existing.is_empty() {
            log::debug!(
                "Merging {} new record(s) into {} existing in {}",
                batch.len(),
                existing.len(),
                self.path.display()
            );
        }

        let mut merged = merge(existing, batch.to_vec());
        sort_by_key(&mut merged);
        self.write_all(&merged)?;

        Ok(PersistSummary {
            written: batch.len(),
            total: Some(merged.len()),
        })
    }
}
