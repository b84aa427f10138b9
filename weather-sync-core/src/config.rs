use anyhow::{Context, Result, anyhow, bail};
use chrono::NaiveDate;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{model::DateRange, pipeline::RunPlan, provider::ProviderId, sink::CsvLayout};

/// Environment variable that overrides the configured provider API key.
pub const API_KEY_ENV: &str = "WEATHER_API_KEY";

/// Which weather service to call and how to authenticate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub kind: ProviderId,
    pub api_key: Option<String>,
    /// Override of the provider's endpoint, mainly for proxies and tests.
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FileSinkConfig {
    pub path: PathBuf,
    pub layout: CsvLayout,
}

impl Default for FileSinkConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("canada_weather.csv"),
            layout: CsvLayout::Daily,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WarehouseConfig {
    pub project_id: String,
    pub dataset_id: String,
    pub table_id: String,
    /// Location used when the dataset has to be created.
    pub location: String,
    /// Name of the environment variable holding an OAuth access token.
    pub access_token_env: String,
    pub api_base: Option<String>,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            dataset_id: "weather_data".to_string(),
            table_id: "canada_weather".to_string(),
            location: "US".to_string(),
            access_token_env: "WAREHOUSE_ACCESS_TOKEN".to_string(),
            api_base: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HostedStoreConfig {
    pub table: String,
    /// Name of the environment variable holding the connection URL.
    pub database_url_env: String,
}

impl Default for HostedStoreConfig {
    fn default() -> Self {
        Self {
            table: "weather".to_string(),
            database_url_env: "HOSTED_DATABASE_URL".to_string(),
        }
    }
}

/// Destinations written by a run; any combination may be enabled.
///
/// Example TOML:
/// [sinks.file]
/// path = "canada_weather.csv"
/// layout = "daily"
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SinksConfig {
    pub file: Option<FileSinkConfig>,
    pub warehouse: Option<WarehouseConfig>,
    pub hosted: Option<HostedStoreConfig>,
}

impl Default for SinksConfig {
    fn default() -> Self {
        Self {
            file: Some(FileSinkConfig::default()),
            warehouse: None,
            hosted: None,
        }
    }
}

/// Top-level configuration stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Locations queried in order, e.g. "Toronto,ON,Canada".
    pub cities: Vec<String>,
    /// 0 fetches today only; N fetches the trailing window `[today - N, today]`.
    pub days_back: u32,
    /// Pause between consecutive cities.
    pub request_delay_secs: u64,
    /// Pause before the single retry of a rate-limited request.
    pub rate_limit_delay_secs: u64,
    pub provider: ProviderConfig,
    pub sinks: SinksConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cities: [
                "Toronto,ON,Canada",
                "Montreal,QC,Canada",
                "Vancouver,BC,Canada",
                "Calgary,AB,Canada",
                "Halifax,NS,Canada",
            ]
            .map(String::from)
            .to_vec(),
            days_back: 0,
            request_delay_secs: 1,
            rate_limit_delay_secs: 60,
            provider: ProviderConfig::default(),
            sinks: SinksConfig::default(),
        }
    }
}

impl Config {
    /// Load config from `path`, or return defaults if it doesn't exist yet.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(cfg)
    }

    /// Save config to `path`, creating parent directories as needed.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("dev", "weather-sync", "weather-sync")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }

    pub fn validate(&self) -> Result<()> {
        if self.cities.is_empty() {
            bail!("No cities configured.\nHint: add at least one entry to `cities`.");
        }
        if let Some(i) = self.cities.iter().position(|c| c.trim().is_empty()) {
            bail!("City entry #{} is blank", i + 1);
        }
        if let Some(wh) = &self.sinks.warehouse {
            if wh.project_id.trim().is_empty() {
                bail!("[sinks.warehouse] requires a project_id");
            }
        }
        if self.provider.kind == ProviderId::WeatherApi && self.days_back > 0 {
            bail!(
                "weatherapi only reports current conditions, but days_back = {}.\n\
                 Hint: set days_back = 0 or switch provider.kind to visualcrossing.",
                self.days_back
            );
        }
        Ok(())
    }

    /// API key from `env` (normally the process environment), falling back to the config file.
    pub fn resolve_api_key(&self, env: impl Fn(&str) -> Option<String>) -> Result<String> {
        env(API_KEY_ENV)
            .filter(|k| !k.trim().is_empty())
            .or_else(|| self.provider.api_key.clone())
            .ok_or_else(|| {
                anyhow!(
                    "No API key configured for provider '{}'.\n\
                     Hint: set {API_KEY_ENV} or run `weather-sync configure`.",
                    self.provider.kind
                )
            })
    }

    pub fn date_range(&self, today: NaiveDate) -> DateRange {
        if self.days_back == 0 {
            DateRange::today(today)
        } else {
            DateRange::trailing(self.days_back, today)
        }
    }

    pub fn rate_limit_delay(&self) -> Duration {
        Duration::from_secs(self.rate_limit_delay_secs)
    }

    pub fn run_plan(&self, today: NaiveDate) -> RunPlan {
        RunPlan {
            cities: self.cities.clone(),
            range: self.date_range(today),
            request_delay: Duration::from_secs(self.request_delay_secs),
        }
    }
}
