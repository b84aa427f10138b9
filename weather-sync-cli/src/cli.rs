use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use chrono::Local;
use clap::{Parser, Subcommand};
use inquire::{CustomType, Password, PasswordDisplayMode, Select};
use weather_sync_core::{
    Config, Pipeline, ProviderId, ReqwestTransport, RunError, TokioSleeper, WeatherFetcher,
    http::{HttpTransport, Sleeper},
    provider::provider_from_config,
    sink::sinks_from_config,
};

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(
    name = "weather-sync",
    version,
    about = "Fetch daily weather for a list of cities and persist it"
)]
pub struct Cli {
    /// Config file to use instead of the platform default.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, Copy, Subcommand)]
pub enum Command {
    /// Fetch every configured city and write the batch to the configured sinks (default).
    Run,

    /// Choose a provider and store its API key.
    Configure,

    /// Print the config file location and its effective contents.
    ShowConfig,
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        let path = match &self.config {
            Some(path) => path.clone(),
            None => Config::config_file_path()?,
        };

        match self.command.unwrap_or(Command::Run) {
            Command::Run => run_pipeline(&path).await,
            Command::Configure => configure(&path),
            Command::ShowConfig => {
                let cfg = Config::load_from(&path)?;
                println!("# {}", path.display());
                print!("{}", toml::to_string_pretty(&cfg)?);
                Ok(())
            }
        }
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

async fn run_pipeline(path: &std::path::Path) -> anyhow::Result<()> {
    let cfg = Config::load_from(path)?;
    cfg.validate()
        .with_context(|| format!("Invalid configuration in {}", path.display()))?;
    let api_key = cfg.resolve_api_key(env_var)?;

    let transport: Arc<dyn HttpTransport> = Arc::new(ReqwestTransport::new());
    let sleeper: Arc<dyn Sleeper> = Arc::new(TokioSleeper);

    let fetcher = WeatherFetcher::new(
        provider_from_config(&cfg.provider, api_key),
        transport.clone(),
        sleeper.clone(),
    )
    .with_rate_limit_delay(cfg.rate_limit_delay());
    let sinks = sinks_from_config(&cfg.sinks, transport, env_var)
        .context("Failed to set up sinks")?;
    if sinks.is_empty() {
        log::warn!("No sinks configured; fetched data will be discarded");
    }

    let pipeline = Pipeline::new(fetcher, sinks, sleeper);
    let plan = cfg.run_plan(Local::now().date_naive());

    match pipeline.run(&plan).await {
        Ok(report) => {
            log::info!(
                "Run finished: {} record(s), {} failed location(s), {}/{} sink(s) succeeded",
                report.records,
                report.failures.len(),
                report.sinks.iter().filter(|s| s.result.is_ok()).count(),
                report.sinks.len()
            );
            Ok(())
        }
        // Already logged by the pipeline; the run simply ends.
        Err(RunError::EmptyResult { .. }) => Ok(()),
    }
}

fn configure(path: &std::path::Path) -> anyhow::Result<()> {
    let mut cfg = Config::load_from(path)?;

    let providers = ProviderId::all().to_vec();
    let cursor = providers
        .iter()
        .position(|p| *p == cfg.provider.kind)
        .unwrap_or(0);
    let kind = Select::new("Weather provider:", providers)
        .with_starting_cursor(cursor)
        .prompt()?;

    let key = Password::new("API key (leave empty to keep the current one):")
        .with_display_mode(PasswordDisplayMode::Masked)
        .without_confirmation()
        .prompt()?;

    let days_back = CustomType::<u32>::new("Days of history to fetch (0 = today only):")
        .with_default(cfg.days_back)
        .prompt()?;

    if kind != cfg.provider.kind {
        cfg.provider.base_url = None;
    }
    cfg.provider.kind = kind;
    if !key.trim().is_empty() {
        cfg.provider.api_key = Some(key.trim().to_string());
    }
    cfg.days_back = days_back;

    cfg.validate().context("Configuration not saved")?;
    cfg.save_to(path)?;
    println!("Saved configuration to {}", path.display());
    Ok(())
}
