//! One end-to-end run: fetch every city in order, collect what succeeded,
//! and hand the batch to each sink.

use std::{sync::Arc, time::Duration};

use crate::{
    error::{FetchError, RunError, display_chain},
    fetch::WeatherFetcher,
    http::Sleeper,
    model::{DateRange, WeatherRecord},
    sink::{PersistSummary, Sink},
};

/// What a single run fetches.
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub cities: Vec<String>,
    pub range: DateRange,
    pub request_delay: Duration,
}

/// Outcome of fetching one location.
#[derive(Debug)]
pub struct CityFetch {
    pub location: String,
    pub outcome: Result<Vec<WeatherRecord>, FetchError>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CityFailure {
    pub location: String,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct Aggregate {
    /// City order first, then day order within a city.
    pub records: Vec<WeatherRecord>,
    pub failures: Vec<CityFailure>,
}

/// Flatten per-city results, setting failures aside.
pub fn aggregate(fetches: Vec<CityFetch>) -> Aggregate {
    let mut out = Aggregate::default();
    for fetch in fetches {
        match fetch.outcome {
            Ok(records) => out.records.extend(records),
            Err(err) => out.failures.push(CityFailure {
                location: fetch.location,
                reason: display_chain(&err),
            }),
        }
    }
    out
}

#[derive(Debug)]
pub struct SinkOutcome {
    pub sink: String,
    pub result: Result<PersistSummary, String>,
}

#[derive(Debug)]
pub struct RunReport {
    pub records: usize,
    pub failures: Vec<CityFailure>,
    pub sinks: Vec<SinkOutcome>,
}

impl RunReport {
    pub fn all_sinks_succeeded(&self) -> bool {
        self.sinks.iter().all(|s| s.result.is_ok())
    }
}

#[derive(Debug)]
pub struct Pipeline {
    fetcher: WeatherFetcher,
    sinks: Vec<Box<dyn Sink>>,
    sleeper: Arc<dyn Sleeper>,
}

impl Pipeline {
    pub fn new(fetcher: WeatherFetcher, sinks: Vec<Box<dyn Sink>>, sleeper: Arc<dyn Sleeper>) -> Self {
        Self {
            fetcher,
            sinks,
            sleeper,
        }
    }

    /// Fetch sequentially, then persist. Per-city and per-sink failures are
    /// logged and reported; only an empty batch ends the run early.
    pub async fn run(&self, plan: &RunPlan) -> Result<RunReport, RunError> {
        log::info!(
            "Fetching {} location(s) from {} for {}..={}",
            plan.cities.len(),
            self.fetcher.provider().id(),
            plan.range.start(),
            plan.range.end()
        );

        let mut fetches = Vec::with_capacity(plan.cities.len());
        for (i, location) in plan.cities.iter().enumerate() {
            if i > 0 && !plan.request_delay.is_zero() {
                self.sleeper.sleep(plan.request_delay).await;
            }

            let outcome = self.fetcher.fetch(location, &plan.range).await;
            match &outcome {
                Ok(records) => log::info!("Fetched {} record(s) for {}", records.len(), location),
                Err(err) => log::error!("Skipping {}: {}", location, display_chain(err)),
            }
            fetches.push(CityFetch {
                location: location.clone(),
                outcome,
            });
        }

        let Aggregate { records, failures } = aggregate(fetches);
        if records.is_empty() {
            let err = RunError::EmptyResult {
                cities: plan.cities.len(),
            };
            log::error!("{err}");
            return Err(err);
        }

        let mut outcomes = Vec::with_capacity(self.sinks.len());
        for sink in &self.sinks {
            let name = sink.describe();
            let result = match sink.persist(&records).await {
                Ok(summary) => {
                    match summary.total {
                        Some(total) => log::info!(
                            "Saved {} record(s) to {} ({} total)",
                            summary.written,
                            name,
                            total
                        ),
                        None => log::info!("Saved {} record(s) to {}", summary.written, name),
                    }
                    Ok(summary)
                }
                Err(err) => {
                    let reason = display_chain(&err);
                    log::error!("Failed to save to {}: {}", name, reason);
                    Err(reason)
                }
            };
            outcomes.push(SinkOutcome { sink: name, result });
        }

        Ok(RunReport {
            records: records.len(),
            failures,
            sinks: outcomes,
        })
    }
}
