//! Scripted stand-ins for the network, the clock and the sinks.

use std::{collections::VecDeque, sync::Mutex, time::Duration};

use async_trait::async_trait;
use reqwest::StatusCode;

use crate::{
    error::SinkError,
    http::{HttpReply, HttpRequest, HttpTransport, Sleeper, TransportError},
    model::WeatherRecord,
    sink::{PersistSummary, Sink, SinkKind},
};

/// Replies are handed out in the order they were pushed.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    replies: Mutex<VecDeque<Result<HttpReply, TransportError>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, status: StatusCode, body: &str) -> Self {
        self.replies.lock().unwrap().push_back(Ok(HttpReply {
            status,
            body: body.to_string(),
        }));
        self
    }

    pub fn fail(self, message: &str) -> Self {
        self.replies
            .lock()
            .unwrap()
            .push_back(Err(TransportError::Unreachable(message.to_string())));
        self
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpReply, TransportError> {
        self.requests.lock().unwrap().push(request);
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::Unreachable("no scripted reply".into())))
    }
}

#[derive(Debug, Default)]
pub struct RecordingSleeper {
    slept: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn slept(&self) -> Vec<Duration> {
        self.slept.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.slept.lock().unwrap().push(duration);
    }
}

/// Keeps every batch it is given; optionally fails instead.
#[derive(Debug, Default)]
pub struct RecordingSink {
    batches: Mutex<Vec<Vec<WeatherRecord>>>,
    failing: bool,
}

impl RecordingSink {
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn batches(&self) -> Vec<Vec<WeatherRecord>> {
        self.batches.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sink for RecordingSink {
    fn kind(&self) -> SinkKind {
        SinkKind::File
    }

    fn describe(&self) -> String {
        "recording".to_string()
    }

    async fn persist(&self, batch: &[WeatherRecord]) -> Result<PersistSummary, SinkError> {
        self.batches.lock().unwrap().push(batch.to_vec());
        if self.failing {
            return Err(SinkError::MissingCredential("TEST_TOKEN".to_string()));
        }
        Ok(PersistSummary {
            written: batch.len(),
            total: None,
        })
    }
}

pub fn record(city: &str, date: &str, temp_avg: f64) -> WeatherRecord {
    WeatherRecord {
        city: city.to_string(),
        date: date.parse().unwrap(),
        temp_max: Some(temp_avg + 5.0),
        temp_min: Some(temp_avg - 5.0),
        temp_avg,
        humidity: 60.0,
        precipitation: 0.0,
        wind_speed: 10.0,
        conditions: "Clear".to_string(),
        pressure: None,
    }
}
