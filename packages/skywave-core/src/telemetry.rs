//! Listen/play telemetry.
//!
//! The session reports listen events (track completions, partial listens,
//! insert outcomes, live listening) through the [`TelemetryRecorder`].
//! Dispatch is fire-and-forget on a spawned task: a slow or failing
//! collector can never block playback, failures are logged and dropped,
//! and nothing is retried synchronously.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::runtime::{TaskSpawner, TokioSpawner};
use crate::utils::now_millis;

/// What a telemetry event is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ListenSubject {
    /// A queued track.
    #[serde(rename = "track")]
    Track,
    /// The live program stream.
    #[serde(rename = "live-program")]
    LiveProgram,
    /// A promotional insert.
    #[serde(rename = "insert")]
    Insert,
}

/// A single listen/play event for the collector.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryEvent {
    /// Subject kind.
    pub subject: ListenSubject,
    /// Subject identity; `None` for anonymous live listening.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject_id: Option<String>,
    /// Seconds of playback accrued when the event fired.
    pub elapsed_secs: f64,
    /// Whether the subject played to its natural end.
    pub completed: bool,
    /// Unix timestamp in milliseconds.
    pub timestamp: u64,
}

impl TelemetryEvent {
    /// Event for a queued track.
    #[must_use]
    pub fn track(id: &str, elapsed_secs: f64, completed: bool) -> Self {
        Self {
            subject: ListenSubject::Track,
            subject_id: Some(id.to_string()),
            elapsed_secs,
            completed,
            timestamp: now_millis(),
        }
    }

    /// Event for a promotional insert.
    #[must_use]
    pub fn insert(id: &str, elapsed_secs: f64, completed: bool) -> Self {
        Self {
            subject: ListenSubject::Insert,
            subject_id: Some(id.to_string()),
            elapsed_secs,
            completed,
            timestamp: now_millis(),
        }
    }

    /// Event for live listening. Live never "completes".
    #[must_use]
    pub fn live_program(elapsed_secs: f64) -> Self {
        Self {
            subject: ListenSubject::LiveProgram,
            subject_id: None,
            elapsed_secs,
            completed: false,
            timestamp: now_millis(),
        }
    }
}

/// Errors from the telemetry collector.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Transport-level failure (connect, timeout, TLS).
    #[error("telemetry request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The collector answered with a non-success status.
    #[error("telemetry collector returned status {0}")]
    Status(u16),
}

/// Convenient Result alias for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;

/// Destination for telemetry events.
#[async_trait]
pub trait TelemetrySink: Send + Sync {
    /// Records one event.
    async fn record(&self, event: &TelemetryEvent) -> TelemetryResult<()>;
}

/// Sink that POSTs events as JSON to the station's collector.
pub struct HttpTelemetrySink {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTelemetrySink {
    /// Creates a sink posting to the given endpoint.
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl TelemetrySink for HttpTelemetrySink {
    async fn record(&self, event: &TelemetryEvent) -> TelemetryResult<()> {
        let response = self.client.post(&self.endpoint).json(event).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TelemetryError::Status(status.as_u16()));
        }
        Ok(())
    }
}

/// Sink for deployments without a collector.
pub struct NoopTelemetrySink;

#[async_trait]
impl TelemetrySink for NoopTelemetrySink {
    async fn record(&self, _event: &TelemetryEvent) -> TelemetryResult<()> {
        Ok(())
    }
}

/// Fire-and-forget dispatcher in front of a [`TelemetrySink`].
#[derive(Clone)]
pub struct TelemetryRecorder {
    sink: Arc<dyn TelemetrySink>,
    /// Task spawner for background dispatch.
    spawner: TokioSpawner,
}

impl TelemetryRecorder {
    /// Creates a recorder dispatching to the given sink.
    pub fn new(sink: Arc<dyn TelemetrySink>, spawner: TokioSpawner) -> Self {
        Self { sink, spawner }
    }

    /// Dispatches one event without waiting for the sink.
    ///
    /// Failures are logged at warn and dropped; there is no retry.
    pub fn dispatch(&self, event: TelemetryEvent) {
        let sink = Arc::clone(&self.sink);
        self.spawner.spawn(async move {
            if let Err(e) = sink.record(&event).await {
                log::warn!(
                    "[Telemetry] dropping {:?} event for {:?}: {}",
                    event.subject,
                    event.subject_id,
                    e
                );
            }
        });
    }
}
