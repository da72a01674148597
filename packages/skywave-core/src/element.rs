//! Host media element abstraction.
//!
//! The playback session drives exactly one media element through the narrow
//! [`MediaElement`] trait: source assignment, load, fallible async play,
//! pause, position, duration, volume, and an event subscription. Embedders
//! provide the real element (a browser `<audio>` bridged over WebSocket in
//! the server deployment, see `api::remote`); [`FakeMediaElement`] is a
//! scripted implementation for tests and headless embedders.
//!
//! There is intentionally no mute flag here: the session realizes mute by
//! driving the volume to zero and restoring the remembered level.

use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;

/// Events republished by a media element.
///
/// Serialized camelCase so the remote element host can deliver them over the
/// wire unchanged.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum MediaEvent {
    /// Enough data buffered to begin playback; duration is known if the
    /// source reports one.
    CanPlay {
        /// Source duration in seconds, when known.
        #[serde(rename = "durationSecs", skip_serializing_if = "Option::is_none")]
        duration_secs: Option<f64>,
    },
    /// Periodic playback position report.
    TimeUpdate {
        /// Current position in seconds.
        #[serde(rename = "positionSecs")]
        position_secs: f64,
    },
    /// The current source played to its end.
    Ended,
    /// The element failed to fetch or decode the current source.
    Error {
        /// Element-reported reason.
        message: String,
    },
}

/// Errors a media element can report when starting playback.
#[derive(Debug, Clone, Error)]
pub enum MediaError {
    /// The platform refused to start playback (autoplay policy). Recoverable
    /// by an explicit user gesture.
    #[error("playback start blocked: {0}")]
    NotAllowed(String),

    /// The source could not be fetched or decoded.
    #[error("media source failed: {0}")]
    Source(String),

    /// No element is attached to carry out the operation.
    #[error("no media element attached")]
    Detached,
}

/// Narrow capability trait over the host media element.
///
/// All methods take `&self`; implementations use interior mutability and are
/// shared as `Arc<dyn MediaElement>`. Only `play` is async (platforms report
/// autoplay rejection asynchronously); everything else is fire-and-forget.
#[async_trait]
pub trait MediaElement: Send + Sync {
    /// Assigns a new source URI. Does not start playback.
    fn set_source(&self, url: &str);

    /// Begins fetching the assigned source.
    fn load(&self);

    /// Requests playback start.
    ///
    /// # Errors
    ///
    /// [`MediaError::NotAllowed`] when the platform blocks autoplay,
    /// [`MediaError::Source`] when the source fails,
    /// [`MediaError::Detached`] when no element is available.
    async fn play(&self) -> Result<(), MediaError>;

    /// Pauses playback, keeping the position.
    fn pause(&self);

    /// Returns the current playback position in seconds.
    fn position(&self) -> f64;

    /// Seeks to a position in seconds.
    fn seek(&self, position_secs: f64);

    /// Returns the source duration in seconds, when known.
    fn duration(&self) -> Option<f64>;

    /// Returns the current volume (0.0 to 1.0).
    fn volume(&self) -> f32;

    /// Sets the volume (0.0 to 1.0).
    fn set_volume(&self, level: f32);

    /// Subscribes to element events.
    fn subscribe(&self) -> broadcast::Receiver<MediaEvent>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Scripted fake
// ─────────────────────────────────────────────────────────────────────────────

/// Operations recorded by [`FakeMediaElement`], in call order.
#[derive(Debug, Clone, PartialEq)]
pub enum ElementOp {
    /// `set_source` with the given URL.
    SetSource(String),
    /// `load`.
    Load,
    /// `play`.
    Play,
    /// `pause`.
    Pause,
    /// `seek` to the given position.
    Seek(f64),
    /// `set_volume` to the given level.
    SetVolume(f32),
}

#[derive(Debug, Default)]
struct FakeState {
    source: Option<String>,
    position: f64,
    duration: Option<f64>,
    volume: f32,
    ops: Vec<ElementOp>,
    play_results: VecDeque<Result<(), MediaError>>,
}

/// Scripted media element for tests and headless embedders.
///
/// Records every operation, plays back queued `play` results (defaulting to
/// success), and lets the test drive events through the `emit_*` helpers.
pub struct FakeMediaElement {
    state: Mutex<FakeState>,
    events: broadcast::Sender<MediaEvent>,
}

impl Default for FakeMediaElement {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeMediaElement {
    /// Creates a fake element with volume 1.0 and no source.
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            state: Mutex::new(FakeState {
                volume: 1.0,
                ..FakeState::default()
            }),
            events,
        }
    }

    /// Queues the next result `play` will return.
    pub fn push_play_result(&self, result: Result<(), MediaError>) {
        self.state.lock().play_results.push_back(result);
    }

    /// Returns the currently assigned source.
    #[must_use]
    pub fn source(&self) -> Option<String> {
        self.state.lock().source.clone()
    }

    /// Returns all recorded operations in call order.
    #[must_use]
    pub fn ops(&self) -> Vec<ElementOp> {
        self.state.lock().ops.clone()
    }

    /// Emits `canPlay` and records the duration the element now reports.
    pub fn emit_can_play(&self, duration_secs: Option<f64>) {
        self.state.lock().duration = duration_secs;
        let _ = self.events.send(MediaEvent::CanPlay { duration_secs });
    }

    /// Emits `timeUpdate` and moves the fake's position.
    pub fn emit_time_update(&self, position_secs: f64) {
        self.state.lock().position = position_secs;
        let _ = self.events.send(MediaEvent::TimeUpdate { position_secs });
    }

    /// Emits `ended`.
    pub fn emit_ended(&self) {
        let _ = self.events.send(MediaEvent::Ended);
    }

    /// Emits `error`.
    pub fn emit_error(&self, message: &str) {
        let _ = self.events.send(MediaEvent::Error {
            message: message.to_string(),
        });
    }
}

#[async_trait]
impl MediaElement for FakeMediaElement {
    fn set_source(&self, url: &str) {
        let mut state = self.state.lock();
        state.source = Some(url.to_string());
        state.position = 0.0;
        state.duration = None;
        state.ops.push(ElementOp::SetSource(url.to_string()));
    }

    fn load(&self) {
        self.state.lock().ops.push(ElementOp::Load);
    }

    async fn play(&self) -> Result<(), MediaError> {
        let mut state = self.state.lock();
        state.ops.push(ElementOp::Play);
        state.play_results.pop_front().unwrap_or(Ok(()))
    }

    fn pause(&self) {
        self.state.lock().ops.push(ElementOp::Pause);
    }

    fn position(&self) -> f64 {
        self.state.lock().position
    }

    fn seek(&self, position_secs: f64) {
        let mut state = self.state.lock();
        state.position = position_secs;
        state.ops.push(ElementOp::Seek(position_secs));
    }

    fn duration(&self) -> Option<f64> {
        self.state.lock().duration
    }

    fn volume(&self) -> f32 {
        self.state.lock().volume
    }

    fn set_volume(&self, level: f32) {
        let mut state = self.state.lock();
        state.volume = level;
        state.ops.push(ElementOp::SetVolume(level));
    }

    fn subscribe(&self) -> broadcast::Receiver<MediaEvent> {
        self.events.subscribe()
    }
}
