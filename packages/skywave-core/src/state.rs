//! Configuration and shared runtime state.
//!
//! This module provides [`Config`], the tunable behavior of the playback
//! engine, and [`PlayerState`], the live session snapshot shared between
//! the engine and the HTTP/WS layer.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::gate::{GatePolicy, GateState, Insert};
use crate::queue::{QueuePolicy, Track};

/// Configuration for the Skywave engine.
///
/// All fields have sensible defaults.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    // Server
    /// Preferred port for the HTTP/WS server (0 = auto-allocate).
    pub preferred_port: u16,

    /// Trusted origins for CORS (the station UI origins allowed to call
    /// the API).
    #[serde(default = "default_trusted_origins")]
    pub trusted_origins: Vec<String>,

    // Playback
    /// Queue navigation behavior.
    #[serde(default)]
    pub queue: QueuePolicy,

    /// Promotional insert behavior ahead of the live stream.
    #[serde(default)]
    pub gate: GatePolicy,

    /// Live program stream URL used when an open request names none.
    pub live_stream_url: Option<String>,

    // Services
    /// Base URL of the insert inventory service. `None` disables lookups
    /// and the gate opens straight to live.
    pub inventory_base_url: Option<String>,

    /// Endpoint of the listen telemetry collector. `None` drops all
    /// telemetry.
    pub telemetry_endpoint: Option<String>,

    // WebSocket
    /// WebSocket heartbeat timeout (seconds).
    pub ws_heartbeat_timeout_secs: u64,

    /// Interval between WebSocket heartbeat checks (seconds).
    pub ws_heartbeat_check_interval_secs: u64,

    /// Capacity of the event broadcast channel.
    pub event_channel_capacity: usize,
}

fn default_trusted_origins() -> Vec<String> {
    vec![
        "http://localhost".to_string(),
        "http://127.0.0.1".to_string(),
    ]
}

impl Config {
    /// Validates the configuration values.
    pub fn validate(&self) -> Result<(), String> {
        let threshold = self.queue.previous_restart_threshold_secs;
        if !threshold.is_finite() || threshold < 0.0 {
            return Err("queue.previous_restart_threshold_secs must be finite and >= 0".to_string());
        }
        let skippable = self.gate.skippable_after_secs;
        if !skippable.is_finite() || skippable < 0.0 {
            return Err("gate.skippable_after_secs must be finite and >= 0".to_string());
        }
        if self.event_channel_capacity == 0 {
            return Err(
                "event_channel_capacity must be >= 1 (broadcast::channel panics on 0)".to_string(),
            );
        }
        if self.ws_heartbeat_timeout_secs == 0 {
            return Err("ws_heartbeat_timeout_secs must be >= 1".to_string());
        }
        if self.ws_heartbeat_check_interval_secs == 0 {
            return Err("ws_heartbeat_check_interval_secs must be >= 1".to_string());
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            preferred_port: 0,
            trusted_origins: default_trusted_origins(),
            queue: QueuePolicy::default(),
            gate: GatePolicy::default(),
            live_stream_url: None,
            inventory_base_url: None,
            telemetry_endpoint: None,
            ws_heartbeat_timeout_secs: 30,
            ws_heartbeat_check_interval_secs: 1,
            event_channel_capacity: 100,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Session Runtime State
// ─────────────────────────────────────────────────────────────────────────────

/// Transport position of the bound media element.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Transport {
    /// Nothing loaded, or playback torn down.
    #[default]
    Stopped,
    /// The element is playing (or a play attempt is in flight).
    Playing,
    /// The element holds a source but is paused.
    Paused,
}

/// What the session is currently sequencing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Mode {
    /// No content bound yet.
    #[default]
    Idle,
    /// Playing from the track queue.
    Queue,
    /// Live program, possibly behind a promotional insert.
    GatedLive,
}

/// Complete view of one playback session at a point in time.
///
/// This is what `GET /api/state` and the WebSocket `INITIAL_STATE` message
/// carry, in one piece so clients never observe half a transition.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    /// Current sequencing mode.
    pub mode: Mode,
    /// Current transport state.
    pub transport: Transport,
    /// Track under the cursor, if any.
    pub current_track: Option<Track>,
    /// Queue position of the current track.
    pub current_index: Option<usize>,
    /// Number of loaded tracks.
    pub queue_len: usize,
    /// Whether shuffle sequencing is on.
    pub shuffle: bool,
    /// Whether repeat-one is on.
    pub repeat_one: bool,
    /// Live gate position.
    pub gate_state: GateState,
    /// Insert currently playing ahead of live, if any.
    pub active_insert: Option<Insert>,
    /// Whether the active insert has crossed its skip threshold.
    pub insert_skippable: bool,
    /// Live stream URL once the session entered (or decided) live.
    pub live_url: Option<String>,
    /// Playback position of the element in seconds.
    pub position_secs: f64,
    /// Duration of the loaded media in seconds, when known.
    pub duration_secs: Option<f64>,
    /// Element volume in `0.0..=1.0` (the level mute restores to).
    pub volume: f32,
    /// Whether output is muted.
    pub muted: bool,
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self {
            mode: Mode::Idle,
            transport: Transport::Stopped,
            current_track: None,
            current_index: None,
            queue_len: 0,
            shuffle: false,
            repeat_one: false,
            gate_state: GateState::Closed,
            active_insert: None,
            insert_skippable: false,
            live_url: None,
            position_secs: 0.0,
            duration_secs: None,
            volume: 1.0,
            muted: false,
        }
    }
}

/// Shared handle to the latest [`SessionSnapshot`].
///
/// # Concurrency design
///
/// The snapshot lives behind a single `RwLock` because the engine patches
/// it atomically on every transition and the HTTP/WS layer always reads it
/// as a whole. `Insert`/`Track` payloads are small, so cloning out is cheap.
#[derive(Debug, Default)]
pub struct PlayerState {
    snapshot: RwLock<SessionSnapshot>,
}

impl PlayerState {
    /// Returns a copy of the current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.read().clone()
    }

    /// Applies a patch to the snapshot under the write lock.
    pub fn update<F: FnOnce(&mut SessionSnapshot)>(&self, patch: F) {
        patch(&mut self.snapshot.write());
    }

    /// Serializes the current snapshot to JSON.
    pub fn to_json(&self) -> serde_json::Value {
        json!(*self.snapshot.read())
    }
}
