//! Event system for real-time client communication.
//!
//! This module provides:
//! - [`EventEmitter`] trait for the playback engine to emit events
//! - [`BroadcastEventBridge`] for WebSocket/SSE transport
//! - Event types for the playback session and the track queue
//!
//! Events are serialized camelCase with a `category` tag on the outer enum
//! and a `type` tag on the inner enums, matching what the station UI consumes.

mod bridge;
mod emitter;

pub use bridge::BroadcastEventBridge;
pub use emitter::{EventEmitter, LoggingEventEmitter, NoopEventEmitter};

#[cfg(test)]
pub(crate) use emitter::test_support;

use serde::Serialize;

use crate::gate::{Insert, InsertOutcome};
use crate::queue::Track;
use crate::state::Transport;

/// Events broadcast to clients.
///
/// This enum categorizes all real-time events that can be sent to connected
/// clients. Each category has its own inner event type with specific variants.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "category", rename_all = "camelCase")]
pub enum BroadcastEvent {
    /// Events from the playback session (transport, sources, errors).
    Playback(PlaybackEvent),

    /// Events from the track queue (loads, flag changes, plays).
    Queue(QueueEvent),
}

/// Events emitted by the playback session.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PlaybackEvent {
    /// The current track changed (load, navigation, or auto-advance).
    TrackChanged {
        /// The track now selected.
        track: Track,
        /// Queue index of the selected track.
        index: usize,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// Transport state changed (stopped/playing/paused).
    TransportChanged {
        /// The new transport state.
        transport: Transport,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// Playback position update, republished from the media element.
    Progress {
        /// Current position in seconds.
        #[serde(rename = "positionSecs")]
        position_secs: f64,
        /// Source duration in seconds, when known.
        #[serde(rename = "durationSecs", skip_serializing_if = "Option::is_none")]
        duration_secs: Option<f64>,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// A promotional insert started playing ahead of the live stream.
    InsertStarted {
        /// The insert being played.
        insert: Insert,
        /// Seconds after which the insert may be skipped.
        #[serde(rename = "skippableAfterSecs")]
        skippable_after_secs: f64,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// The active insert's skip threshold has been crossed.
    InsertSkippable {
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// The active insert finished and the gate moved to live.
    InsertFinished {
        /// How the insert ended (completed/skipped/failed).
        reason: InsertOutcome,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// The live stream was loaded and playback requested.
    LiveStarted {
        /// The live stream URL.
        url: String,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// Volume or mute changed.
    VolumeChanged {
        /// Volume level the element plays at when unmuted.
        volume: f32,
        /// Whether output is muted.
        muted: bool,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// A playback error was caught at the session boundary.
    Error {
        /// Machine-readable reason code (same codes as API error bodies).
        code: String,
        /// Human-readable message.
        message: String,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// The session was disposed and released its element.
    Disposed {
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
}

/// Events emitted by the track queue controller.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum QueueEvent {
    /// A new queue was loaded.
    Loaded {
        /// Number of tracks in the queue.
        count: usize,
        /// Identity of the selected starting track, if any.
        #[serde(rename = "startTrackId", skip_serializing_if = "Option::is_none")]
        start_track_id: Option<String>,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// The shuffle flag changed.
    ShuffleChanged {
        /// New shuffle state.
        shuffle: bool,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// The repeat-one flag changed.
    RepeatOneChanged {
        /// New repeat-one state.
        #[serde(rename = "repeatOne")]
        repeat_one: bool,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// A track completed and entered the play-history.
    TrackPlayed {
        /// Identity of the completed track.
        #[serde(rename = "trackId")]
        track_id: String,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
}

// From implementations for converting inner events to BroadcastEvent
impl From<PlaybackEvent> for BroadcastEvent {
    fn from(event: PlaybackEvent) -> Self {
        BroadcastEvent::Playback(event)
    }
}

impl From<QueueEvent> for BroadcastEvent {
    fn from(event: QueueEvent) -> Self {
        BroadcastEvent::Queue(event)
    }
}
