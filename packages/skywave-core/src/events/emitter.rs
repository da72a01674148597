//! Event emitter abstraction for domain services.
//!
//! Services emit typed domain events through the [`EventEmitter`] trait
//! instead of talking to a transport directly. The WebSocket/SSE fan-out is
//! one implementation ([`super::BroadcastEventBridge`]); headless embedders
//! can pass [`NoopEventEmitter`] or their own.

use super::{PlaybackEvent, QueueEvent};

/// Trait for emitting domain events to interested clients.
///
/// Implementations must be cheap and non-blocking: emitters are called from
/// the playback engine's event loop.
pub trait EventEmitter: Send + Sync {
    /// Emits a playback session event (transport, source, errors).
    fn emit_playback(&self, event: PlaybackEvent);

    /// Emits a track queue event (loads, flag toggles).
    fn emit_queue(&self, event: QueueEvent);
}

/// Event emitter that discards all events.
///
/// Useful for tests and for embedders that poll the snapshot instead of
/// subscribing to events.
pub struct NoopEventEmitter;

impl EventEmitter for NoopEventEmitter {
    fn emit_playback(&self, _event: PlaybackEvent) {}
    fn emit_queue(&self, _event: QueueEvent) {}
}

/// Event emitter that logs every event at debug level.
pub struct LoggingEventEmitter;

impl EventEmitter for LoggingEventEmitter {
    fn emit_playback(&self, event: PlaybackEvent) {
        tracing::debug!(?event, "playback_event");
    }

    fn emit_queue(&self, event: QueueEvent) {
        tracing::debug!(?event, "queue_event");
    }
}
