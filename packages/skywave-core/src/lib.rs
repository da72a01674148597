//! Skywave Core - shared library for the Skywave station player.
//!
//! This crate provides the playback orchestration for Skywave, an internet
//! radio station backend. It sequences the station's track queue, gates
//! entry into the live program behind promotional inserts, drives a media
//! element hosted by the station UI, and reports listen telemetry.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`runtime`]: Task spawning abstraction for async runtime independence
//! - [`events`]: Event system for real-time client communication
//! - [`state`]: Configuration and the shared session snapshot
//! - [`queue`]: Track sequencing (ordered and shuffle) with play history
//! - [`gate`]: Live-entry gating behind promotional inserts
//! - [`element`]: The media element surface the session drives
//! - [`inventory`]: Scheduled-insert lookups
//! - [`telemetry`]: Fire-and-forget listen reporting
//! - [`session`]: The playback session tying it all together
//! - [`api`]: HTTP/WebSocket surface, including the remote element bridge
//! - [`error`]: Centralized error types
//!
//! # Abstraction Traits
//!
//! The crate defines several traits to decouple the session from
//! platform-specific implementations:
//!
//! - [`TaskSpawner`](runtime::TaskSpawner): Spawning background tasks
//! - [`EventEmitter`](events::EventEmitter): Emitting domain events
//! - [`MediaElement`](element::MediaElement): The playback surface
//! - [`InsertInventory`](inventory::InsertInventory): Scheduled-insert lookups
//! - [`TelemetrySink`](telemetry::TelemetrySink): Listen event delivery
//!
//! Each trait has a default implementation suitable for the standalone
//! server; tests substitute fakes.

// Allow missing docs for now during migration - will be cleaned up later
#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod api;
pub mod bootstrap;
pub mod element;
pub mod error;
pub mod events;
pub mod gate;
pub mod inventory;
pub mod queue;
pub mod runtime;
pub mod session;
pub mod state;
pub mod telemetry;
pub mod utils;

// Re-export commonly used types at the crate root
pub use error::{PlayerError, PlayerResult};
pub use events::{BroadcastEvent, BroadcastEventBridge, EventEmitter, PlaybackEvent, QueueEvent};
pub use runtime::{TaskSpawner, TokioSpawner};
pub use state::{Config, Mode, PlayerState, SessionSnapshot, Transport};
pub use utils::now_millis;

// Re-export playback domain types
pub use element::{FakeMediaElement, MediaElement, MediaError, MediaEvent};
pub use gate::{GatePolicy, GateState, Insert, LiveGate};
pub use inventory::{HttpInsertInventory, InsertInventory, NoopInsertInventory};
pub use queue::{QueuePolicy, Track, TrackQueue};
pub use telemetry::{TelemetryEvent, TelemetryRecorder, TelemetrySink};

// Re-export session types
pub use session::{PlaybackSession, SessionDeps};

// Re-export bootstrap types
pub use bootstrap::{bootstrap_services, BootstrappedServices};

// Re-export API types
pub use api::{
    start_server, AppState, AppStateBuilder, RemoteElementHub, ServerError, WsConnectionManager,
};
