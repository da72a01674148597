//! Playback session: one host media element driven through commands.
//!
//! [`PlaybackSession`] is the clonable handle the API layer talks to. All
//! work happens in a single engine task (see [`engine`]) that owns the
//! track queue, the live gate, and the media element, and processes
//! commands, element events, and internal async results strictly in
//! arrival order. Serializing everything through one task is what keeps
//! `ended` handling and user intents from interleaving.
//!
//! Commands are acknowledged once the engine has validated and applied the
//! transition; asynchronous outcomes that arrive later (a rejected play, a
//! failing source) surface as [`PlaybackEvent`](crate::events::PlaybackEvent)s
//! and snapshot updates, not as command errors.

mod engine;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::element::MediaElement;
use crate::error::{PlayerError, PlayerResult};
use crate::events::EventEmitter;
use crate::inventory::InsertInventory;
use crate::queue::Track;
use crate::runtime::{TaskSpawner, TokioSpawner};
use crate::state::{Config, PlayerState, SessionSnapshot};
use crate::telemetry::TelemetryRecorder;

use engine::SessionEngine;

/// User intents accepted by the engine.
#[derive(Debug)]
pub(crate) enum SessionCommand {
    /// Replace the queue contents and select a starting track.
    LoadQueue {
        tracks: Vec<Track>,
        start_track_id: Option<String>,
    },
    /// Begin an open-live cycle (insert lookup, then the live stream).
    OpenLive { url: Option<String> },
    /// Start or resume playback.
    Play,
    /// Pause playback, keeping the position.
    Pause,
    /// Pause when playing, otherwise play.
    Toggle,
    /// Advance to the next track.
    Next,
    /// Step back, or restart the current track past the threshold.
    Previous,
    /// Skip the active insert once its threshold has been reached.
    SkipInsert,
    /// Seek within the current track.
    Seek { position_secs: f64 },
    /// Set the output volume.
    SetVolume { level: f32 },
    /// Mute or unmute, preserving the volume level.
    SetMuted { muted: bool },
    /// Toggle shuffle sequencing.
    SetShuffle { shuffle: bool },
    /// Toggle repeat-one.
    SetRepeatOne { repeat_one: bool },
    /// Tear the session down.
    Dispose,
}

/// A command paired with its acknowledgment channel.
pub(crate) struct CommandEnvelope {
    pub command: SessionCommand,
    pub reply: oneshot::Sender<PlayerResult<()>>,
}

/// Dependencies a playback session is wired with.
///
/// Assembled by `bootstrap`; tests pass fakes.
pub struct SessionDeps {
    /// The single media element this session drives.
    pub element: Arc<dyn MediaElement>,
    /// Insert inventory consulted when opening live.
    pub inventory: Arc<dyn InsertInventory>,
    /// Fire-and-forget listen telemetry.
    pub telemetry: TelemetryRecorder,
    /// Emitter for typed domain events.
    pub emitter: Arc<dyn EventEmitter>,
    /// Shared snapshot the engine publishes into.
    pub player_state: Arc<PlayerState>,
    /// Task spawner for the engine task and async lookups.
    pub spawner: TokioSpawner,
    /// Cancellation for graceful shutdown.
    pub cancel_token: CancellationToken,
}

/// Clonable handle to a running playback session.
///
/// Every method sends a command to the engine task and awaits its
/// acknowledgment, so when a call returns `Ok` the transition has been
/// applied and is visible in [`snapshot`](Self::snapshot).
#[derive(Clone)]
pub struct PlaybackSession {
    cmd_tx: mpsc::UnboundedSender<CommandEnvelope>,
    state: Arc<PlayerState>,
    disposed: Arc<AtomicBool>,
}

impl PlaybackSession {
    /// Spawns the engine task and returns the handle to it.
    pub fn spawn(config: &Config, deps: SessionDeps) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();

        let state = Arc::clone(&deps.player_state);
        let spawner = deps.spawner.clone();
        let engine = SessionEngine::new(config, deps, internal_tx);
        spawner.spawn(engine.run(cmd_rx, internal_rx));

        Self {
            cmd_tx,
            state,
            disposed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Replaces the queue and selects a starting track.
    ///
    /// Does not initiate playback; an empty track list clears the session
    /// back to idle.
    pub async fn load_queue(
        &self,
        tracks: Vec<Track>,
        start_track_id: Option<String>,
    ) -> PlayerResult<()> {
        self.send(SessionCommand::LoadQueue {
            tracks,
            start_track_id,
        })
        .await
    }

    /// Opens the live stream, playing a promotional insert first when the
    /// inventory schedules one.
    ///
    /// `url` overrides the configured live stream URL for this cycle.
    pub async fn open_live(&self, url: Option<String>) -> PlayerResult<()> {
        self.send(SessionCommand::OpenLive { url }).await
    }

    /// Starts or resumes playback.
    pub async fn play(&self) -> PlayerResult<()> {
        self.send(SessionCommand::Play).await
    }

    /// Pauses playback, keeping the position.
    pub async fn pause(&self) -> PlayerResult<()> {
        self.send(SessionCommand::Pause).await
    }

    /// Pauses when playing, plays otherwise.
    pub async fn toggle(&self) -> PlayerResult<()> {
        self.send(SessionCommand::Toggle).await
    }

    /// Advances to the next track.
    pub async fn next(&self) -> PlayerResult<()> {
        self.send(SessionCommand::Next).await
    }

    /// Steps back, or restarts the current track past the restart threshold.
    pub async fn previous(&self) -> PlayerResult<()> {
        self.send(SessionCommand::Previous).await
    }

    /// Skips the active insert. A no-op until the skip threshold is reached.
    pub async fn skip_insert(&self) -> PlayerResult<()> {
        self.send(SessionCommand::SkipInsert).await
    }

    /// Seeks within the current track. Ignored during inserts and live.
    pub async fn seek(&self, position_secs: f64) -> PlayerResult<()> {
        self.send(SessionCommand::Seek { position_secs }).await
    }

    /// Sets the output volume (clamped to `0.0..=1.0`).
    pub async fn set_volume(&self, level: f32) -> PlayerResult<()> {
        self.send(SessionCommand::SetVolume { level }).await
    }

    /// Mutes or unmutes. Unmuting restores the previous volume exactly.
    pub async fn set_muted(&self, muted: bool) -> PlayerResult<()> {
        self.send(SessionCommand::SetMuted { muted }).await
    }

    /// Sets the shuffle flag.
    pub async fn set_shuffle(&self, shuffle: bool) -> PlayerResult<()> {
        self.send(SessionCommand::SetShuffle { shuffle }).await
    }

    /// Sets the repeat-one flag.
    pub async fn set_repeat_one(&self, repeat_one: bool) -> PlayerResult<()> {
        self.send(SessionCommand::SetRepeatOne { repeat_one }).await
    }

    /// Tears the session down: flushes a partial listen, pauses and
    /// releases the element, and publishes a disposed event.
    ///
    /// Idempotent; repeated calls return `Ok`.
    pub async fn dispose(&self) -> PlayerResult<()> {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let (reply_tx, reply_rx) = oneshot::channel();
        let envelope = CommandEnvelope {
            command: SessionCommand::Dispose,
            reply: reply_tx,
        };
        // Engine already gone (e.g. shutdown token) counts as disposed.
        if self.cmd_tx.send(envelope).is_err() {
            return Ok(());
        }
        match reply_rx.await {
            Ok(result) => result,
            Err(_) => Ok(()),
        }
    }

    /// Returns whether the session has been disposed.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Returns a copy of the current session snapshot.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.snapshot()
    }

    async fn send(&self, command: SessionCommand) -> PlayerResult<()> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(PlayerError::SessionDisposed);
        }
        let (reply_tx, reply_rx) = oneshot::channel();
        let envelope = CommandEnvelope {
            command,
            reply: reply_tx,
        };
        self.cmd_tx
            .send(envelope)
            .map_err(|_| PlayerError::SessionDisposed)?;
        reply_rx.await.map_err(|_| PlayerError::SessionDisposed)?
    }
}
