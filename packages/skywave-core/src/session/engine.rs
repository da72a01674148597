//! The playback engine task.
//!
//! One `SessionEngine` owns the track queue, the live gate, and the media
//! element. It runs a single `select!` loop over commands, element events,
//! internal async results, and a skip-threshold tick, so every transition
//! is applied in arrival order and `ended` handling can never interleave
//! with a user intent.
//!
//! Async work (element `play`, inventory lookups) is spawned and reports
//! back as [`EngineMsg`]s tagged with the generation current at spawn
//! time. Anything content-switching bumps the generation, so a late result
//! for replaced content is recognized as stale and dropped.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::element::{MediaElement, MediaError, MediaEvent};
use crate::error::{ErrorCode, PlayerError, PlayerResult};
use crate::events::{EventEmitter, PlaybackEvent, QueueEvent};
use crate::gate::{GateDecision, GatePolicy, GateState, Insert, InsertOutcome, LiveGate, OpenStep};
use crate::inventory::InsertInventory;
use crate::queue::{Advance, Direction, Track, TrackQueue};
use crate::runtime::{TaskSpawner, TokioSpawner};
use crate::state::{Config, Mode, PlayerState, Transport};
use crate::telemetry::{TelemetryEvent, TelemetryRecorder};
use crate::utils::{clamp_volume, now_millis};

use super::{CommandEnvelope, SessionCommand, SessionDeps};

/// How often time-based conditions are re-evaluated while an insert plays.
const SKIP_TICK_MS: u64 = 100;

/// Results of spawned async work, reported back into the engine loop.
pub(crate) enum EngineMsg {
    /// The inventory lookup for an open-live cycle finished.
    InventoryResolved {
        generation: u64,
        found: Option<Insert>,
    },
    /// An element `play` attempt finished.
    PlayResult {
        generation: u64,
        result: Result<(), MediaError>,
    },
}

pub(crate) struct SessionEngine {
    queue: TrackQueue,
    gate: LiveGate,
    gate_policy: GatePolicy,
    mode: Mode,
    transport: Transport,
    element: Arc<dyn MediaElement>,
    inventory: Arc<dyn InsertInventory>,
    telemetry: TelemetryRecorder,
    emitter: Arc<dyn EventEmitter>,
    player_state: Arc<PlayerState>,
    spawner: TokioSpawner,
    cancel_token: CancellationToken,
    internal_tx: mpsc::UnboundedSender<EngineMsg>,
    /// Bumped on every content switch; stale async results are dropped.
    generation: u64,
    default_live_url: Option<String>,
    /// Live URL of the current open cycle.
    live_url: Option<String>,
    /// Published volume level (what unmuting restores).
    volume: f32,
    last_volume: f32,
    muted: bool,
    /// One-shot latch for the insert-skippable announcement.
    skippable_announced: bool,
    consecutive_source_failures: usize,
    disposed: bool,
}

impl SessionEngine {
    pub(crate) fn new(
        config: &Config,
        deps: SessionDeps,
        internal_tx: mpsc::UnboundedSender<EngineMsg>,
    ) -> Self {
        Self {
            queue: TrackQueue::new(config.queue),
            gate: LiveGate::new(config.gate),
            gate_policy: config.gate,
            mode: Mode::Idle,
            transport: Transport::Stopped,
            element: deps.element,
            inventory: deps.inventory,
            telemetry: deps.telemetry,
            emitter: deps.emitter,
            player_state: deps.player_state,
            spawner: deps.spawner,
            cancel_token: deps.cancel_token,
            internal_tx,
            generation: 0,
            default_live_url: config.live_stream_url.clone(),
            live_url: None,
            volume: 1.0,
            last_volume: 1.0,
            muted: false,
            skippable_announced: false,
            consecutive_source_failures: 0,
            disposed: false,
        }
    }

    pub(crate) async fn run(
        mut self,
        mut cmd_rx: mpsc::UnboundedReceiver<CommandEnvelope>,
        mut internal_rx: mpsc::UnboundedReceiver<EngineMsg>,
    ) {
        let mut media_rx = self.element.subscribe();
        let mut media_closed = false;
        let mut skip_tick = interval(Duration::from_millis(SKIP_TICK_MS));
        skip_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let cancel_token = self.cancel_token.clone();

        log::info!("[Session] engine started");

        loop {
            tokio::select! {
                _ = cancel_token.cancelled() => {
                    self.shutdown();
                    break;
                }
                maybe_envelope = cmd_rx.recv() => {
                    match maybe_envelope {
                        Some(envelope) => {
                            if self.handle_command(envelope) {
                                break;
                            }
                        }
                        None => {
                            // Every handle dropped; tear down.
                            self.shutdown();
                            break;
                        }
                    }
                }
                Some(msg) = internal_rx.recv() => self.handle_internal(msg),
                event = media_rx.recv(), if !media_closed => {
                    match event {
                        Ok(event) => self.handle_media_event(event),
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            log::warn!("[Session] dropped {} media events", n);
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            log::warn!("[Session] media element event channel closed");
                            media_closed = true;
                        }
                    }
                }
                _ = skip_tick.tick(), if self.gate.is_insert_playing() && !self.skippable_announced => {
                    self.maybe_announce_skippable(self.element.position());
                }
            }
        }

        log::info!("[Session] engine stopped");
    }

    /// Applies one command and acknowledges it. Returns true when the
    /// engine should exit.
    fn handle_command(&mut self, envelope: CommandEnvelope) -> bool {
        let CommandEnvelope { command, reply } = envelope;
        let exit = matches!(command, SessionCommand::Dispose);

        let result = match command {
            SessionCommand::LoadQueue {
                tracks,
                start_track_id,
            } => self.load_queue(tracks, start_track_id),
            SessionCommand::OpenLive { url } => self.open_live(url),
            SessionCommand::Play => self.play(),
            SessionCommand::Pause => {
                self.pause();
                Ok(())
            }
            SessionCommand::Toggle => self.toggle(),
            SessionCommand::Next => self.navigate(Direction::Next),
            SessionCommand::Previous => self.navigate(Direction::Previous),
            SessionCommand::SkipInsert => {
                self.skip_insert();
                Ok(())
            }
            SessionCommand::Seek { position_secs } => self.seek(position_secs),
            SessionCommand::SetVolume { level } => self.set_volume(level),
            SessionCommand::SetMuted { muted } => {
                self.set_muted(muted);
                Ok(())
            }
            SessionCommand::SetShuffle { shuffle } => {
                self.set_shuffle(shuffle);
                Ok(())
            }
            SessionCommand::SetRepeatOne { repeat_one } => {
                self.set_repeat_one(repeat_one);
                Ok(())
            }
            SessionCommand::Dispose => {
                self.shutdown();
                Ok(())
            }
        };

        let _ = reply.send(result);
        exit
    }

    fn handle_internal(&mut self, msg: EngineMsg) {
        match msg {
            EngineMsg::InventoryResolved { generation, found } => {
                if generation != self.generation {
                    log::debug!("[Session] stale inventory result dropped");
                    return;
                }
                match self.gate.resolve_insert(found) {
                    GateDecision::Insert(insert) => self.start_insert(insert),
                    GateDecision::Live => self.enter_live(),
                }
            }
            EngineMsg::PlayResult { generation, result } => {
                if generation != self.generation {
                    log::trace!("[Session] stale play result dropped");
                    return;
                }
                match result {
                    Ok(()) => {
                        self.consecutive_source_failures = 0;
                    }
                    Err(err @ MediaError::NotAllowed(_)) => {
                        // Autoplay policy refusal: recoverable by a user
                        // gesture, so hold position instead of advancing.
                        self.set_transport(Transport::Paused);
                        self.emit_error(err.code(), &err.to_string());
                    }
                    Err(err @ MediaError::Source(_)) => {
                        self.handle_source_failure(&err.to_string());
                    }
                    Err(err @ MediaError::Detached) => {
                        self.set_transport(Transport::Stopped);
                        self.emit_error(err.code(), &err.to_string());
                    }
                }
            }
        }
    }

    fn handle_media_event(&mut self, event: MediaEvent) {
        match event {
            MediaEvent::CanPlay { duration_secs } => {
                if duration_secs.is_some() {
                    self.player_state.update(|s| s.duration_secs = duration_secs);
                }
            }
            MediaEvent::TimeUpdate { position_secs } => {
                let duration_secs = self.element.duration();
                self.player_state.update(|s| {
                    s.position_secs = position_secs;
                    if duration_secs.is_some() {
                        s.duration_secs = duration_secs;
                    }
                });
                self.emitter.emit_playback(PlaybackEvent::Progress {
                    position_secs,
                    duration_secs,
                    timestamp: now_millis(),
                });
                if self.gate.is_insert_playing() {
                    self.maybe_announce_skippable(position_secs);
                }
            }
            MediaEvent::Ended => self.handle_ended(),
            MediaEvent::Error { message } => self.handle_source_failure(&message),
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Commands
    // ─────────────────────────────────────────────────────────────────────

    fn load_queue(&mut self, tracks: Vec<Track>, start_track_id: Option<String>) -> PlayerResult<()> {
        self.flush_partial_listen();
        self.generation += 1;
        self.gate.reset();
        self.skippable_announced = false;
        self.consecutive_source_failures = 0;
        self.live_url = None;

        self.queue.load(tracks, start_track_id.as_deref());
        let count = self.queue.len();
        self.emitter.emit_queue(QueueEvent::Loaded {
            count,
            start_track_id: self.queue.current().map(|t| t.id.clone()),
            timestamp: now_millis(),
        });

        self.player_state.update(|s| {
            s.queue_len = count;
            s.gate_state = GateState::Closed;
            s.active_insert = None;
            s.insert_skippable = false;
            s.live_url = None;
            s.shuffle = self.queue.is_shuffle();
            s.repeat_one = self.queue.is_repeat_one();
        });

        match self.queue.current().cloned() {
            Some(track) => self.prepare_track(track, false),
            None => {
                self.element.pause();
                self.mode = Mode::Idle;
                self.player_state.update(|s| {
                    s.mode = Mode::Idle;
                    s.current_track = None;
                    s.current_index = None;
                    s.position_secs = 0.0;
                    s.duration_secs = None;
                });
                self.set_transport(Transport::Stopped);
            }
        }
        Ok(())
    }

    fn open_live(&mut self, url: Option<String>) -> PlayerResult<()> {
        let Some(target) = url.or_else(|| self.default_live_url.clone()) else {
            return Err(PlayerError::Configuration(
                "no live stream URL configured".to_string(),
            ));
        };

        self.flush_partial_listen();
        self.generation += 1;
        self.element.pause();
        self.set_transport(Transport::Stopped);
        self.gate.reset();
        self.skippable_announced = false;
        self.mode = Mode::GatedLive;
        self.live_url = Some(target.clone());
        self.player_state.update(|s| {
            s.mode = Mode::GatedLive;
            s.active_insert = None;
            s.insert_skippable = false;
            s.live_url = Some(target);
            s.position_secs = 0.0;
            s.duration_secs = None;
        });

        match self.gate.request_open() {
            OpenStep::GoLive => self.enter_live(),
            OpenStep::LookupInsert => {
                self.player_state
                    .update(|s| s.gate_state = GateState::AwaitingDecision);

                let inventory = Arc::clone(&self.inventory);
                let tx = self.internal_tx.clone();
                let generation = self.generation;
                self.spawner.spawn(async move {
                    // Lookup failure degrades to live; it never blocks the
                    // stream and never surfaces to the caller.
                    let found = match inventory.fetch_insert().await {
                        Ok(found) => found,
                        Err(e) => {
                            log::warn!("[Session] insert lookup failed, going live: {}", e);
                            None
                        }
                    };
                    let _ = tx.send(EngineMsg::InventoryResolved { generation, found });
                });
            }
        }
        Ok(())
    }

    fn play(&mut self) -> PlayerResult<()> {
        match self.mode {
            Mode::Idle => Err(PlayerError::EmptyQueue("play requested".to_string())),
            Mode::Queue => {
                if self.queue.current().is_none() {
                    return Err(PlayerError::EmptyQueue("play requested".to_string()));
                }
                self.start_play();
                Ok(())
            }
            Mode::GatedLive => {
                match self.gate.state() {
                    GateState::Live | GateState::InsertPlaying => self.start_play(),
                    // Lookup still in flight; the decision autoplays.
                    _ => {}
                }
                Ok(())
            }
        }
    }

    fn pause(&mut self) {
        if self.transport == Transport::Playing {
            self.element.pause();
            self.set_transport(Transport::Paused);
        }
    }

    fn toggle(&mut self) -> PlayerResult<()> {
        if self.transport == Transport::Playing {
            self.pause();
            Ok(())
        } else {
            self.play()
        }
    }

    fn navigate(&mut self, direction: Direction) -> PlayerResult<()> {
        if self.mode == Mode::GatedLive {
            return Err(PlayerError::InvalidRequest(
                "queue navigation is not available during live playback".to_string(),
            ));
        }
        if self.queue.is_empty() {
            let op = match direction {
                Direction::Next => "next",
                Direction::Previous => "previous",
            };
            return Err(PlayerError::EmptyQueue(format!("{} requested", op)));
        }

        let elapsed = self.element.position();
        let autoplay = self.transport == Transport::Playing;
        self.flush_partial_listen();

        match self.queue.advance(direction, elapsed) {
            Advance::Switched(track) => self.prepare_track(track, autoplay),
            Advance::RestartCurrent => {
                self.element.seek(0.0);
                self.player_state.update(|s| s.position_secs = 0.0);
            }
            Advance::Empty => {
                return Err(PlayerError::EmptyQueue("navigation requested".to_string()))
            }
        }
        Ok(())
    }

    fn skip_insert(&mut self) {
        let elapsed = self.element.position();
        if !self.gate.can_skip(elapsed) {
            log::debug!("[Session] skip ignored at {:.1}s", elapsed);
            return;
        }
        if let Some(insert) = self.gate.finish_insert(InsertOutcome::Skipped) {
            if elapsed > 0.0 {
                self.telemetry
                    .dispatch(TelemetryEvent::insert(&insert.id, elapsed, false));
            }
            self.emitter.emit_playback(PlaybackEvent::InsertFinished {
                reason: InsertOutcome::Skipped,
                timestamp: now_millis(),
            });
        }
        self.enter_live();
    }

    fn seek(&mut self, position_secs: f64) -> PlayerResult<()> {
        if !position_secs.is_finite() || position_secs < 0.0 {
            return Err(PlayerError::InvalidRequest(
                "seek position must be a non-negative number of seconds".to_string(),
            ));
        }
        // Inserts and live are not seekable.
        if self.mode != Mode::Queue || self.queue.current().is_none() {
            log::debug!("[Session] seek ignored outside queue playback");
            return Ok(());
        }
        self.element.seek(position_secs);
        self.player_state.update(|s| s.position_secs = position_secs);
        Ok(())
    }

    fn set_volume(&mut self, level: f32) -> PlayerResult<()> {
        if !level.is_finite() {
            return Err(PlayerError::InvalidRequest(
                "volume must be a finite number".to_string(),
            ));
        }
        let level = clamp_volume(level);
        if self.muted && level == 0.0 {
            return Ok(());
        }

        self.element.set_volume(level);
        let before = (self.volume, self.muted);
        self.volume = level;
        if level > 0.0 {
            self.last_volume = level;
        }
        self.muted = false;
        self.player_state.update(|s| {
            s.volume = self.volume;
            s.muted = self.muted;
        });
        if before != (self.volume, self.muted) {
            self.emitter.emit_playback(PlaybackEvent::VolumeChanged {
                volume: self.volume,
                muted: self.muted,
                timestamp: now_millis(),
            });
        }
        Ok(())
    }

    /// Mute drives the element volume to zero; unmute restores the last
    /// non-zero level exactly.
    fn set_muted(&mut self, muted: bool) {
        if muted == self.muted {
            return;
        }
        self.muted = muted;
        if muted {
            if self.volume > 0.0 {
                self.last_volume = self.volume;
            }
            self.element.set_volume(0.0);
        } else {
            self.element.set_volume(self.last_volume);
        }
        self.volume = self.last_volume;
        self.player_state.update(|s| {
            s.volume = self.volume;
            s.muted = self.muted;
        });
        self.emitter.emit_playback(PlaybackEvent::VolumeChanged {
            volume: self.volume,
            muted: self.muted,
            timestamp: now_millis(),
        });
    }

    fn set_shuffle(&mut self, shuffle: bool) {
        if self.queue.is_shuffle() == shuffle {
            return;
        }
        self.queue.set_shuffle(shuffle);
        self.player_state.update(|s| s.shuffle = shuffle);
        self.emitter.emit_queue(QueueEvent::ShuffleChanged {
            shuffle,
            timestamp: now_millis(),
        });
    }

    fn set_repeat_one(&mut self, repeat_one: bool) {
        if self.queue.is_repeat_one() == repeat_one {
            return;
        }
        self.queue.set_repeat_one(repeat_one);
        self.player_state.update(|s| s.repeat_one = repeat_one);
        self.emitter.emit_queue(QueueEvent::RepeatOneChanged {
            repeat_one,
            timestamp: now_millis(),
        });
    }

    fn shutdown(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.flush_partial_listen();
        self.element.pause();
        self.generation += 1;
        self.set_transport(Transport::Stopped);
        self.player_state.update(|s| {
            s.active_insert = None;
            s.insert_skippable = false;
        });
        self.emitter.emit_playback(PlaybackEvent::Disposed {
            timestamp: now_millis(),
        });
        log::info!("[Session] disposed");
    }

    // ─────────────────────────────────────────────────────────────────────
    // Element outcomes
    // ─────────────────────────────────────────────────────────────────────

    fn handle_ended(&mut self) {
        if self.gate.is_insert_playing() {
            let elapsed = self.element.position();
            if let Some(insert) = self.gate.finish_insert(InsertOutcome::Completed) {
                self.telemetry
                    .dispatch(TelemetryEvent::insert(&insert.id, elapsed, true));
                self.emitter.emit_playback(PlaybackEvent::InsertFinished {
                    reason: InsertOutcome::Completed,
                    timestamp: now_millis(),
                });
            }
            self.enter_live();
            return;
        }

        match self.mode {
            Mode::Queue => self.handle_track_completed(),
            Mode::GatedLive => {
                // The live broadcast itself went away.
                let elapsed = self.element.position();
                if elapsed > 0.0 {
                    self.telemetry.dispatch(TelemetryEvent::live_program(elapsed));
                }
                self.set_transport(Transport::Stopped);
            }
            Mode::Idle => {}
        }
    }

    fn handle_track_completed(&mut self) {
        let Some(track) = self.queue.current().cloned() else {
            self.set_transport(Transport::Stopped);
            return;
        };

        let elapsed = self.element.position();
        if self.queue.mark_played(&track.id) {
            self.emitter.emit_queue(QueueEvent::TrackPlayed {
                track_id: track.id.clone(),
                timestamp: now_millis(),
            });
        }
        self.telemetry
            .dispatch(TelemetryEvent::track(&track.id, elapsed, true));

        if self.queue.is_repeat_one() {
            self.element.seek(0.0);
            self.player_state.update(|s| s.position_secs = 0.0);
            self.start_play();
            return;
        }

        match self.queue.advance(Direction::Next, 0.0) {
            Advance::Switched(next) => self.prepare_track(next, true),
            // advance(next) on a non-empty queue always switches; anything
            // else means the queue emptied under us.
            _ => self.set_transport(Transport::Stopped),
        }
    }

    fn handle_source_failure(&mut self, message: &str) {
        if self.gate.is_insert_playing() {
            self.fail_insert(message);
            return;
        }
        match self.mode {
            Mode::Queue => self.handle_queue_source_failure(message),
            Mode::GatedLive => {
                self.emit_error("source_unavailable", message);
                self.flush_partial_listen();
                self.set_transport(Transport::Stopped);
            }
            Mode::Idle => {
                self.emit_error("source_unavailable", message);
                self.set_transport(Transport::Stopped);
            }
        }
    }

    /// A failing queue source is treated like a completion: mark it played
    /// and advance, so one broken track never wedges the queue. The
    /// consecutive-failure guard stops the session once every source has
    /// failed back-to-back.
    fn handle_queue_source_failure(&mut self, message: &str) {
        let autoplay = self.transport == Transport::Playing;
        self.emit_error("source_unavailable", message);
        self.flush_partial_listen();

        if let Some(track) = self.queue.current().cloned() {
            if self.queue.mark_played(&track.id) {
                self.emitter.emit_queue(QueueEvent::TrackPlayed {
                    track_id: track.id,
                    timestamp: now_millis(),
                });
            }
        }

        self.consecutive_source_failures += 1;
        if self.consecutive_source_failures >= self.queue.len().max(1) {
            log::warn!("[Session] every queued source is failing, stopping");
            self.set_transport(Transport::Stopped);
            return;
        }

        match self.queue.advance(Direction::Next, 0.0) {
            Advance::Switched(track) => self.prepare_track(track, autoplay),
            _ => self.set_transport(Transport::Stopped),
        }
    }

    fn fail_insert(&mut self, message: &str) {
        let elapsed = self.element.position();
        if let Some(insert) = self.gate.finish_insert(InsertOutcome::Failed) {
            if elapsed > 0.0 {
                self.telemetry
                    .dispatch(TelemetryEvent::insert(&insert.id, elapsed, false));
            }
            self.emitter.emit_playback(PlaybackEvent::InsertFinished {
                reason: InsertOutcome::Failed,
                timestamp: now_millis(),
            });
        }
        self.emit_error("source_unavailable", message);
        self.enter_live();
    }

    // ─────────────────────────────────────────────────────────────────────
    // Transitions
    // ─────────────────────────────────────────────────────────────────────

    fn prepare_track(&mut self, track: Track, autoplay: bool) {
        self.generation += 1;
        self.element.set_source(&track.source_url);
        self.element.load();

        let index = self.queue.current_index().unwrap_or(0);
        self.mode = Mode::Queue;
        self.player_state.update(|s| {
            s.mode = Mode::Queue;
            s.current_track = Some(track.clone());
            s.current_index = Some(index);
            s.position_secs = 0.0;
            s.duration_secs = track.duration_secs;
        });
        self.emitter.emit_playback(PlaybackEvent::TrackChanged {
            track,
            index,
            timestamp: now_millis(),
        });

        if autoplay {
            self.start_play();
        } else {
            self.set_transport(Transport::Paused);
        }
    }

    fn start_insert(&mut self, insert: Insert) {
        self.generation += 1;
        self.skippable_announced = false;
        self.element.set_source(&insert.source_url);
        self.element.load();

        let skippable_after_secs = insert
            .skippable_after_secs
            .unwrap_or(self.gate_policy.skippable_after_secs);
        self.player_state.update(|s| {
            s.gate_state = GateState::InsertPlaying;
            s.active_insert = Some(insert.clone());
            s.insert_skippable = false;
            s.position_secs = 0.0;
            s.duration_secs = insert.duration_secs;
        });
        self.emitter.emit_playback(PlaybackEvent::InsertStarted {
            insert,
            skippable_after_secs,
            timestamp: now_millis(),
        });
        self.start_play();
    }

    fn enter_live(&mut self) {
        let Some(url) = self.live_url.clone() else {
            log::error!("[Session] entering live without a URL; stopping");
            self.set_transport(Transport::Stopped);
            return;
        };
        self.generation += 1;
        self.skippable_announced = false;
        self.element.set_source(&url);
        self.element.load();

        self.player_state.update(|s| {
            s.gate_state = GateState::Live;
            s.active_insert = None;
            s.insert_skippable = false;
            s.position_secs = 0.0;
            s.duration_secs = None;
        });
        self.emitter.emit_playback(PlaybackEvent::LiveStarted {
            url,
            timestamp: now_millis(),
        });
        self.start_play();
    }

    /// Requests playback start; optimistic `Playing` until the element
    /// reports back through [`EngineMsg::PlayResult`].
    fn start_play(&mut self) {
        self.set_transport(Transport::Playing);
        let element = Arc::clone(&self.element);
        let tx = self.internal_tx.clone();
        let generation = self.generation;
        self.spawner.spawn(async move {
            let result = element.play().await;
            let _ = tx.send(EngineMsg::PlayResult { generation, result });
        });
    }

    fn set_transport(&mut self, transport: Transport) {
        if self.transport == transport {
            return;
        }
        self.transport = transport;
        self.player_state.update(|s| s.transport = transport);
        self.emitter.emit_playback(PlaybackEvent::TransportChanged {
            transport,
            timestamp: now_millis(),
        });
    }

    fn maybe_announce_skippable(&mut self, position_secs: f64) {
        if self.skippable_announced || !self.gate.can_skip(position_secs) {
            return;
        }
        self.skippable_announced = true;
        self.player_state.update(|s| s.insert_skippable = true);
        self.emitter.emit_playback(PlaybackEvent::InsertSkippable {
            timestamp: now_millis(),
        });
    }

    /// Reports a partial listen for whatever is audible right now.
    ///
    /// Called on every teardown path that is not a natural completion:
    /// navigation, queue reload, opening live, and disposal.
    fn flush_partial_listen(&self) {
        let elapsed = self.element.position();
        if elapsed <= 0.0 {
            return;
        }
        if let Some(insert) = self.gate.active_insert() {
            self.telemetry
                .dispatch(TelemetryEvent::insert(&insert.id, elapsed, false));
            return;
        }
        match self.mode {
            Mode::Queue => {
                if let Some(track) = self.queue.current() {
                    self.telemetry
                        .dispatch(TelemetryEvent::track(&track.id, elapsed, false));
                }
            }
            Mode::GatedLive if self.gate.state() == GateState::Live => {
                self.telemetry.dispatch(TelemetryEvent::live_program(elapsed));
            }
            _ => {}
        }
    }

    fn emit_error(&self, code: &str, message: &str) {
        log::warn!("[Session] {}: {}", code, message);
        self.emitter.emit_playback(PlaybackEvent::Error {
            code: code.to_string(),
            message: message.to_string(),
            timestamp: now_millis(),
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use tokio::sync::Notify;
    use tokio_util::sync::CancellationToken;

    use crate::element::{ElementOp, FakeMediaElement, MediaElement, MediaError};
    use crate::events::test_support::RecordingEventEmitter;
    use crate::events::{PlaybackEvent, QueueEvent};
    use crate::gate::{GateState, Insert, InsertOutcome};
    use crate::inventory::{InsertInventory, InventoryError, InventoryResult, NoopInsertInventory};
    use crate::queue::Track;
    use crate::runtime::TokioSpawner;
    use crate::session::{PlaybackSession, SessionDeps};
    use crate::state::{Config, Mode, PlayerState, Transport};
    use crate::telemetry::test_support::RecordingTelemetrySink;
    use crate::telemetry::{ListenSubject, TelemetryRecorder};

    const LIVE_URL: &str = "https://live.example/program.aac";

    fn src(id: &str) -> String {
        format!("https://cdn.example/{}.mp3", id)
    }

    fn track(id: &str) -> Track {
        Track {
            id: id.to_string(),
            title: format!("Track {}", id),
            artist: "Artist".to_string(),
            artwork_url: None,
            source_url: src(id),
            duration_secs: Some(180.0),
        }
    }

    fn tracks(ids: &[&str]) -> Vec<Track> {
        ids.iter().map(|id| track(id)).collect()
    }

    fn insert(id: &str, skippable_after: Option<f64>) -> Insert {
        Insert {
            id: id.to_string(),
            title: format!("Promo {}", id),
            source_url: format!("https://ads.example/{}.mp3", id),
            duration_secs: Some(20.0),
            skippable_after_secs: skippable_after,
        }
    }

    /// Inventory that always schedules the same insert.
    struct FixedInventory(Insert);

    #[async_trait]
    impl InsertInventory for FixedInventory {
        async fn fetch_insert(&self) -> InventoryResult<Option<Insert>> {
            Ok(Some(self.0.clone()))
        }
    }

    /// Inventory that always fails.
    struct FailingInventory;

    #[async_trait]
    impl InsertInventory for FailingInventory {
        async fn fetch_insert(&self) -> InventoryResult<Option<Insert>> {
            Err(InventoryError::Status(500))
        }
    }

    /// Inventory that blocks until the test releases it.
    struct GatedInventory {
        release: Arc<Notify>,
        insert: Insert,
    }

    #[async_trait]
    impl InsertInventory for GatedInventory {
        async fn fetch_insert(&self) -> InventoryResult<Option<Insert>> {
            self.release.notified().await;
            Ok(Some(self.insert.clone()))
        }
    }

    struct Harness {
        session: PlaybackSession,
        element: Arc<FakeMediaElement>,
        emitter: Arc<RecordingEventEmitter>,
        sink: Arc<RecordingTelemetrySink>,
    }

    fn harness_with(config: Config, inventory: Arc<dyn InsertInventory>) -> Harness {
        let element = Arc::new(FakeMediaElement::new());
        let emitter = Arc::new(RecordingEventEmitter::new());
        let sink = Arc::new(RecordingTelemetrySink::new());
        let telemetry = TelemetryRecorder::new(sink.clone(), TokioSpawner::current());
        let deps = SessionDeps {
            element: element.clone(),
            inventory,
            telemetry,
            emitter: emitter.clone(),
            player_state: Arc::new(PlayerState::default()),
            spawner: TokioSpawner::current(),
            cancel_token: CancellationToken::new(),
        };
        let session = PlaybackSession::spawn(&config, deps);
        Harness {
            session,
            element,
            emitter,
            sink,
        }
    }

    fn harness() -> Harness {
        let mut config = Config::default();
        config.live_stream_url = Some(LIVE_URL.to_string());
        harness_with(config, Arc::new(NoopInsertInventory))
    }

    fn insert_harness(insert: Insert) -> Harness {
        let mut config = Config::default();
        config.live_stream_url = Some(LIVE_URL.to_string());
        harness_with(config, Arc::new(FixedInventory(insert)))
    }

    /// Lets spawned play attempts and their acknowledgments drain.
    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    fn count_plays(ops: &[ElementOp]) -> usize {
        ops.iter().filter(|op| matches!(op, ElementOp::Play)).count()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Queue loading and transport
    // ─────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn load_queue_selects_start_without_playing() {
        let h = harness();
        h.session
            .load_queue(tracks(&["a", "b", "c"]), None)
            .await
            .unwrap();
        settle().await;

        let snap = h.session.snapshot();
        assert_eq!(snap.mode, Mode::Queue);
        assert_eq!(snap.transport, Transport::Paused);
        assert_eq!(snap.current_track.unwrap().id, "a");
        assert_eq!(snap.queue_len, 3);

        let ops = h.element.ops();
        assert!(ops.contains(&ElementOp::SetSource(src("a"))));
        assert!(ops.contains(&ElementOp::Load));
        assert_eq!(count_plays(&ops), 0);

        assert!(matches!(
            h.emitter.queue_events()[0],
            QueueEvent::Loaded { count: 3, .. }
        ));
        assert!(h.emitter.playback_events().iter().any(
            |e| matches!(e, PlaybackEvent::TrackChanged { track, index: 0, .. } if track.id == "a")
        ));
    }

    #[tokio::test]
    async fn load_queue_honors_start_track_id() {
        let h = harness();
        h.session
            .load_queue(tracks(&["a", "b", "c"]), Some("b".to_string()))
            .await
            .unwrap();

        let snap = h.session.snapshot();
        assert_eq!(snap.current_track.unwrap().id, "b");
        assert_eq!(snap.current_index, Some(1));
    }

    #[tokio::test]
    async fn load_empty_queue_clears_to_idle() {
        let h = harness();
        h.session.load_queue(tracks(&["a"]), None).await.unwrap();
        h.session.load_queue(Vec::new(), None).await.unwrap();

        let snap = h.session.snapshot();
        assert_eq!(snap.mode, Mode::Idle);
        assert_eq!(snap.transport, Transport::Stopped);
        assert!(snap.current_track.is_none());
        assert_eq!(snap.queue_len, 0);
    }

    #[tokio::test]
    async fn play_starts_the_element() {
        let h = harness();
        h.session.load_queue(tracks(&["a"]), None).await.unwrap();
        h.session.play().await.unwrap();

        assert_eq!(h.session.snapshot().transport, Transport::Playing);
        settle().await;
        assert_eq!(count_plays(&h.element.ops()), 1);
    }

    #[tokio::test]
    async fn play_without_content_is_rejected() {
        let h = harness();
        let err = h.session.play().await.unwrap_err();
        assert_eq!(err.code(), "empty_queue");
    }

    #[tokio::test]
    async fn toggle_alternates_between_playing_and_paused() {
        let h = harness();
        h.session.load_queue(tracks(&["a"]), None).await.unwrap();

        h.session.toggle().await.unwrap();
        assert_eq!(h.session.snapshot().transport, Transport::Playing);

        h.session.toggle().await.unwrap();
        assert_eq!(h.session.snapshot().transport, Transport::Paused);
        assert!(h.element.ops().contains(&ElementOp::Pause));

        h.session.toggle().await.unwrap();
        assert_eq!(h.session.snapshot().transport, Transport::Playing);
    }

    #[tokio::test]
    async fn blocked_play_reverts_to_paused_with_error_event() {
        let h = harness();
        h.session.load_queue(tracks(&["a"]), None).await.unwrap();
        h.element
            .push_play_result(Err(MediaError::NotAllowed("gesture required".to_string())));

        h.session.play().await.unwrap();
        settle().await;

        assert_eq!(h.session.snapshot().transport, Transport::Paused);
        assert!(h
            .emitter
            .playback_events()
            .iter()
            .any(|e| matches!(e, PlaybackEvent::Error { code, .. } if code == "platform_blocked")));
        // Held in place: no advance, no second attempt.
        assert_eq!(h.session.snapshot().current_track.unwrap().id, "a");
        assert_eq!(count_plays(&h.element.ops()), 1);
    }

    // ─────────────────────────────────────────────────────────────────────
    // Completion and navigation
    // ─────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn ended_dispatches_one_telemetry_event_and_advances() {
        let h = harness();
        h.session
            .load_queue(tracks(&["a", "b"]), None)
            .await
            .unwrap();
        h.session.play().await.unwrap();
        settle().await;

        h.element.emit_time_update(179.0);
        h.element.emit_ended();
        settle().await;

        let events = h.sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].subject, ListenSubject::Track);
        assert_eq!(events[0].subject_id.as_deref(), Some("a"));
        assert!(events[0].completed);
        assert_eq!(events[0].elapsed_secs, 179.0);

        let snap = h.session.snapshot();
        assert_eq!(snap.current_track.unwrap().id, "b");
        assert_eq!(snap.transport, Transport::Playing);
        assert!(h.element.ops().contains(&ElementOp::SetSource(src("b"))));
        assert!(h
            .emitter
            .queue_events()
            .iter()
            .any(|e| matches!(e, QueueEvent::TrackPlayed { track_id, .. } if track_id == "a")));
    }

    #[tokio::test]
    async fn repeat_one_replays_the_same_track() {
        let h = harness();
        h.session
            .load_queue(tracks(&["a", "b"]), None)
            .await
            .unwrap();
        h.session.set_repeat_one(true).await.unwrap();
        h.session.play().await.unwrap();
        settle().await;

        h.element.emit_time_update(180.0);
        h.element.emit_ended();
        settle().await;

        let snap = h.session.snapshot();
        assert_eq!(snap.current_track.unwrap().id, "a");
        assert_eq!(snap.transport, Transport::Playing);
        assert!(h.element.ops().contains(&ElementOp::Seek(0.0)));
        assert_eq!(h.sink.events().len(), 1);

        // Only the initial load announced a track change.
        let changes = h
            .emitter
            .playback_events()
            .iter()
            .filter(|e| matches!(e, PlaybackEvent::TrackChanged { .. }))
            .count();
        assert_eq!(changes, 1);
    }

    #[tokio::test]
    async fn next_while_paused_stays_paused() {
        let h = harness();
        h.session
            .load_queue(tracks(&["a", "b"]), None)
            .await
            .unwrap();
        h.session.next().await.unwrap();
        settle().await;

        let snap = h.session.snapshot();
        assert_eq!(snap.current_track.unwrap().id, "b");
        assert_eq!(snap.transport, Transport::Paused);
        assert_eq!(count_plays(&h.element.ops()), 0);
        assert!(h.sink.events().is_empty());
    }

    #[tokio::test]
    async fn next_while_playing_reports_partial_listen_and_keeps_playing() {
        let h = harness();
        h.session
            .load_queue(tracks(&["a", "b"]), None)
            .await
            .unwrap();
        h.session.play().await.unwrap();
        settle().await;
        h.element.emit_time_update(30.0);

        h.session.next().await.unwrap();
        settle().await;

        let events = h.sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].subject_id.as_deref(), Some("a"));
        assert!(!events[0].completed);
        assert_eq!(events[0].elapsed_secs, 30.0);

        let snap = h.session.snapshot();
        assert_eq!(snap.current_track.unwrap().id, "b");
        assert_eq!(snap.transport, Transport::Playing);
        assert_eq!(count_plays(&h.element.ops()), 2);
    }

    #[tokio::test]
    async fn previous_steps_back_early_and_restarts_late() {
        let h = harness();
        h.session
            .load_queue(tracks(&["a", "b", "c"]), None)
            .await
            .unwrap();
        h.session.next().await.unwrap(); // at b

        h.element.emit_time_update(1.0);
        h.session.previous().await.unwrap();
        assert_eq!(h.session.snapshot().current_track.unwrap().id, "a");

        h.element.emit_time_update(10.0);
        settle().await;
        h.session.previous().await.unwrap();
        assert_eq!(h.session.snapshot().current_track.unwrap().id, "a");
        assert!(h.element.ops().contains(&ElementOp::Seek(0.0)));
        assert_eq!(h.session.snapshot().position_secs, 0.0);
    }

    #[tokio::test]
    async fn navigation_on_empty_queue_is_rejected() {
        let h = harness();
        let err = h.session.next().await.unwrap_err();
        assert_eq!(err.code(), "empty_queue");
        let err = h.session.previous().await.unwrap_err();
        assert_eq!(err.code(), "empty_queue");
    }

    // ─────────────────────────────────────────────────────────────────────
    // Source failures
    // ─────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn source_failure_marks_played_and_advances() {
        let h = harness();
        h.session
            .load_queue(tracks(&["a", "b"]), None)
            .await
            .unwrap();
        h.element
            .push_play_result(Err(MediaError::Source("404".to_string())));

        h.session.play().await.unwrap();
        settle().await;

        assert!(h
            .emitter
            .playback_events()
            .iter()
            .any(|e| matches!(e, PlaybackEvent::Error { code, .. } if code == "source_unavailable")));
        assert!(h
            .emitter
            .queue_events()
            .iter()
            .any(|e| matches!(e, QueueEvent::TrackPlayed { track_id, .. } if track_id == "a")));

        let snap = h.session.snapshot();
        assert_eq!(snap.current_track.unwrap().id, "b");
        assert_eq!(snap.transport, Transport::Playing);
        assert_eq!(count_plays(&h.element.ops()), 2);
    }

    #[tokio::test]
    async fn consecutive_failures_across_the_whole_queue_stop_playback() {
        let h = harness();
        h.session
            .load_queue(tracks(&["a", "b"]), None)
            .await
            .unwrap();
        h.element
            .push_play_result(Err(MediaError::Source("404 a".to_string())));
        h.element
            .push_play_result(Err(MediaError::Source("404 b".to_string())));

        h.session.play().await.unwrap();
        settle().await;
        settle().await;

        assert_eq!(h.session.snapshot().transport, Transport::Stopped);
        assert_eq!(count_plays(&h.element.ops()), 2);
    }

    // ─────────────────────────────────────────────────────────────────────
    // Live gate flows
    // ─────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn open_live_with_disabled_gate_goes_straight_to_live() {
        let mut config = Config::default();
        config.live_stream_url = Some(LIVE_URL.to_string());
        config.gate.enabled = false;
        let h = harness_with(config, Arc::new(NoopInsertInventory));

        h.session.open_live(None).await.unwrap();
        settle().await;

        let snap = h.session.snapshot();
        assert_eq!(snap.mode, Mode::GatedLive);
        assert_eq!(snap.gate_state, GateState::Live);
        assert_eq!(snap.live_url.as_deref(), Some(LIVE_URL));
        assert_eq!(h.element.source().as_deref(), Some(LIVE_URL));
        assert!(h
            .emitter
            .playback_events()
            .iter()
            .any(|e| matches!(e, PlaybackEvent::LiveStarted { url, .. } if url == LIVE_URL)));
        assert_eq!(count_plays(&h.element.ops()), 1);
    }

    #[tokio::test]
    async fn open_live_without_scheduled_insert_goes_live() {
        let h = harness();
        h.session.open_live(None).await.unwrap();
        settle().await;

        let snap = h.session.snapshot();
        assert_eq!(snap.gate_state, GateState::Live);
        assert!(snap.active_insert.is_none());
        assert_eq!(h.element.source().as_deref(), Some(LIVE_URL));
    }

    #[tokio::test]
    async fn inventory_failure_degrades_to_live() {
        let mut config = Config::default();
        config.live_stream_url = Some(LIVE_URL.to_string());
        let h = harness_with(config, Arc::new(FailingInventory));

        h.session.open_live(None).await.unwrap();
        settle().await;

        let snap = h.session.snapshot();
        assert_eq!(snap.gate_state, GateState::Live);
        assert_eq!(h.element.source().as_deref(), Some(LIVE_URL));
        assert_eq!(count_plays(&h.element.ops()), 1);
    }

    #[tokio::test]
    async fn open_live_without_any_url_is_a_configuration_error() {
        let h = harness_with(Config::default(), Arc::new(NoopInsertInventory));
        let err = h.session.open_live(None).await.unwrap_err();
        assert_eq!(err.code(), "configuration_error");
    }

    #[tokio::test]
    async fn scheduled_insert_plays_before_live() {
        let h = insert_harness(insert("promo-1", None));
        h.session.open_live(None).await.unwrap();
        settle().await;

        let snap = h.session.snapshot();
        assert_eq!(snap.gate_state, GateState::InsertPlaying);
        assert_eq!(snap.active_insert.as_ref().unwrap().id, "promo-1");
        assert_eq!(
            h.element.source().as_deref(),
            Some("https://ads.example/promo-1.mp3")
        );
        assert!(h.emitter.playback_events().iter().any(|e| matches!(
            e,
            PlaybackEvent::InsertStarted { insert, skippable_after_secs, .. }
                if insert.id == "promo-1" && *skippable_after_secs == 5.0
        )));

        h.element.emit_time_update(20.0);
        h.element.emit_ended();
        settle().await;

        let events = h.sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].subject, ListenSubject::Insert);
        assert!(events[0].completed);

        let snap = h.session.snapshot();
        assert_eq!(snap.gate_state, GateState::Live);
        assert!(snap.active_insert.is_none());
        assert_eq!(h.element.source().as_deref(), Some(LIVE_URL));
        assert!(h
            .emitter
            .playback_events()
            .iter()
            .any(|e| matches!(
                e,
                PlaybackEvent::InsertFinished { reason: InsertOutcome::Completed, .. }
            )));
        assert_eq!(count_plays(&h.element.ops()), 2);
    }

    #[tokio::test]
    async fn skip_is_ignored_below_threshold_and_applies_at_it() {
        let h = insert_harness(insert("promo-1", None));
        h.session.open_live(None).await.unwrap();
        settle().await;

        h.element.emit_time_update(4.0);
        h.session.skip_insert().await.unwrap();
        settle().await;
        assert_eq!(h.session.snapshot().gate_state, GateState::InsertPlaying);
        assert!(h.sink.events().is_empty());

        h.element.emit_time_update(5.0);
        settle().await;
        assert!(h.session.snapshot().insert_skippable);
        let announced = h
            .emitter
            .playback_events()
            .iter()
            .filter(|e| matches!(e, PlaybackEvent::InsertSkippable { .. }))
            .count();
        assert_eq!(announced, 1);

        // The announcement is one-shot.
        h.element.emit_time_update(5.5);
        settle().await;
        let announced = h
            .emitter
            .playback_events()
            .iter()
            .filter(|e| matches!(e, PlaybackEvent::InsertSkippable { .. }))
            .count();
        assert_eq!(announced, 1);

        h.session.skip_insert().await.unwrap();
        settle().await;

        let events = h.sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].subject, ListenSubject::Insert);
        assert!(!events[0].completed);
        assert_eq!(events[0].elapsed_secs, 5.5);

        let snap = h.session.snapshot();
        assert_eq!(snap.gate_state, GateState::Live);
        assert_eq!(h.element.source().as_deref(), Some(LIVE_URL));
        assert!(h
            .emitter
            .playback_events()
            .iter()
            .any(|e| matches!(
                e,
                PlaybackEvent::InsertFinished { reason: InsertOutcome::Skipped, .. }
            )));
    }

    #[tokio::test]
    async fn insert_respects_its_own_skip_threshold() {
        let h = insert_harness(insert("promo-1", Some(8.0)));
        h.session.open_live(None).await.unwrap();
        settle().await;

        assert!(h.emitter.playback_events().iter().any(|e| matches!(
            e,
            PlaybackEvent::InsertStarted { skippable_after_secs, .. } if *skippable_after_secs == 8.0
        )));

        h.element.emit_time_update(5.0);
        h.session.skip_insert().await.unwrap();
        assert_eq!(h.session.snapshot().gate_state, GateState::InsertPlaying);

        h.element.emit_time_update(8.0);
        h.session.skip_insert().await.unwrap();
        settle().await;
        assert_eq!(h.session.snapshot().gate_state, GateState::Live);
    }

    #[tokio::test]
    async fn element_error_during_insert_fails_it_to_live() {
        let h = insert_harness(insert("promo-1", None));
        h.session.open_live(None).await.unwrap();
        settle().await;

        h.element.emit_time_update(2.0);
        h.element.emit_error("decode failed");
        settle().await;

        let events = h.sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].subject, ListenSubject::Insert);
        assert!(!events[0].completed);

        let snap = h.session.snapshot();
        assert_eq!(snap.gate_state, GateState::Live);
        assert_eq!(h.element.source().as_deref(), Some(LIVE_URL));
        assert!(h
            .emitter
            .playback_events()
            .iter()
            .any(|e| matches!(
                e,
                PlaybackEvent::InsertFinished { reason: InsertOutcome::Failed, .. }
            )));
    }

    #[tokio::test]
    async fn stale_inventory_result_cannot_resurrect_a_replaced_cycle() {
        let release = Arc::new(Notify::new());
        let mut config = Config::default();
        config.live_stream_url = Some(LIVE_URL.to_string());
        let h = harness_with(
            config,
            Arc::new(GatedInventory {
                release: release.clone(),
                insert: insert("promo-1", None),
            }),
        );

        h.session.open_live(None).await.unwrap();
        // The user changes their mind before the lookup resolves.
        h.session.load_queue(tracks(&["a"]), None).await.unwrap();

        release.notify_one();
        settle().await;

        let snap = h.session.snapshot();
        assert_eq!(snap.mode, Mode::Queue);
        assert_eq!(snap.gate_state, GateState::Closed);
        assert!(snap.active_insert.is_none());
        assert_eq!(h.element.source(), Some(src("a")));
        assert!(!h
            .emitter
            .playback_events()
            .iter()
            .any(|e| matches!(e, PlaybackEvent::InsertStarted { .. })));
    }

    #[tokio::test]
    async fn navigation_during_live_is_rejected() {
        let h = harness();
        h.session.load_queue(tracks(&["a", "b"]), None).await.unwrap();
        h.session.open_live(None).await.unwrap();
        settle().await;

        let err = h.session.next().await.unwrap_err();
        assert_eq!(err.code(), "invalid_request");
    }

    // ─────────────────────────────────────────────────────────────────────
    // Seek, volume, mute
    // ─────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn seek_applies_in_queue_mode_only() {
        let h = harness();
        h.session.load_queue(tracks(&["a"]), None).await.unwrap();
        h.session.seek(30.0).await.unwrap();
        assert!(h.element.ops().contains(&ElementOp::Seek(30.0)));
        assert_eq!(h.session.snapshot().position_secs, 30.0);

        h.session.open_live(None).await.unwrap();
        settle().await;
        h.session.seek(10.0).await.unwrap();
        assert!(!h.element.ops().contains(&ElementOp::Seek(10.0)));
    }

    #[tokio::test]
    async fn seek_rejects_invalid_positions() {
        let h = harness();
        h.session.load_queue(tracks(&["a"]), None).await.unwrap();
        assert_eq!(
            h.session.seek(-1.0).await.unwrap_err().code(),
            "invalid_request"
        );
        assert_eq!(
            h.session.seek(f64::NAN).await.unwrap_err().code(),
            "invalid_request"
        );
    }

    #[tokio::test]
    async fn mute_preserves_and_restores_the_volume() {
        let h = harness();
        h.session.set_volume(0.7).await.unwrap();
        h.session.set_muted(true).await.unwrap();

        let snap = h.session.snapshot();
        assert!(snap.muted);
        assert_eq!(snap.volume, 0.7);

        // Idempotent: muting again touches nothing.
        h.session.set_muted(true).await.unwrap();
        let volume_ops: Vec<_> = h
            .element
            .ops()
            .into_iter()
            .filter(|op| matches!(op, ElementOp::SetVolume(_)))
            .collect();
        assert_eq!(
            volume_ops,
            vec![ElementOp::SetVolume(0.7), ElementOp::SetVolume(0.0)]
        );

        h.session.set_muted(false).await.unwrap();
        let snap = h.session.snapshot();
        assert!(!snap.muted);
        assert_eq!(snap.volume, 0.7);
        assert!(h.element.ops().contains(&ElementOp::SetVolume(0.7)));
        assert_eq!(h.element.volume(), 0.7);
    }

    #[tokio::test]
    async fn setting_volume_while_muted_unmutes() {
        let h = harness();
        h.session.set_volume(0.5).await.unwrap();
        h.session.set_muted(true).await.unwrap();
        h.session.set_volume(0.9).await.unwrap();

        let snap = h.session.snapshot();
        assert!(!snap.muted);
        assert_eq!(snap.volume, 0.9);
        assert_eq!(h.element.volume(), 0.9);
    }

    #[tokio::test]
    async fn volume_changes_are_published() {
        let h = harness();
        h.session.set_volume(0.5).await.unwrap();
        h.session.set_volume(0.5).await.unwrap(); // no-op
        h.session.set_muted(true).await.unwrap();

        let changes: Vec<(f32, bool)> = h
            .emitter
            .playback_events()
            .iter()
            .filter_map(|e| match e {
                PlaybackEvent::VolumeChanged { volume, muted, .. } => Some((*volume, *muted)),
                _ => None,
            })
            .collect();
        assert_eq!(changes, vec![(0.5, false), (0.5, true)]);
    }

    // ─────────────────────────────────────────────────────────────────────
    // Flags and disposal
    // ─────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn flag_changes_publish_queue_events_once() {
        let h = harness();
        h.session.set_shuffle(true).await.unwrap();
        h.session.set_shuffle(true).await.unwrap();
        h.session.set_repeat_one(true).await.unwrap();

        let events = h.emitter.queue_events();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], QueueEvent::ShuffleChanged { shuffle: true, .. }));
        assert!(matches!(
            events[1],
            QueueEvent::RepeatOneChanged { repeat_one: true, .. }
        ));

        let snap = h.session.snapshot();
        assert!(snap.shuffle);
        assert!(snap.repeat_one);
    }

    #[tokio::test]
    async fn dispose_flushes_partial_listen_and_is_idempotent() {
        let h = harness();
        h.session.load_queue(tracks(&["a"]), None).await.unwrap();
        h.session.play().await.unwrap();
        settle().await;
        h.element.emit_time_update(42.0);

        h.session.dispose().await.unwrap();
        settle().await;

        let events = h.sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].subject_id.as_deref(), Some("a"));
        assert!(!events[0].completed);
        assert_eq!(events[0].elapsed_secs, 42.0);

        assert!(h.element.ops().contains(&ElementOp::Pause));
        assert!(h
            .emitter
            .playback_events()
            .iter()
            .any(|e| matches!(e, PlaybackEvent::Disposed { .. })));

        // Safe to call again; later commands report the disposal.
        h.session.dispose().await.unwrap();
        assert!(h.session.is_disposed());
        assert_eq!(
            h.session.play().await.unwrap_err().code(),
            "session_disposed"
        );
    }

    #[tokio::test]
    async fn cancellation_token_tears_the_session_down() {
        let element = Arc::new(FakeMediaElement::new());
        let emitter = Arc::new(RecordingEventEmitter::new());
        let sink = Arc::new(RecordingTelemetrySink::new());
        let cancel_token = CancellationToken::new();
        let deps = SessionDeps {
            element: element.clone(),
            inventory: Arc::new(NoopInsertInventory),
            telemetry: TelemetryRecorder::new(sink.clone(), TokioSpawner::current()),
            emitter: emitter.clone(),
            player_state: Arc::new(PlayerState::default()),
            spawner: TokioSpawner::current(),
            cancel_token: cancel_token.clone(),
        };
        let session = PlaybackSession::spawn(&Config::default(), deps);
        session.load_queue(tracks(&["a"]), None).await.unwrap();

        cancel_token.cancel();
        settle().await;

        assert!(emitter
            .playback_events()
            .iter()
            .any(|e| matches!(e, PlaybackEvent::Disposed { .. })));
        assert_eq!(
            session.play().await.unwrap_err().code(),
            "session_disposed"
        );
    }
}
