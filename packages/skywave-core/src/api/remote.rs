//! Remote media element bridged over the station WebSocket.
//!
//! The playback engine drives an `<audio>` element living in the station UI.
//! [`RemoteElementHub`] implements [`MediaElement`] by forwarding operations
//! as [`ElementCommand`]s to the attached host connection and caching the
//! position/duration reports the host sends back, so the engine's synchronous
//! getters never touch the network.
//!
//! Exactly one host is attached at a time; a newer attachment supersedes the
//! old one (a page reload reattaches before the dead socket times out).
//! While no host is attached, fire-and-forget operations are dropped and
//! `play` fails with [`MediaError::Detached`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot};
use uuid::Uuid;

use crate::element::{MediaElement, MediaError, MediaEvent};

/// How long a `play` waits for the host to report its outcome.
const PLAY_ACK_TIMEOUT: Duration = Duration::from_secs(10);

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Commands sent to the element host, serialized camelCase for the UI.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ElementCommand {
    /// Assign a new source URI.
    SetSource { url: String },
    /// Begin fetching the assigned source.
    Load,
    /// Start playback and report the outcome as a `PLAY_RESULT` message.
    Play {
        #[serde(rename = "requestId")]
        request_id: u64,
    },
    /// Pause playback.
    Pause,
    /// Seek to a position in seconds.
    Seek {
        #[serde(rename = "positionSecs")]
        position_secs: f64,
    },
    /// Set the volume level.
    SetVolume { level: f32 },
}

struct ElementSink {
    attachment_id: String,
    tx: mpsc::UnboundedSender<ElementCommand>,
}

/// Server-side end of the remote media element.
///
/// The WebSocket layer calls [`attach`](Self::attach) when a host announces
/// itself, forwards its element events through
/// [`handle_event`](Self::handle_event), and reports play outcomes through
/// [`resolve_play`](Self::resolve_play).
pub struct RemoteElementHub {
    sink: RwLock<Option<ElementSink>>,
    /// In-flight `play` requests awaiting a host acknowledgment.
    pending_plays: DashMap<u64, oneshot::Sender<Result<(), MediaError>>>,
    next_request_id: AtomicU64,
    position: Mutex<f64>,
    duration: Mutex<Option<f64>>,
    volume: Mutex<f32>,
    events: broadcast::Sender<MediaEvent>,
}

impl RemoteElementHub {
    /// Creates a hub with no host attached.
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            sink: RwLock::new(None),
            pending_plays: DashMap::new(),
            next_request_id: AtomicU64::new(1),
            position: Mutex::new(0.0),
            duration: Mutex::new(None),
            volume: Mutex::new(1.0),
            events,
        }
    }

    /// Attaches a new host, superseding any previous one.
    ///
    /// Returns the attachment id (used to tear down on disconnect) and the
    /// receiver the connection drains commands from. Superseding closes the
    /// previous receiver, which ends the old connection's forwarding loop.
    pub fn attach(&self) -> (String, mpsc::UnboundedReceiver<ElementCommand>) {
        let attachment_id = Uuid::new_v4().to_string();
        let (tx, rx) = mpsc::unbounded_channel();
        let previous = self.sink.write().replace(ElementSink {
            attachment_id: attachment_id.clone(),
            tx,
        });
        if let Some(previous) = previous {
            log::info!(
                "[Element] host {} superseded by {}",
                previous.attachment_id,
                attachment_id
            );
            // Dropping a pending ack surfaces as Detached on the play side.
            self.pending_plays.clear();
        } else {
            log::info!("[Element] host attached: {}", attachment_id);
        }
        (attachment_id, rx)
    }

    /// Detaches the host with the given attachment id.
    ///
    /// A stale id (the host was already superseded) is ignored, so a slow
    /// disconnect cannot tear down a newer attachment.
    pub fn detach(&self, attachment_id: &str) {
        let removed = {
            let mut sink = self.sink.write();
            if sink
                .as_ref()
                .is_some_and(|s| s.attachment_id == attachment_id)
            {
                *sink = None;
                true
            } else {
                false
            }
        };
        if removed {
            self.pending_plays.clear();
            log::info!("[Element] host detached: {}", attachment_id);
        } else {
            log::debug!("[Element] stale detach ignored: {}", attachment_id);
        }
    }

    /// Returns whether a host is currently attached.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.sink.read().is_some()
    }

    /// Ingests an element event reported by the host.
    ///
    /// Updates the position/duration caches and republishes the event to
    /// subscribers (the playback engine).
    pub fn handle_event(&self, event: MediaEvent) {
        match &event {
            MediaEvent::CanPlay { duration_secs } => {
                if duration_secs.is_some() {
                    *self.duration.lock() = *duration_secs;
                }
            }
            MediaEvent::TimeUpdate { position_secs } => {
                *self.position.lock() = *position_secs;
            }
            MediaEvent::Ended | MediaEvent::Error { .. } => {}
        }
        let _ = self.events.send(event);
    }

    /// Completes an in-flight `play` with the host-reported outcome.
    pub fn resolve_play(&self, request_id: u64, result: Result<(), MediaError>) {
        match self.pending_plays.remove(&request_id) {
            Some((_, ack)) => {
                let _ = ack.send(result);
            }
            None => log::debug!("[Element] play result for unknown request {}", request_id),
        }
    }

    fn send(&self, command: ElementCommand) {
        let sink = self.sink.read();
        match sink.as_ref() {
            Some(host) => {
                if host.tx.send(command).is_err() {
                    log::debug!("[Element] host channel closed, dropping command");
                }
            }
            None => log::trace!("[Element] no host attached, dropping {:?}", command),
        }
    }
}

impl Default for RemoteElementHub {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaElement for RemoteElementHub {
    fn set_source(&self, url: &str) {
        // Assigning a source resets the host element's clock; mirror that
        // here so elapsed reads between assignment and the first timeUpdate
        // never report the previous content's position.
        *self.position.lock() = 0.0;
        *self.duration.lock() = None;
        self.send(ElementCommand::SetSource {
            url: url.to_string(),
        });
    }

    fn load(&self) {
        self.send(ElementCommand::Load);
    }

    async fn play(&self) -> Result<(), MediaError> {
        let tx = self.sink.read().as_ref().map(|s| s.tx.clone());
        let Some(tx) = tx else {
            return Err(MediaError::Detached);
        };

        let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        let (ack_tx, ack_rx) = oneshot::channel();
        self.pending_plays.insert(request_id, ack_tx);

        if tx.send(ElementCommand::Play { request_id }).is_err() {
            self.pending_plays.remove(&request_id);
            return Err(MediaError::Detached);
        }

        match tokio::time::timeout(PLAY_ACK_TIMEOUT, ack_rx).await {
            Ok(Ok(result)) => result,
            // Ack sender dropped: the host detached or was superseded.
            Ok(Err(_)) => Err(MediaError::Detached),
            Err(_) => {
                self.pending_plays.remove(&request_id);
                Err(MediaError::Source(
                    "play acknowledgment timed out".to_string(),
                ))
            }
        }
    }

    fn pause(&self) {
        self.send(ElementCommand::Pause);
    }

    fn position(&self) -> f64 {
        *self.position.lock()
    }

    fn seek(&self, position_secs: f64) {
        *self.position.lock() = position_secs;
        self.send(ElementCommand::Seek { position_secs });
    }

    fn duration(&self) -> Option<f64> {
        *self.duration.lock()
    }

    fn volume(&self) -> f32 {
        *self.volume.lock()
    }

    fn set_volume(&self, level: f32) {
        *self.volume.lock() = level;
        self.send(ElementCommand::SetVolume { level });
    }

    fn subscribe(&self) -> broadcast::Receiver<MediaEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[tokio::test]
    async fn commands_flow_to_the_attached_host() {
        let hub = RemoteElementHub::new();
        let (_id, mut rx) = hub.attach();

        hub.set_source("https://cdn.example/a.mp3");
        hub.load();
        hub.pause();
        hub.seek(12.0);
        hub.set_volume(0.4);

        assert!(matches!(
            rx.try_recv().unwrap(),
            ElementCommand::SetSource { url } if url == "https://cdn.example/a.mp3"
        ));
        assert!(matches!(rx.try_recv().unwrap(), ElementCommand::Load));
        assert!(matches!(rx.try_recv().unwrap(), ElementCommand::Pause));
        assert!(matches!(
            rx.try_recv().unwrap(),
            ElementCommand::Seek { position_secs } if position_secs == 12.0
        ));
        assert!(matches!(
            rx.try_recv().unwrap(),
            ElementCommand::SetVolume { level } if level == 0.4
        ));

        // Caches reflect the optimistic local state.
        assert_eq!(hub.position(), 12.0);
        assert_eq!(hub.volume(), 0.4);
    }

    #[tokio::test]
    async fn set_source_resets_position_and_duration() {
        let hub = RemoteElementHub::new();
        let (_id, _rx) = hub.attach();
        hub.handle_event(MediaEvent::CanPlay {
            duration_secs: Some(180.0),
        });
        hub.handle_event(MediaEvent::TimeUpdate { position_secs: 90.0 });

        hub.set_source("https://cdn.example/next.mp3");

        assert_eq!(hub.position(), 0.0);
        assert_eq!(hub.duration(), None);
    }

    #[tokio::test]
    async fn play_without_host_is_detached() {
        let hub = RemoteElementHub::new();
        assert!(matches!(hub.play().await, Err(MediaError::Detached)));
    }

    #[tokio::test]
    async fn play_resolves_through_the_host() {
        let hub = Arc::new(RemoteElementHub::new());
        let (_id, mut rx) = hub.attach();

        let worker = Arc::clone(&hub);
        let handle = tokio::spawn(async move { worker.play().await });

        let request_id = match rx.recv().await.unwrap() {
            ElementCommand::Play { request_id } => request_id,
            other => panic!("expected play command, got {:?}", other),
        };
        hub.resolve_play(request_id, Ok(()));

        assert!(handle.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn play_rejection_propagates() {
        let hub = Arc::new(RemoteElementHub::new());
        let (_id, mut rx) = hub.attach();

        let worker = Arc::clone(&hub);
        let handle = tokio::spawn(async move { worker.play().await });

        let request_id = match rx.recv().await.unwrap() {
            ElementCommand::Play { request_id } => request_id,
            other => panic!("expected play command, got {:?}", other),
        };
        hub.resolve_play(
            request_id,
            Err(MediaError::NotAllowed("gesture required".to_string())),
        );

        assert!(matches!(
            handle.await.unwrap(),
            Err(MediaError::NotAllowed(_))
        ));
    }

    #[tokio::test]
    async fn detach_fails_the_pending_play() {
        let hub = Arc::new(RemoteElementHub::new());
        let (id, mut rx) = hub.attach();

        let worker = Arc::clone(&hub);
        let handle = tokio::spawn(async move { worker.play().await });
        let _ = rx.recv().await.unwrap();

        hub.detach(&id);

        assert!(matches!(
            handle.await.unwrap(),
            Err(MediaError::Detached)
        ));
        assert!(!hub.is_attached());
    }

    #[tokio::test(start_paused = true)]
    async fn unanswered_play_times_out_as_source_failure() {
        let hub = Arc::new(RemoteElementHub::new());
        let (_id, mut rx) = hub.attach();

        let worker = Arc::clone(&hub);
        let handle = tokio::spawn(async move { worker.play().await });
        let _ = rx.recv().await.unwrap();

        // Nobody answers; the paused clock fast-forwards past the timeout.
        assert!(matches!(
            handle.await.unwrap(),
            Err(MediaError::Source(_))
        ));
    }

    #[tokio::test]
    async fn newer_attachment_supersedes_and_stale_detach_is_ignored() {
        let hub = RemoteElementHub::new();
        let (first_id, mut first_rx) = hub.attach();
        let (_second_id, mut second_rx) = hub.attach();

        // The first receiver is closed by the replacement.
        assert!(first_rx.recv().await.is_none());

        // A late disconnect of the first host must not detach the second.
        hub.detach(&first_id);
        assert!(hub.is_attached());

        hub.load();
        assert!(matches!(second_rx.try_recv().unwrap(), ElementCommand::Load));
    }

    #[tokio::test]
    async fn events_update_caches_and_reach_subscribers() {
        let hub = RemoteElementHub::new();
        let mut events = hub.subscribe();

        hub.handle_event(MediaEvent::CanPlay {
            duration_secs: Some(120.0),
        });
        hub.handle_event(MediaEvent::TimeUpdate { position_secs: 42.5 });

        assert_eq!(hub.duration(), Some(120.0));
        assert_eq!(hub.position(), 42.5);
        assert!(matches!(
            events.recv().await.unwrap(),
            MediaEvent::CanPlay { .. }
        ));
        assert!(matches!(
            events.recv().await.unwrap(),
            MediaEvent::TimeUpdate { position_secs } if position_secs == 42.5
        ));
    }

    #[test]
    fn element_command_wire_format_is_camel_case() {
        let json = serde_json::to_value(ElementCommand::Play { request_id: 7 }).unwrap();
        assert_eq!(json["type"], "play");
        assert_eq!(json["requestId"], 7);

        let json = serde_json::to_value(ElementCommand::Seek { position_secs: 3.5 }).unwrap();
        assert_eq!(json["type"], "seek");
        assert_eq!(json["positionSecs"], 3.5);

        let json = serde_json::to_value(ElementCommand::SetSource {
            url: "https://live.example/program.aac".to_string(),
        })
        .unwrap();
        assert_eq!(json["type"], "setSource");
        assert_eq!(json["url"], "https://live.example/program.aac");
    }
}
