//! WebSocket handler for station clients and the element host.
//!
//! Every connection receives the current session snapshot on connect and a
//! feed of broadcast events after it. A connection that sends
//! `ATTACH_ELEMENT` additionally becomes the media element host: it receives
//! `ELEMENT_COMMAND` frames to apply to its `<audio>` element and reports
//! back with `ELEMENT_EVENT` and `PLAY_RESULT` frames.

use axum::extract::connect_info::ConnectInfo;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::sink::SinkExt;
use futures::stream::StreamExt;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::api::remote::{ElementCommand, RemoteElementHub};
use crate::api::ws_connection::WsConnectionManager;
use crate::api::AppState;
use crate::element::{MediaError, MediaEvent};
use crate::events::BroadcastEvent;

// ─────────────────────────────────────────────────────────────────────────────
// Element Attachment (RAII cleanup)
// ─────────────────────────────────────────────────────────────────────────────

/// Ties a host attachment to its connection.
///
/// Dropping the guard detaches the hub and clears the host flag, so the
/// element never stays bound to a connection that has gone away. A stale
/// detach (this host was already superseded) is ignored by the hub.
struct ElementAttachment {
    attachment_id: String,
    connection_id: String,
    hub: Arc<RemoteElementHub>,
    manager: Arc<WsConnectionManager>,
    commands: tokio::sync::mpsc::UnboundedReceiver<ElementCommand>,
}

impl Drop for ElementAttachment {
    fn drop(&mut self) {
        self.hub.detach(&self.attachment_id);
        self.manager.clear_element_host(&self.connection_id);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// WebSocket Message Types
// ─────────────────────────────────────────────────────────────────────────────

/// Incoming WebSocket message envelope.
#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
enum WsIncoming {
    /// This connection volunteers to host the media element.
    AttachElement,
    /// Element lifecycle event from the host.
    ElementEvent { payload: MediaEvent },
    /// Outcome of a previously forwarded play command.
    PlayResult { payload: PlayResultPayload },
    Heartbeat,
}

/// Host-reported outcome of a play command.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlayResultPayload {
    request_id: u64,
    ok: bool,
    /// DOMException name when the play promise rejected.
    #[serde(default)]
    error_name: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl PlayResultPayload {
    /// Maps the host report onto the element error model.
    ///
    /// `NotAllowedError` is the autoplay-policy rejection; everything else
    /// the host can raise means the source is unusable.
    fn into_outcome(self) -> Result<(), MediaError> {
        if self.ok {
            return Ok(());
        }
        let message = self
            .message
            .unwrap_or_else(|| "playback refused by host".to_string());
        match self.error_name.as_deref() {
            Some("NotAllowedError") => Err(MediaError::NotAllowed(message)),
            _ => Err(MediaError::Source(message)),
        }
    }
}

/// Outgoing WebSocket messages.
#[derive(Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
enum WsOutgoing {
    InitialState {
        payload: serde_json::Value,
    },
    Event {
        payload: BroadcastEvent,
    },
    ElementAttached {
        payload: ElementAttachedPayload,
    },
    /// Media operation for the host to apply to its element.
    ElementCommand {
        payload: ElementCommand,
    },
    HeartbeatAck,
}

/// Attachment acknowledgment payload.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ElementAttachedPayload {
    attachment_id: String,
}

impl WsOutgoing {
    /// Serializes the message to a WebSocket text message.
    fn to_message(&self) -> Option<Message> {
        serde_json::to_string(self)
            .ok()
            .map(|s| Message::Text(s.into()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// WebSocket Connection Handler
// ─────────────────────────────────────────────────────────────────────────────

/// Builds the initial state message for WebSocket clients.
///
/// The session snapshot plus whether an element host is already attached,
/// so a newly connecting UI knows whether to volunteer.
fn build_initial_state(state: &AppState) -> Option<Message> {
    let mut payload = state.player_state.to_json();
    if let serde_json::Value::Object(ref mut map) = payload {
        map.insert(
            "elementAttached".to_string(),
            serde_json::Value::Bool(state.element_hub.is_attached()),
        );
    }
    WsOutgoing::InitialState { payload }.to_message()
}

/// WebSocket upgrade handler.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(remote_addr): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, state, remote_addr))
}

/// Main WebSocket connection handler.
async fn handle_ws(socket: WebSocket, state: AppState, remote_addr: SocketAddr) {
    let (mut sender, mut receiver) = socket.split();
    let mut attachment: Option<ElementAttachment> = None;
    let mut broadcast_rx = state.broadcast_tx.subscribe();
    let mut last_activity = Instant::now();

    // Register connection for tracking and force-close capability
    let conn_guard = state.ws_manager.register();
    let cancel_token = conn_guard.cancel_token().clone();

    log::info!(
        "[WS] New connection established: {} from {}",
        conn_guard.id(),
        remote_addr
    );

    // Send the snapshot immediately so the client renders without waiting
    // for the first event.
    if let Some(msg) = build_initial_state(&state) {
        if sender.send(msg).await.is_err() {
            log::warn!("[WS] Failed to send initial state, client disconnected");
            return;
        }
    }

    let heartbeat_timeout = Duration::from_secs(state.config.ws_heartbeat_timeout_secs);
    // Interval in Delay mode skips missed ticks rather than bursting to
    // catch up.
    let mut heartbeat_interval = tokio::time::interval(Duration::from_secs(
        state.config.ws_heartbeat_check_interval_secs,
    ));
    heartbeat_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            // Handle force-close request
            _ = cancel_token.cancelled() => {
                log::info!("[WS] Connection force-closed: {}", conn_guard.id());
                break;
            }
            // Handle incoming messages from the client
            msg = receiver.next() => {
                last_activity = Instant::now();
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<WsIncoming>(&text) {
                            Ok(WsIncoming::AttachElement) => {
                                // Release any attachment this connection
                                // already holds before taking a fresh one.
                                attachment = None;
                                let (attachment_id, commands) = state.element_hub.attach();
                                state.ws_manager.mark_element_host(conn_guard.id());
                                let ack = WsOutgoing::ElementAttached {
                                    payload: ElementAttachedPayload {
                                        attachment_id: attachment_id.clone(),
                                    },
                                };
                                attachment = Some(ElementAttachment {
                                    attachment_id,
                                    connection_id: conn_guard.id().to_string(),
                                    hub: Arc::clone(&state.element_hub),
                                    manager: Arc::clone(&state.ws_manager),
                                    commands,
                                });
                                if let Some(msg) = ack.to_message() {
                                    let _ = sender.send(msg).await;
                                }
                            }
                            Ok(WsIncoming::ElementEvent { payload }) => {
                                state.element_hub.handle_event(payload);
                            }
                            Ok(WsIncoming::PlayResult { payload }) => {
                                state
                                    .element_hub
                                    .resolve_play(payload.request_id, payload.into_outcome());
                            }
                            Ok(WsIncoming::Heartbeat) => {
                                if let Some(msg) = WsOutgoing::HeartbeatAck.to_message() {
                                    let _ = sender.send(msg).await;
                                }
                            }
                            Err(_) => {} // Unknown message type, ignore
                        }
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    _ => {}
                }
            }
            // Forward element commands while this connection hosts the element
            command = async {
                match attachment.as_mut() {
                    Some(att) => att.commands.recv().await,
                    None => std::future::pending().await,
                }
            } => {
                match command {
                    Some(command) => {
                        let frame = WsOutgoing::ElementCommand { payload: command };
                        if let Some(msg) = frame.to_message() {
                            if sender.send(msg).await.is_err() {
                                break;
                            }
                        }
                    }
                    None => {
                        // A newer host took over; stop forwarding.
                        log::info!(
                            "[WS] {}: element host superseded",
                            conn_guard.id()
                        );
                        attachment = None;
                    }
                }
            }
            // Fan out broadcast events
            Ok(event) = broadcast_rx.recv() => {
                let frame = WsOutgoing::Event { payload: event };
                if let Some(msg) = frame.to_message() {
                    if sender.send(msg).await.is_err() {
                        break;
                    }
                }
            }
            // Heartbeat timeout check
            _ = heartbeat_interval.tick() => {
                if last_activity.elapsed() > heartbeat_timeout {
                    log::warn!("[WS] Heartbeat timeout: {}", conn_guard.id());
                    break;
                }
            }
        }
    }

    // ElementAttachment and ConnectionGuard Drop impls handle cleanup
}
