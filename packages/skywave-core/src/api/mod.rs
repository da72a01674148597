//! HTTP/WebSocket API layer.
//!
//! This module contains thin handlers that delegate to the playback session.
//! It provides the router construction and server startup functionality.

use std::sync::Arc;

use axum::http::{header, HeaderValue, Method};
use thiserror::Error;
use tokio::sync::broadcast;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::events::BroadcastEvent;
use crate::session::PlaybackSession;
use crate::state::{Config, PlayerState};

pub mod http;
pub mod remote;
pub mod response;
pub mod ws;
pub mod ws_connection;

pub use remote::{ElementCommand, RemoteElementHub};
pub use ws_connection::WsConnectionManager;

/// Errors that can occur when starting or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind to a TCP port.
    #[error("Failed to bind to port: {0}")]
    Bind(#[from] std::io::Error),

    /// No available ports in the specified range.
    #[error("No available ports in range {start}-{end}")]
    NoAvailablePort { start: u16, end: u16 },
}

/// Shared application state for the API layer.
///
/// This is a thin wrapper that holds references to services.
/// All playback logic lives behind the session handle.
#[derive(Clone)]
pub struct AppState {
    /// Handle to the playback session.
    pub session: PlaybackSession,
    /// Shared session snapshot.
    pub player_state: Arc<PlayerState>,
    /// Broadcast channel sender for real-time events.
    pub broadcast_tx: broadcast::Sender<BroadcastEvent>,
    /// Server-side end of the remote media element.
    pub element_hub: Arc<RemoteElementHub>,
    /// Manages WebSocket connections.
    pub ws_manager: Arc<WsConnectionManager>,
    /// Application configuration.
    pub config: Arc<Config>,
}

/// Builder for constructing an `AppState`.
#[derive(Default)]
pub struct AppStateBuilder {
    session: Option<PlaybackSession>,
    player_state: Option<Arc<PlayerState>>,
    broadcast_tx: Option<broadcast::Sender<BroadcastEvent>>,
    element_hub: Option<Arc<RemoteElementHub>>,
    ws_manager: Option<Arc<WsConnectionManager>>,
    config: Option<Arc<Config>>,
}

impl AppStateBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the playback session handle.
    pub fn session(mut self, session: PlaybackSession) -> Self {
        self.session = Some(session);
        self
    }

    /// Sets the shared session snapshot.
    pub fn player_state(mut self, state: Arc<PlayerState>) -> Self {
        self.player_state = Some(state);
        self
    }

    /// Sets the broadcast sender.
    pub fn broadcast_tx(mut self, tx: broadcast::Sender<BroadcastEvent>) -> Self {
        self.broadcast_tx = Some(tx);
        self
    }

    /// Sets the remote element hub.
    pub fn element_hub(mut self, hub: Arc<RemoteElementHub>) -> Self {
        self.element_hub = Some(hub);
        self
    }

    /// Sets the WebSocket connection manager.
    pub fn ws_manager(mut self, manager: Arc<WsConnectionManager>) -> Self {
        self.ws_manager = Some(manager);
        self
    }

    /// Sets the configuration.
    pub fn config(mut self, config: Arc<Config>) -> Self {
        self.config = Some(config);
        self
    }

    /// Builds the `AppState`, panicking if required fields are missing.
    pub fn build(self) -> AppState {
        AppState {
            session: self.session.expect("session is required"),
            player_state: self.player_state.expect("player_state is required"),
            broadcast_tx: self.broadcast_tx.expect("broadcast_tx is required"),
            element_hub: self.element_hub.expect("element_hub is required"),
            ws_manager: self.ws_manager.expect("ws_manager is required"),
            config: self.config.expect("config is required"),
        }
    }
}

impl AppState {
    /// Creates a new builder for constructing an `AppState`.
    pub fn builder() -> AppStateBuilder {
        AppStateBuilder::new()
    }
}

async fn find_available_port(
    start: u16,
    end: u16,
) -> Result<(u16, tokio::net::TcpListener), ServerError> {
    for port in start..=end {
        let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
        match tokio::net::TcpListener::bind(&addr).await {
            Ok(listener) => return Ok((port, listener)),
            Err(_) => continue,
        }
    }
    Err(ServerError::NoAvailablePort { start, end })
}

/// Starts the HTTP server on the configured or auto-discovered port.
pub async fn start_server(state: AppState) -> Result<(), ServerError> {
    let preferred_port = state.config.preferred_port;
    let (port, listener) = if preferred_port > 0 {
        let addr = std::net::SocketAddr::from(([0, 0, 0, 0], preferred_port));
        (preferred_port, tokio::net::TcpListener::bind(&addr).await?)
    } else {
        find_available_port(47800, 47810).await?
    };

    let trusted_origins = state.config.trusted_origins.clone();
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(move |origin: &HeaderValue, _| {
            let origin_str = origin.to_str().unwrap_or("");
            // Check against configured trusted origins (includes localhost by default)
            trusted_origins
                .iter()
                .any(|allowed| origin_str.starts_with(allowed))
        }))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(false);

    log::info!("Server listening on http://0.0.0.0:{}", port);
    let app = http::create_router(state).layer(cors);

    // Use into_make_service_with_connect_info to enable ConnectInfo<SocketAddr> extraction
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await?;
    Ok(())
}
