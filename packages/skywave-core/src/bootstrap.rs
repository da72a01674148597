//! Application bootstrap and dependency wiring.
//!
//! This module contains the composition root - the single place where all
//! services are instantiated and wired together. This pattern provides:
//!
//! - **Clarity**: All dependency relationships are visible in one place
//! - **Testability**: Easy to swap implementations for testing
//! - **Maintainability**: Service creation logic is isolated from usage

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::api::{RemoteElementHub, WsConnectionManager};
use crate::element::MediaElement;
use crate::error::{PlayerError, PlayerResult};
use crate::events::{BroadcastEvent, BroadcastEventBridge, EventEmitter};
use crate::inventory::{HttpInsertInventory, InsertInventory, NoopInsertInventory};
use crate::runtime::TokioSpawner;
use crate::session::{PlaybackSession, SessionDeps};
use crate::state::{Config, PlayerState};
use crate::telemetry::{HttpTelemetrySink, NoopTelemetrySink, TelemetryRecorder, TelemetrySink};

/// Timeout for outbound HTTP requests (inventory lookups, telemetry).
const HTTP_TIMEOUT_SECS: u64 = 10;

/// Container for all bootstrapped services.
///
/// This struct holds all the wired services created during bootstrap.
/// It's consumed by `AppState` to build the final application state.
#[derive(Clone)]
pub struct BootstrappedServices {
    /// Handle to the playback session.
    pub session: PlaybackSession,
    /// Shared session snapshot.
    pub player_state: Arc<PlayerState>,
    /// Broadcast channel sender for real-time events.
    pub broadcast_tx: broadcast::Sender<BroadcastEvent>,
    /// Event bridge for emitting events to WebSocket and SSE consumers.
    pub event_bridge: Arc<BroadcastEventBridge>,
    /// Server-side end of the remote media element.
    pub element_hub: Arc<RemoteElementHub>,
    /// Manages WebSocket connections.
    pub ws_manager: Arc<WsConnectionManager>,
    /// Shared HTTP client for connection pooling.
    http_client: Client,
    /// Task spawner for background operations.
    pub spawner: TokioSpawner,
    /// Cancellation token for graceful shutdown.
    pub cancel_token: CancellationToken,
}

impl BootstrappedServices {
    /// Returns the shared HTTP client.
    pub fn http_client(&self) -> &Client {
        &self.http_client
    }

    /// Initiates graceful shutdown of all services.
    pub async fn shutdown(&self) {
        log::info!("[Bootstrap] Beginning graceful shutdown...");

        // Dispose while connections are still up so the final events
        // (partial listen flush, Disposed) reach subscribed clients.
        if let Err(e) = self.session.dispose().await {
            log::warn!("[Bootstrap] Session dispose failed: {}", e);
        }

        // Signal cancellation to all background tasks
        self.cancel_token.cancel();

        self.ws_manager.close_all();

        log::info!("[Bootstrap] Shutdown complete");
    }
}

/// Creates the shared HTTP client for inventory and telemetry calls.
///
/// Using a shared client enables connection pooling for better performance.
/// This is created once during bootstrap and injected into services that need it.
fn create_http_client() -> Client {
    Client::builder()
        .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
        .build()
        .expect("Failed to create HTTP client")
}

/// Bootstraps all application services with their dependencies.
///
/// This is the composition root where all services are instantiated and
/// wired together. The wiring order matters - services are created in
/// dependency order:
///
/// 1. Shared infrastructure (HTTP client, broadcast channel, cancellation token)
/// 2. Shared state (player state, connection manager, element hub)
/// 3. Inventory and telemetry (HTTP-backed when configured, no-op otherwise)
/// 4. The playback session (depends on all of the above)
///
/// Must be called from within a Tokio runtime.
///
/// # Errors
///
/// Returns `PlayerError::Configuration` when the configuration is invalid.
pub fn bootstrap_services(config: &Config) -> PlayerResult<BootstrappedServices> {
    // Reject nonsense thresholds before wiring anything
    config.validate().map_err(PlayerError::Configuration)?;

    // Create task spawner from current runtime
    let spawner = TokioSpawner::current();

    // Create shared HTTP client for connection pooling
    let http_client = create_http_client();

    // Create broadcast channel for real-time events to WebSocket clients
    let (broadcast_tx, _) = broadcast::channel::<BroadcastEvent>(config.event_channel_capacity);

    // Create the event bridge that maps domain events to broadcast transport
    let event_bridge = Arc::new(BroadcastEventBridge::with_sender(broadcast_tx.clone()));

    // Create cancellation token for graceful shutdown
    let cancel_token = CancellationToken::new();

    // Shared mutable state
    let player_state = Arc::new(PlayerState::default());
    let ws_manager = Arc::new(WsConnectionManager::new());

    // The element hub doubles as the session's media element; the WebSocket
    // layer binds a host to it at runtime.
    let element_hub = Arc::new(RemoteElementHub::new());

    // Insert inventory: without a configured base URL every live open goes
    // straight to the live program.
    let inventory: Arc<dyn InsertInventory> = match &config.inventory_base_url {
        Some(base_url) => Arc::new(HttpInsertInventory::new(
            http_client.clone(),
            base_url.clone(),
        )),
        None => Arc::new(NoopInsertInventory),
    };

    // Telemetry sink: without a configured endpoint listen events are dropped
    let sink: Arc<dyn TelemetrySink> = match &config.telemetry_endpoint {
        Some(endpoint) => Arc::new(HttpTelemetrySink::new(
            http_client.clone(),
            endpoint.clone(),
        )),
        None => Arc::new(NoopTelemetrySink),
    };
    let telemetry = TelemetryRecorder::new(sink, spawner.clone());

    // Wire up the playback session with its dependencies
    let deps = SessionDeps {
        element: Arc::clone(&element_hub) as Arc<dyn MediaElement>,
        inventory,
        telemetry,
        emitter: Arc::clone(&event_bridge) as Arc<dyn EventEmitter>,
        player_state: Arc::clone(&player_state),
        spawner: spawner.clone(),
        cancel_token: cancel_token.clone(),
    };
    let session = PlaybackSession::spawn(config, deps);

    Ok(BootstrappedServices {
        session,
        player_state,
        broadcast_tx,
        event_bridge,
        element_hub,
        ws_manager,
        http_client,
        spawner,
        cancel_token,
    })
}
