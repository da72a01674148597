//! WebSocket connection registry.
//!
//! Tracks live station connections so shutdown can cancel them all, and
//! remembers which connection (if any) currently hosts the media element.
//! Registration hands back a [`ConnectionGuard`] that unregisters on drop,
//! so a connection that ends any way at all leaves no stale entry behind.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

struct ConnectionInfo {
    connected_at: Instant,
    hosts_element: bool,
}

/// Registry of live WebSocket connections.
pub struct WsConnectionManager {
    connections: DashMap<String, ConnectionInfo>,
    next_id: AtomicU64,
    /// Parent of every connection's cancel token. Replaced after each
    /// `close_all` so later connections get a fresh lease.
    global_cancel: RwLock<CancellationToken>,
}

impl WsConnectionManager {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            next_id: AtomicU64::new(1),
            global_cancel: RwLock::new(CancellationToken::new()),
        }
    }

    /// Registers a new connection and returns its guard.
    pub fn register(self: &Arc<Self>) -> ConnectionGuard {
        let id = format!("ws-{}", self.next_id.fetch_add(1, Ordering::Relaxed));
        let cancel_token = self.global_cancel.read().child_token();
        self.connections.insert(
            id.clone(),
            ConnectionInfo {
                connected_at: Instant::now(),
                hosts_element: false,
            },
        );
        log::debug!(
            "[WS] connection registered: {} ({} active)",
            id,
            self.connections.len()
        );
        ConnectionGuard {
            id,
            manager: Arc::clone(self),
            cancel_token,
        }
    }

    /// Records `id` as the element host; any previous host loses the flag.
    pub fn mark_element_host(&self, id: &str) {
        for mut entry in self.connections.iter_mut() {
            let hosts = entry.key().as_str() == id;
            entry.value_mut().hosts_element = hosts;
        }
        log::info!("[WS] element hosted by connection {}", id);
    }

    /// Clears the element-host flag if `id` still holds it.
    pub fn clear_element_host(&self, id: &str) {
        if let Some(mut entry) = self.connections.get_mut(id) {
            entry.hosts_element = false;
        }
    }

    /// Returns the id of the connection hosting the element, if any.
    #[must_use]
    pub fn element_host(&self) -> Option<String> {
        self.connections
            .iter()
            .find(|entry| entry.hosts_element)
            .map(|entry| entry.key().clone())
    }

    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Cancels every live connection. New registrations are unaffected.
    pub fn close_all(&self) {
        let count = self.connections.len();
        if count > 0 {
            log::info!("[WS] closing {} active connections", count);
        }
        let mut cancel = self.global_cancel.write();
        cancel.cancel();
        *cancel = CancellationToken::new();
    }

    fn unregister(&self, id: &str) {
        if let Some((_, info)) = self.connections.remove(id) {
            log::debug!(
                "[WS] connection closed: {} after {:?} ({} remaining)",
                id,
                info.connected_at.elapsed(),
                self.connections.len()
            );
        }
    }
}

impl Default for WsConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Removes its connection from the registry when dropped.
pub struct ConnectionGuard {
    id: String,
    manager: Arc<WsConnectionManager>,
    cancel_token: CancellationToken,
}

impl ConnectionGuard {
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Token cancelled when the server closes all connections.
    #[must_use]
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel_token
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.manager.unregister(&self.id);
    }
}
