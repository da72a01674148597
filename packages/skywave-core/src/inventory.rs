//! Promotional insert inventory client.
//!
//! The gate asks the inventory for the next insert to play ahead of the live
//! stream. Lookups are best-effort: any failure here degrades to live
//! playback, so errors carry enough detail to log but never block anything.

use async_trait::async_trait;
use reqwest::StatusCode;
use thiserror::Error;

use crate::gate::Insert;

/// Errors from the insert inventory.
#[derive(Debug, Error)]
pub enum InventoryError {
    /// Transport-level failure (connect, timeout, TLS).
    #[error("inventory request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The inventory answered with an unexpected status.
    #[error("inventory returned status {0}")]
    Status(u16),

    /// The inventory answered 200 with a body that is not an insert.
    #[error("failed to decode inventory response: {0}")]
    Decode(String),

    /// No inventory endpoint is configured.
    #[error("no inventory endpoint configured")]
    Unconfigured,
}

/// Convenient Result alias for inventory operations.
pub type InventoryResult<T> = Result<T, InventoryError>;

/// Source of promotional inserts.
#[async_trait]
pub trait InsertInventory: Send + Sync {
    /// Fetches the next insert to play, or `None` when nothing is scheduled.
    async fn fetch_insert(&self) -> InventoryResult<Option<Insert>>;
}

/// Inventory client backed by the station's HTTP inventory service.
///
/// `GET {base}/inserts/next`; 204 and 404 mean "nothing scheduled".
pub struct HttpInsertInventory {
    client: reqwest::Client,
    base_url: String,
}

impl HttpInsertInventory {
    /// Creates a client against the given base URL.
    ///
    /// The shared `reqwest::Client` should carry a request timeout; a hung
    /// inventory must not delay the live stream longer than that.
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    fn next_url(&self) -> String {
        format!("{}/inserts/next", self.base_url)
    }
}

#[async_trait]
impl InsertInventory for HttpInsertInventory {
    async fn fetch_insert(&self) -> InventoryResult<Option<Insert>> {
        let response = self.client.get(self.next_url()).send().await?;

        match response.status() {
            StatusCode::NO_CONTENT | StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let insert = response
                    .json::<Insert>()
                    .await
                    .map_err(|e| InventoryError::Decode(e.to_string()))?;
                log::debug!("[Inventory] next insert: {} ({})", insert.id, insert.title);
                Ok(Some(insert))
            }
            status => Err(InventoryError::Status(status.as_u16())),
        }
    }
}

/// Inventory for deployments without promotional inserts.
///
/// Always reports nothing scheduled, so the gate goes straight to live.
pub struct NoopInsertInventory;

#[async_trait]
impl InsertInventory for NoopInsertInventory {
    async fn fetch_insert(&self) -> InventoryResult<Option<Insert>> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_inventory_reports_nothing_scheduled() {
        let inventory = NoopInsertInventory;
        assert!(inventory.fetch_insert().await.unwrap().is_none());
    }

    #[test]
    fn base_url_is_normalized() {
        let client = reqwest::Client::new();
        let inventory = HttpInsertInventory::new(client, "https://ads.example/api/");
        assert_eq!(inventory.next_url(), "https://ads.example/api/inserts/next");
    }

    #[test]
    fn status_error_displays_code() {
        let err = InventoryError::Status(503);
        assert_eq!(err.to_string(), "inventory returned status 503");
    }
}
