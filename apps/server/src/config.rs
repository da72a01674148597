//! Server configuration.
//!
//! Supports loading from YAML files with environment variable overrides.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use skywave_core::{GatePolicy, QueuePolicy};

/// Server configuration loaded from YAML with environment overrides.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Port to bind the HTTP server to.
    /// Override: `SKYWAVE_BIND_PORT`
    pub bind_port: u16,

    /// Origins allowed to call the API (prefix match).
    pub trusted_origins: Vec<String>,

    /// URL of the station's live program stream.
    /// Override: `SKYWAVE_LIVE_URL`
    pub live_stream_url: Option<String>,

    /// Base URL of the insert inventory service. Without one, opening the
    /// live stream never plays an insert first.
    /// Override: `SKYWAVE_INVENTORY_URL`
    pub inventory_base_url: Option<String>,

    /// Endpoint listen telemetry is posted to. Without one, listen events
    /// are dropped.
    /// Override: `SKYWAVE_TELEMETRY_URL`
    pub telemetry_endpoint: Option<String>,

    /// Queue behavior (keys are camelCase, matching the API wire format).
    pub queue: QueuePolicy,

    /// Insert gate behavior (keys are camelCase, matching the API wire
    /// format).
    pub gate: GatePolicy,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_port: 47800,
            trusted_origins: vec![
                "http://localhost".to_string(),
                "http://127.0.0.1".to_string(),
            ],
            live_stream_url: None,
            inventory_base_url: None,
            telemetry_endpoint: None,
            queue: QueuePolicy::default(),
            gate: GatePolicy::default(),
        }
    }
}

impl ServerConfig {
    /// Loads configuration from a YAML file, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Applies environment variable overrides to the configuration.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("SKYWAVE_BIND_PORT") {
            if let Ok(port) = val.parse() {
                self.bind_port = port;
            }
        }

        if let Ok(val) = std::env::var("SKYWAVE_LIVE_URL") {
            if !val.is_empty() {
                self.live_stream_url = Some(val);
            }
        }

        if let Ok(val) = std::env::var("SKYWAVE_INVENTORY_URL") {
            if !val.is_empty() {
                self.inventory_base_url = Some(val);
            }
        }

        if let Ok(val) = std::env::var("SKYWAVE_TELEMETRY_URL") {
            if !val.is_empty() {
                self.telemetry_endpoint = Some(val);
            }
        }
    }

    /// Converts to skywave-core's Config type.
    pub fn to_core_config(&self) -> skywave_core::Config {
        skywave_core::Config {
            preferred_port: self.bind_port,
            trusted_origins: self.trusted_origins.clone(),
            queue: self.queue,
            gate: self.gate,
            live_stream_url: self.live_stream_url.clone(),
            inventory_base_url: self.inventory_base_url.clone(),
            telemetry_endpoint: self.telemetry_endpoint.clone(),
            ..Default::default()
        }
    }
}
