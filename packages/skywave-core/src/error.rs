//! Centralized error types for the Skywave core library.
//!
//! This module provides a unified error handling system that:
//! - Defines structured error types using `thiserror`
//! - Maps errors to appropriate HTTP status codes
//! - Implements `IntoResponse` for automatic JSON error responses

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::element::MediaError;
use crate::inventory::InventoryError;
use crate::telemetry::TelemetryError;

/// Trait for error types that provide machine-readable error codes.
///
/// Implement this trait to provide consistent error codes across different
/// error conversion paths. Reason strings reported through the event channel
/// use the same codes, so a client can treat an HTTP error body and an error
/// event interchangeably.
pub trait ErrorCode {
    /// Returns a machine-readable error code for API responses.
    fn code(&self) -> &'static str;
}

impl ErrorCode for MediaError {
    fn code(&self) -> &'static str {
        match self {
            Self::NotAllowed(_) => "platform_blocked",
            Self::Source(_) => "source_unavailable",
            Self::Detached => "element_detached",
        }
    }
}

impl ErrorCode for InventoryError {
    fn code(&self) -> &'static str {
        match self {
            Self::Http(_) => "inventory_request_failed",
            Self::Status(_) => "inventory_error_status",
            Self::Decode(_) => "inventory_decode_error",
            Self::Unconfigured => "inventory_unconfigured",
        }
    }
}

impl ErrorCode for TelemetryError {
    fn code(&self) -> &'static str {
        match self {
            Self::Http(_) => "telemetry_request_failed",
            Self::Status(_) => "telemetry_error_status",
        }
    }
}

/// Application-wide error type for the Skywave engine and API.
#[derive(Debug, Error, Serialize)]
#[serde(tag = "type", content = "details")]
pub enum PlayerError {
    /// Navigation or playback was requested on an empty queue.
    ///
    /// Terminal until a new queue is loaded.
    #[error("Queue is empty: {0}")]
    EmptyQueue(String),

    /// The platform refused to start playback (autoplay policy).
    ///
    /// Recoverable by an explicit user gesture; transport reverts to paused.
    #[error("Playback blocked by platform: {0}")]
    PlatformBlocked(String),

    /// The element failed to fetch or decode the current source.
    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    /// The insert inventory lookup failed; the gate degrades to live.
    #[error("Insert inventory unavailable: {0}")]
    InventoryUnavailable(String),

    /// Client sent an invalid or malformed request.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The playback session has been disposed.
    #[error("Session disposed")]
    SessionDisposed,

    /// Server configuration error (missing or invalid settings).
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PlayerError {
    /// Returns a machine-readable error code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::EmptyQueue(_) => "empty_queue",
            Self::PlatformBlocked(_) => "platform_blocked",
            Self::SourceUnavailable(_) => "source_unavailable",
            Self::InventoryUnavailable(_) => "inventory_unavailable",
            Self::InvalidRequest(_) => "invalid_request",
            Self::SessionDisposed => "session_disposed",
            Self::Configuration(_) => "configuration_error",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Maps the error to an appropriate HTTP status code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::EmptyQueue(_) | Self::PlatformBlocked(_) => StatusCode::CONFLICT,
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::SessionDisposed => StatusCode::GONE,
            Self::SourceUnavailable(_) | Self::InventoryUnavailable(_) => StatusCode::BAD_GATEWAY,
            Self::Configuration(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Convenient Result alias for application-wide operations.
pub type PlayerResult<T> = Result<T, PlayerError>;

/// JSON response body for error responses.
#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
    status: u16,
}

impl IntoResponse for PlayerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: self.code(),
            message: self.to_string(),
            status: status.as_u16(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<MediaError> for PlayerError {
    fn from(err: MediaError) -> Self {
        match err {
            MediaError::NotAllowed(msg) => Self::PlatformBlocked(msg),
            MediaError::Source(msg) => Self::SourceUnavailable(msg),
            MediaError::Detached => Self::SourceUnavailable(err.to_string()),
        }
    }
}

impl From<InventoryError> for PlayerError {
    fn from(err: InventoryError) -> Self {
        Self::InventoryUnavailable(err.to_string())
    }
}

impl From<TelemetryError> for PlayerError {
    fn from(err: TelemetryError) -> Self {
        Self::Internal(err.to_string())
    }
}
