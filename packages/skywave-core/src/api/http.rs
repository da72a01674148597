//! HTTP route handlers.
//!
//! All handlers are thin - they delegate to the playback session and let
//! `PlayerError`'s `IntoResponse` shape failures.

use std::convert::Infallible;

use axum::{
    extract::State,
    http::StatusCode,
    response::sse::{Event as SseEvent, KeepAlive, Sse},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use futures::stream::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;

use crate::api::response::{api_ok, api_success};
use crate::api::ws::ws_handler;
use crate::api::AppState;
use crate::error::PlayerResult;
use crate::queue::Track;

const SERVICE_ID: &str = "skywave-player";

// ─────────────────────────────────────────────────────────────────────────────
// Request Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct LoadQueueRequest {
    tracks: Vec<Track>,
    #[serde(rename = "startTrackId", default)]
    start_track_id: Option<String>,
}

#[derive(Deserialize)]
struct OpenLiveRequest {
    /// Overrides the configured live stream URL when present.
    #[serde(default)]
    url: Option<String>,
}

#[derive(Deserialize)]
struct SeekRequest {
    #[serde(rename = "positionSecs")]
    position_secs: f64,
}

#[derive(Deserialize)]
struct VolumeRequest {
    level: f32,
}

#[derive(Deserialize)]
struct MuteRequest {
    muted: bool,
}

#[derive(Deserialize)]
struct ShuffleRequest {
    shuffle: bool,
}

#[derive(Deserialize)]
struct RepeatOneRequest {
    #[serde(rename = "repeatOne")]
    repeat_one: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
// Router
// ─────────────────────────────────────────────────────────────────────────────

/// Creates the Axum router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/api/state", get(get_current_state))
        .route("/api/queue", post(load_queue))
        .route("/api/queue/shuffle", post(set_shuffle))
        .route("/api/queue/repeat-one", post(set_repeat_one))
        .route("/api/live", post(open_live))
        .route("/api/playback/play", post(play))
        .route("/api/playback/pause", post(pause))
        .route("/api/playback/toggle", post(toggle))
        .route("/api/playback/next", post(next_track))
        .route("/api/playback/previous", post(previous_track))
        .route("/api/playback/skip-insert", post(skip_insert))
        .route("/api/playback/seek", post(seek))
        .route("/api/volume", post(set_volume))
        .route("/api/mute", post(set_mute))
        .route("/api/events", get(event_stream))
        .route("/ws", get(ws_handler))
        .with_state(state)
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// Liveness probe: "Is the process running?"
///
/// Always returns 200 OK if the server is responding. Use `/ready` for
/// readiness checks that verify the service can handle requests.
async fn health_check() -> impl IntoResponse {
    api_success(json!({
        "status": "ok",
        "service": SERVICE_ID
    }))
}

/// Readiness probe: "Can the service handle requests?"
///
/// Ready as long as the playback session is alive. An attached element
/// host is reported but not required; commands queue state changes that
/// take effect once a host appears.
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    let session_alive = !state.session.is_disposed();
    let element_attached = state.element_hub.is_attached();
    let ready = session_alive;

    let status = if ready { "ready" } else { "not_ready" };
    let body = json!({
        "status": status,
        "ready": ready,
        "checks": {
            "session": { "ready": session_alive },
            "elementHost": {
                "ready": element_attached,
                "info": "optional - required only to produce audio"
            },
            "connections": { "value": state.ws_manager.connection_count() }
        }
    });

    if ready {
        api_success(body).into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response()
    }
}

/// Returns the current session snapshot.
async fn get_current_state(State(state): State<AppState>) -> impl IntoResponse {
    api_success(state.player_state.to_json())
}

async fn load_queue(
    State(state): State<AppState>,
    Json(payload): Json<LoadQueueRequest>,
) -> PlayerResult<impl IntoResponse> {
    state
        .session
        .load_queue(payload.tracks, payload.start_track_id)
        .await?;
    Ok(api_ok())
}

async fn open_live(
    State(state): State<AppState>,
    Json(payload): Json<OpenLiveRequest>,
) -> PlayerResult<impl IntoResponse> {
    state.session.open_live(payload.url).await?;
    Ok(api_ok())
}

async fn play(State(state): State<AppState>) -> PlayerResult<impl IntoResponse> {
    state.session.play().await?;
    Ok(api_ok())
}

async fn pause(State(state): State<AppState>) -> PlayerResult<impl IntoResponse> {
    state.session.pause().await?;
    Ok(api_ok())
}

async fn toggle(State(state): State<AppState>) -> PlayerResult<impl IntoResponse> {
    state.session.toggle().await?;
    Ok(api_ok())
}

async fn next_track(State(state): State<AppState>) -> PlayerResult<impl IntoResponse> {
    state.session.next().await?;
    Ok(api_ok())
}

async fn previous_track(State(state): State<AppState>) -> PlayerResult<impl IntoResponse> {
    state.session.previous().await?;
    Ok(api_ok())
}

async fn skip_insert(State(state): State<AppState>) -> PlayerResult<impl IntoResponse> {
    state.session.skip_insert().await?;
    Ok(api_ok())
}

async fn seek(
    State(state): State<AppState>,
    Json(payload): Json<SeekRequest>,
) -> PlayerResult<impl IntoResponse> {
    state.session.seek(payload.position_secs).await?;
    Ok(api_ok())
}

async fn set_volume(
    State(state): State<AppState>,
    Json(payload): Json<VolumeRequest>,
) -> PlayerResult<impl IntoResponse> {
    state.session.set_volume(payload.level).await?;
    Ok(api_ok())
}

async fn set_mute(
    State(state): State<AppState>,
    Json(payload): Json<MuteRequest>,
) -> PlayerResult<impl IntoResponse> {
    state.session.set_muted(payload.muted).await?;
    Ok(api_ok())
}

async fn set_shuffle(
    State(state): State<AppState>,
    Json(payload): Json<ShuffleRequest>,
) -> PlayerResult<impl IntoResponse> {
    state.session.set_shuffle(payload.shuffle).await?;
    Ok(api_ok())
}

async fn set_repeat_one(
    State(state): State<AppState>,
    Json(payload): Json<RepeatOneRequest>,
) -> PlayerResult<impl IntoResponse> {
    state.session.set_repeat_one(payload.repeat_one).await?;
    Ok(api_ok())
}

/// Server-sent event stream of broadcast events.
///
/// Lagged subscribers lose the dropped events and keep receiving; the
/// `/api/state` snapshot is the recovery path.
async fn event_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let rx = state.broadcast_tx.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|res| async move {
        match res {
            Ok(event) => match SseEvent::default().json_data(&event) {
                Ok(sse) => Some(Ok(sse)),
                Err(e) => {
                    log::warn!("[Events] failed to serialize event: {}", e);
                    None
                }
            },
            Err(BroadcastStreamRecvError::Lagged(n)) => {
                log::warn!("[Events] subscriber lagged, dropped {} events", n);
                None
            }
        }
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}
