use std::sync::Arc;

use axum::extract::{Path as AxumPath, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, put};
use axum::{Json, Router};
use motion_watch_common::frame::Zone;
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::alarm::AlarmState;
use crate::controls::Controls;
use crate::recorder::LogBook;

// ---------------------------------------------------------------------------
// App state
// ---------------------------------------------------------------------------

pub struct ApiState {
    pub controls: Arc<Controls>,
    pub book: LogBook,
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct Status {
    /// Whether the detection loop is running.
    running: bool,
    /// "idle" or "alarm"; null before the first score.
    state: Option<&'static str>,
    last_score: Option<f64>,
    frames: u64,
    alarm_enabled: bool,
    logging_enabled: bool,
    zone: Option<Zone>,
    log_entries: usize,
}

#[derive(Debug, Deserialize)]
struct ControlsPatch {
    alarm_enabled: Option<bool>,
    logging_enabled: Option<bool>,
}

#[derive(Debug, Serialize)]
struct LogSummary {
    seq: u64,
    timestamp: String,
    captured_at_ms: i64,
    image_bytes: usize,
    has_raw: bool,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET /status
async fn get_status(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    let flags = state.controls.flags();
    let status = state.controls.status();
    Json(Status {
        running: status.running,
        state: status.state.map(|s| match s {
            AlarmState::Idle => "idle",
            AlarmState::Alarm => "alarm",
        }),
        last_score: status.last_score.map(|s| s.value()),
        frames: status.frames,
        alarm_enabled: flags.alarm_enabled,
        logging_enabled: flags.logging_enabled,
        zone: state.controls.zone(),
        log_entries: state.book.len(),
    })
}

/// PUT /controls  body: { "alarm_enabled": bool?, "logging_enabled": bool? }
async fn put_controls(
    State(state): State<Arc<ApiState>>,
    Json(body): Json<ControlsPatch>,
) -> impl IntoResponse {
    if let Some(enabled) = body.alarm_enabled {
        state.controls.set_alarm_enabled(enabled);
    }
    if let Some(enabled) = body.logging_enabled {
        state.controls.set_logging_enabled(enabled);
    }
    StatusCode::NO_CONTENT
}

/// PUT /zone  body: { "x", "y", "width", "height" }, extents may be negative
async fn put_zone(
    State(state): State<Arc<ApiState>>,
    Json(zone): Json<Zone>,
) -> impl IntoResponse {
    state.controls.set_zone(Some(zone));
    StatusCode::NO_CONTENT
}

/// DELETE /zone
async fn delete_zone(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    state.controls.set_zone(None);
    StatusCode::NO_CONTENT
}

/// GET /logs
async fn list_logs(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    let logs = state.book.map(|e| LogSummary {
        seq: e.seq,
        timestamp: e.timestamp.clone(),
        captured_at_ms: e.captured_at_ms,
        image_bytes: e.image.bytes.len(),
        has_raw: e.raw.is_some(),
    });
    Json(logs)
}

/// GET /logs/:seq/image
async fn get_log_image(
    State(state): State<Arc<ApiState>>,
    AxumPath(seq): AxumPath<u64>,
) -> impl IntoResponse {
    match state.book.get(seq) {
        Some(entry) if entry.image.is_empty() => StatusCode::NO_CONTENT.into_response(),
        Some(entry) => (
            [(header::CONTENT_TYPE, entry.image.content_type)],
            entry.image.bytes,
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// GET /logs/:seq/raw  packed RGB samples, if raw capture was enabled
async fn get_log_raw(
    State(state): State<Arc<ApiState>>,
    AxumPath(seq): AxumPath<u64>,
) -> impl IntoResponse {
    match state.book.get(seq).and_then(|e| e.raw) {
        Some(raw) => {
            ([(header::CONTENT_TYPE, "application/octet-stream")], raw).into_response()
        }
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/status", get(get_status))
        .route("/controls", put(put_controls))
        .route("/zone", put(put_zone).delete(delete_zone))
        .route("/logs", get(list_logs))
        .route("/logs/:seq/image", get(get_log_image))
        .route("/logs/:seq/raw", get(get_log_raw))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(bind: &str, state: Arc<ApiState>) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(addr = %listener.local_addr()?, "control API listening");
    axum::serve(listener, router(state)).await
}
