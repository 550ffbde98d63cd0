//! Axum Router Configuration
//!
//! The service exposes three routes: a liveness probe, the media-stream
//! WebSocket, and a hang-up endpoint that call-control systems invoke to
//! tear a live session down.

use crate::{state::AppState, ws::ws_handler};
use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};
use std::sync::Arc;
use uuid::Uuid;

/// Creates the main Axum router for the application.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/ws", get(ws_handler))
        .route("/sessions/{id}/hangup", post(hangup))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

/// Requests teardown of a live session. Teardown is asynchronous; the
/// session leaves the registry once its bridge has fully closed, so
/// repeated calls for the same id are accepted until then.
async fn hangup(State(state): State<Arc<AppState>>, Path(id): Path<Uuid>) -> StatusCode {
    match state.sessions.lock().await.get(&id) {
        Some(handle) => {
            handle.stop();
            StatusCode::ACCEPTED
        }
        None => StatusCode::NOT_FOUND,
    }
}
