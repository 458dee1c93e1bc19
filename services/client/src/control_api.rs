//! Localhost control API for the headless client.
//!
//! Binds to `[control] bind` (default 127.0.0.1:9191).
//! Routes:
//!   POST /push               - hand a raw push payload to the push bridge
//!   POST /api/v1/respond     - answer the active notification
//!   POST /api/v1/refresh     - request an immediate status fetch (202)
//!   GET  /api/v1/state       - engine state snapshot

use axum::body::Bytes;
use axum::routing::{get, post};
use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse};
use qs_protocol::Verdict;
use serde::Deserialize;
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::engine::EngineHandle;
use crate::error::ClientError;
use crate::fetcher::TriggerReason;
use crate::push_bridge::{PushBridgeHandle, PushEvent};

#[derive(Clone)]
pub struct ControlState {
    pub engine: EngineHandle,
    pub bridge: PushBridgeHandle,
}

#[derive(Debug, Deserialize)]
pub struct RespondBody {
    pub response: Verdict,
}

pub fn build_router(state: ControlState) -> Router {
    Router::new()
        .route("/push", post(post_push))
        .route("/api/v1/respond", post(post_respond))
        .route("/api/v1/refresh", post(post_refresh))
        .route("/api/v1/state", get(get_state))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn post_push(State(state): State<ControlState>, body: Bytes) -> impl IntoResponse {
    let event = if body.is_empty() {
        PushEvent::empty()
    } else {
        PushEvent::from_bytes(body.to_vec())
    };
    match state.bridge.deliver(event).await {
        Some(disposition) => (StatusCode::OK, Json(json!(disposition))).into_response(),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"error": "push bridge stopped"})),
        )
            .into_response(),
    }
}

async fn post_respond(
    State(state): State<ControlState>,
    Json(body): Json<RespondBody>,
) -> impl IntoResponse {
    info!(verdict = %body.response, "respond requested via control API");
    match state.engine.respond(body.response).await {
        Ok(resp) => (StatusCode::OK, Json(json!(resp))).into_response(),
        Err(e) => {
            let status = match e {
                ClientError::NoActiveNotification | ClientError::ResponseInFlight => {
                    StatusCode::CONFLICT
                }
                ClientError::EngineStopped => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::BAD_GATEWAY,
            };
            (status, Json(json!({"error": e.to_string()}))).into_response()
        }
    }
}

async fn post_refresh(State(state): State<ControlState>) -> impl IntoResponse {
    match state.engine.refresh(TriggerReason::Manual) {
        Ok(()) => StatusCode::ACCEPTED,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

async fn get_state(State(state): State<ControlState>) -> impl IntoResponse {
    match state.engine.state().await {
        Ok(s) => (StatusCode::OK, Json(json!(s))).into_response(),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"error": e.to_string()})),
        )
            .into_response(),
    }
}
