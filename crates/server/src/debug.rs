//! Operator-facing inspection endpoints.
//!
//! Read-only views over the in-memory store. When a debug token is
//! configured every request must present it in the `x-debug-token` header;
//! without one the endpoints are open, which is acceptable only behind a
//! trusted reverse proxy.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};

use crate::bootstrap::AppState;

const TOKEN_HEADER: &str = "x-debug-token";

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/debug/conversations", get(list_conversations))
        .route("/debug/conversations/{sender}", get(show_conversation))
}

async fn list_conversations(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if !authorized(&state, &headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    Json(state.store.summaries()).into_response()
}

async fn show_conversation(
    State(state): State<AppState>,
    Path(sender): Path<String>,
    headers: HeaderMap,
) -> Response {
    if !authorized(&state, &headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    match state.store.get(&sender) {
        Some(conversation) => Json(conversation).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

fn authorized(state: &AppState, headers: &HeaderMap) -> bool {
    let Some(expected) = state.debug_token.as_deref() else {
        return true;
    };
    headers.get(TOKEN_HEADER).and_then(|value| value.to_str().ok()) == Some(expected)
}
