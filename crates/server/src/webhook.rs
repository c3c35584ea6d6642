use std::collections::HashMap;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use tracing::{debug, info};

use telar_wa::inbound::{normalize_payload, verify_subscription, WebhookPayload};

use crate::bootstrap::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/webhook", get(verify).post(receive))
}

/// Carrier subscription handshake: echoes the challenge on a token match.
async fn verify(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> (StatusCode, String) {
    let challenge = verify_subscription(
        params.get("hub.mode").map(String::as_str),
        params.get("hub.verify_token").map(String::as_str),
        params.get("hub.challenge").map(String::as_str),
        state.verify_token.as_deref(),
    );

    match challenge {
        Some(challenge) => (StatusCode::OK, challenge),
        None => (StatusCode::FORBIDDEN, String::new()),
    }
}

/// Inbound webhook: acknowledge immediately, process in the background.
///
/// The transport never observes processing latency or failures; a payload
/// that does not deserialize simply normalizes to zero messages.
async fn receive(State(state): State<AppState>, body: String) -> (StatusCode, &'static str) {
    let payload: WebhookPayload = serde_json::from_str(&body).unwrap_or_default();
    let messages = normalize_payload(&payload);
    if messages.is_empty() {
        debug!(
            event_name = "webhook.no_messages",
            body_len = body.len(),
            "inbound payload carried no processable messages"
        );
    }

    for message in messages {
        info!(
            event_name = "webhook.enqueued",
            sender_id = %message.sender_id,
            "inbound message enqueued for processing"
        );
        let orchestrator = state.orchestrator.clone();
        let key = message.sender_id.clone();
        state.queue.enqueue(&key, async move {
            orchestrator.process_inbound(&message.sender_id, &message.text).await;
        });
    }

    (StatusCode::OK, "EVENT_RECEIVED")
}
