use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use telar_core::store::ConversationStore;
use tracing::{error, info};

#[derive(Clone)]
pub struct HealthState {
    store: Arc<ConversationStore>,
    started_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub detail: String,
    pub conversations: usize,
    pub uptime_secs: i64,
    pub checked_at: String,
}

pub fn router(store: Arc<ConversationStore>, started_at: DateTime<Utc>) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { store, started_at })
}

pub async fn spawn(
    bind_address: &str,
    port: u16,
    store: Arc<ConversationStore>,
    started_at: DateTime<Utc>,
) -> std::io::Result<()> {
    let address = format!("{bind_address}:{port}");
    let listener = tokio::net::TcpListener::bind(&address).await?;

    info!(
        event_name = "system.health.start",
        bind_address = %address,
        "health endpoint started"
    );

    tokio::spawn(async move {
        if let Err(error) = axum::serve(listener, router(store, started_at)).await {
            error!(
                event_name = "system.health.error",
                error = %error,
                "health endpoint server terminated unexpectedly"
            );
        }
    });

    Ok(())
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let now = Utc::now();
    let payload = HealthResponse {
        status: "ready",
        detail: "telar-server runtime initialized".to_string(),
        conversations: state.store.len(),
        uptime_secs: (now - state.started_at).num_seconds(),
        checked_at: now.to_rfc3339(),
    };

    (StatusCode::OK, Json(payload))
}
