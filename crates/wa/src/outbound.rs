use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use thiserror::Error;
use tracing::debug;

use telar_core::config::WaConfig;

#[derive(Debug, Error)]
pub enum SendError {
    #[error("carrier client could not be built: {0}")]
    Build(String),
    #[error("carrier request failed: {0}")]
    Transport(String),
    #[error("carrier rejected message with status {status}")]
    Rejected { status: u16 },
}

/// Outbound send contract: destination identifier plus text body,
/// fire-and-forget from the orchestrator's perspective.
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send(&self, to: &str, body: &str) -> Result<(), SendError>;
}

/// Sender backed by the carrier's Graph-style messages endpoint.
pub struct HttpMessageSender {
    http: reqwest::Client,
    api_base_url: String,
    phone_number_id: String,
    access_token: SecretString,
}

impl HttpMessageSender {
    pub fn new(config: &WaConfig) -> Result<Self, SendError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|err| SendError::Build(err.to_string()))?;

        Ok(Self {
            http,
            api_base_url: config.api_base_url.trim_end_matches('/').to_string(),
            phone_number_id: config.phone_number_id.clone(),
            access_token: config.access_token.clone(),
        })
    }
}

#[async_trait]
impl MessageSender for HttpMessageSender {
    async fn send(&self, to: &str, body: &str) -> Result<(), SendError> {
        let url = format!("{}/{}/messages", self.api_base_url, self.phone_number_id);
        let payload = json!({
            "messaging_product": "whatsapp",
            "to": to,
            "type": "text",
            "text": { "body": body },
        });

        let response = self
            .http
            .post(&url)
            .bearer_auth(self.access_token.expose_secret())
            .json(&payload)
            .send()
            .await
            .map_err(|err| SendError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SendError::Rejected { status: status.as_u16() });
        }
        Ok(())
    }
}

/// Sandbox sender: logs and drops every message. Used when outbound sending
/// is globally suppressed; state and transcript logic are unaffected.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopMessageSender;

#[async_trait]
impl MessageSender for NoopMessageSender {
    async fn send(&self, to: &str, body: &str) -> Result<(), SendError> {
        debug!(
            event_name = "wa.outbound.suppressed",
            to = %to,
            body_len = body.len(),
            "sandbox mode suppressed outbound message"
        );
        Ok(())
    }
}
