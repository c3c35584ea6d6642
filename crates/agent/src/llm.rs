use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use thiserror::Error;

use telar_core::config::LlmConfig;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LlmError {
    #[error("llm client could not be built: {0}")]
    Build(String),
    #[error("llm call exceeded its deadline")]
    Timeout,
    #[error("llm transport failed: {0}")]
    Transport(String),
    #[error("llm provider rejected the request with status {status}")]
    Provider { status: u16 },
    #[error("llm response had no usable content")]
    EmptyResponse,
}

/// One bounded call to the inference provider.
#[derive(Clone, Debug)]
pub struct LlmRequest {
    pub model: String,
    pub instructions: String,
    pub input: String,
    pub deadline: Duration,
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Returns the provider's raw text output. Must respect
    /// `request.deadline`; an expired deadline surfaces as
    /// [`LlmError::Timeout`] and the in-flight request is abandoned.
    async fn complete(&self, request: &LlmRequest) -> Result<String, LlmError>;
}

/// Client for an OpenAI-compatible chat-completions endpoint.
pub struct HttpLlmClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<SecretString>,
}

impl HttpLlmClient {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|err| LlmError::Build(err.to_string()))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    async fn request(&self, request: &LlmRequest) -> Result<String, LlmError> {
        let url = format!("{}/chat/completions", self.base_url);
        let payload = json!({
            "model": request.model,
            "temperature": 0.2,
            "messages": [
                { "role": "system", "content": request.instructions },
                { "role": "user", "content": request.input },
            ],
        });

        let mut builder = self.http.post(&url).json(&payload);
        if let Some(api_key) = self.api_key.as_ref() {
            builder = builder.bearer_auth(api_key.expose_secret());
        }

        let response =
            builder.send().await.map_err(|err| LlmError::Transport(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(LlmError::Provider { status: status.as_u16() });
        }

        let body: Value =
            response.json().await.map_err(|err| LlmError::Transport(err.to_string()))?;
        let content = body
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|content| !content.is_empty());

        content.map(str::to_string).ok_or(LlmError::EmptyResponse)
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(&self, request: &LlmRequest) -> Result<String, LlmError> {
        // The race only stops waiting; the underlying request is dropped,
        // not cancelled at the provider.
        match tokio::time::timeout(request.deadline, self.request(request)).await {
            Ok(result) => result,
            Err(_) => Err(LlmError::Timeout),
        }
    }
}

/// Scripted client for tests and offline runs: pops pre-seeded outcomes in
/// order, then reports timeouts once the script is exhausted.
#[derive(Debug, Default)]
pub struct ScriptedLlmClient {
    script: Mutex<VecDeque<Result<String, LlmError>>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedLlmClient {
    pub fn new(script: Vec<Result<String, LlmError>>) -> Self {
        Self { script: Mutex::new(script.into()), calls: Mutex::new(Vec::new()) }
    }

    /// Models requested so far, in call order.
    pub fn requested_models(&self) -> Vec<String> {
        self.calls.lock().unwrap_or_else(std::sync::PoisonError::into_inner).clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(std::sync::PoisonError::into_inner).len()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(&self, request: &LlmRequest) -> Result<String, LlmError> {
        self.calls
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(request.model.clone());
        self.script
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .pop_front()
            .unwrap_or(Err(LlmError::Timeout))
    }
}
