use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};
use tracing::info;

use telar_agent::{DecisionEngine, HttpLlmClient, LlmClient, PromptBuilder};
use telar_core::config::AppConfig;
use telar_core::store::ConversationStore;
use telar_core::transcript::TranscriptWriter;
use telar_wa::outbound::{HttpMessageSender, MessageSender, NoopMessageSender};

use crate::notifier::HandoffNotifier;
use crate::orchestrator::Orchestrator;
use crate::queue::SenderQueue;

/// Shared handle every HTTP handler closes over. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub queue: Arc<SenderQueue>,
    pub store: Arc<ConversationStore>,
    pub verify_token: Option<String>,
    pub debug_token: Option<String>,
    pub started_at: DateTime<Utc>,
}

/// Wires the processing pipeline over the given model client and outbound
/// sender. Production picks the real implementations in
/// [`bootstrap_with_config`]; tests inject scripted ones here.
pub fn build_state(
    config: &AppConfig,
    llm: Arc<dyn LlmClient>,
    sender: Arc<dyn MessageSender>,
) -> AppState {
    let store = Arc::new(ConversationStore::new());
    let transcripts = TranscriptWriter::new(&config.transcripts.dir);
    let operator_number = config.wa.operator_number.clone();

    let prompt = PromptBuilder::new(&config.business, &config.llm);
    let engine = DecisionEngine::new(llm, prompt, &config.llm);

    let notifier = HandoffNotifier::new(
        store.clone(),
        transcripts.clone(),
        sender.clone(),
        operator_number.clone(),
    );
    let orchestrator = Arc::new(Orchestrator::new(
        store.clone(),
        engine,
        transcripts,
        sender,
        notifier,
        operator_number,
    ));

    AppState {
        orchestrator,
        queue: Arc::new(SenderQueue::new()),
        store,
        verify_token: config.wa.verify_token.clone(),
        debug_token: config.server.debug_token.clone(),
        started_at: Utc::now(),
    }
}

/// Production wiring: real model client, and the real carrier sender unless
/// sandbox mode keeps outbound delivery suppressed.
pub fn bootstrap_with_config(config: &AppConfig) -> anyhow::Result<AppState> {
    info!(
        event_name = "system.bootstrap.start",
        sandbox = config.wa.sandbox,
        model = %config.llm.model,
        "starting application bootstrap"
    );

    let llm: Arc<dyn LlmClient> =
        Arc::new(HttpLlmClient::new(&config.llm).context("building inference client")?);

    let sender: Arc<dyn MessageSender> = if config.wa.sandbox {
        Arc::new(NoopMessageSender)
    } else {
        Arc::new(HttpMessageSender::new(&config.wa).context("building carrier client")?)
    };

    let state = build_state(config, llm, sender);
    info!(
        event_name = "system.bootstrap.ready",
        transport_mode = if config.wa.sandbox { "noop" } else { "live" },
        "processing pipeline wired"
    );
    Ok(state)
}

/// Full HTTP surface served on the main listener.
pub fn router(state: AppState) -> axum::Router {
    axum::Router::new()
        .merge(crate::webhook::routes())
        .merge(crate::debug::routes())
        .with_state(state)
}
