//! End-to-end conversation flows over scripted inference and a recording
//! outbound sender. No network, no real model.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tempfile::TempDir;

use telar_agent::{LlmError, ScriptedLlmClient};
use telar_core::config::AppConfig;
use telar_core::domain::conversation::{HandoffKind, MessageOrigin, QualField};
use telar_core::policy::{HANDOFF_CONFIRMATION, POST_HANDOFF_ACK};
use telar_server::bootstrap::{build_state, AppState};
use telar_wa::outbound::{MessageSender, SendError};

const CUSTOMER: &str = "5493415550001";
const OPERATOR: &str = "5493415559999";

/// Records every outbound message; optionally fails deliveries to one
/// destination to exercise the degraded paths.
#[derive(Default)]
struct RecordingSender {
    sent: Mutex<Vec<(String, String)>>,
    fail_for: Mutex<Option<String>>,
}

impl RecordingSender {
    fn sent_to(&self, to: &str) -> Vec<String> {
        self.lock_sent()
            .iter()
            .filter(|(dest, _)| dest == to)
            .map(|(_, body)| body.clone())
            .collect()
    }

    fn fail_deliveries_to(&self, to: &str) {
        *self.fail_for.lock().unwrap_or_else(PoisonError::into_inner) = Some(to.to_string());
    }

    fn lock_sent(&self) -> std::sync::MutexGuard<'_, Vec<(String, String)>> {
        self.sent.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl MessageSender for RecordingSender {
    async fn send(&self, to: &str, body: &str) -> Result<(), SendError> {
        let failing = self.fail_for.lock().unwrap_or_else(PoisonError::into_inner).clone();
        if failing.as_deref() == Some(to) {
            return Err(SendError::Rejected { status: 500 });
        }
        self.lock_sent().push((to.to_string(), body.to_string()));
        Ok(())
    }
}

fn scripted_state(
    dir: &TempDir,
    script: Vec<Result<String, LlmError>>,
) -> (AppState, Arc<RecordingSender>, Arc<ScriptedLlmClient>) {
    let mut config = AppConfig::default();
    config.transcripts.dir = dir.path().to_path_buf();
    config.llm.retry_backoff_ms = 0;
    config.wa.operator_number = Some(OPERATOR.to_string());

    let llm = Arc::new(ScriptedLlmClient::new(script));
    let sender = Arc::new(RecordingSender::default());
    let state = build_state(&config, llm.clone(), sender.clone());
    (state, sender, llm)
}

fn decision_json(reply: &str, extra: &str) -> Result<String, LlmError> {
    if extra.is_empty() {
        Ok(format!(r#"{{"reply": "{reply}"}}"#))
    } else {
        Ok(format!(r#"{{"reply": "{reply}", {extra}}}"#))
    }
}

#[tokio::test]
async fn greeting_turn_populates_nothing_and_stays_active() {
    let dir = TempDir::new().expect("temp dir");
    let (state, sender, _) = scripted_state(
        &dir,
        vec![decision_json("¡Hola! Contame qué necesitás.", r#""handoff_intent": "none""#)],
    );

    state.orchestrator.process_inbound(CUSTOMER, "hola").await;

    assert_eq!(sender.sent_to(CUSTOMER), vec!["¡Hola! Contame qué necesitás.".to_string()]);
    let conversation = state.store.get(CUSTOMER).expect("conversation exists");
    assert!(!conversation.handed_off);
    assert!(conversation.pending_handoff.is_none());
    assert!(conversation.name.is_none());
    assert!(sender.sent_to(OPERATOR).is_empty());
}

#[tokio::test]
async fn price_request_without_fields_opens_a_pending_handoff() {
    let dir = TempDir::new().expect("temp dir");
    let (state, sender, _) = scripted_state(
        &dir,
        vec![decision_json(
            "Claro, ¿qué cortinas estás buscando?",
            r#""handoff_intent": "price""#,
        )],
    );

    state.orchestrator.process_inbound(CUSTOMER, "necesito presupuesto").await;

    let conversation = state.store.get(CUSTOMER).expect("conversation exists");
    let pending = conversation.pending_handoff.expect("pending handoff");
    assert_eq!(pending.kind, HandoffKind::Price);
    assert!(!conversation.handed_off);
    assert_eq!(sender.sent_to(CUSTOMER).len(), 1);
    assert!(sender.sent_to(OPERATOR).is_empty());
}

#[tokio::test]
async fn completing_fields_hands_off_once_with_deterministic_confirmation() {
    let dir = TempDir::new().expect("temp dir");
    let (state, sender, llm) = scripted_state(
        &dir,
        vec![
            decision_json("Claro, contame más.", r#""handoff_intent": "price""#),
            decision_json(
                "texto del modelo que la política descarta",
                r#""name": "Ana", "zone": "Fisherton", "intentSummary": "cortinas roller para el living""#,
            ),
        ],
    );

    state.orchestrator.process_inbound(CUSTOMER, "necesito presupuesto").await;
    state
        .orchestrator
        .process_inbound(CUSTOMER, "Quiero cortinas roller para el living, soy Ana, zona Fisherton")
        .await;

    let conversation = state.store.get(CUSTOMER).expect("conversation exists");
    assert!(conversation.handed_off);
    assert!(conversation.pending_handoff.is_none());
    assert_eq!(conversation.name.as_deref(), Some("Ana"));
    assert_eq!(conversation.zone.as_deref(), Some("Fisherton"));

    let replies = sender.sent_to(CUSTOMER);
    assert_eq!(replies.last().map(String::as_str), Some(HANDOFF_CONFIRMATION));

    let notifications = sender.sent_to(OPERATOR);
    assert_eq!(notifications.len(), 1);
    assert!(notifications[0].contains("pide presupuesto"));
    assert!(notifications[0].contains("Ana"));
    assert!(notifications[0].contains(CUSTOMER));

    let snapshots: Vec<_> = std::fs::read_dir(dir.path())
        .expect("transcript dir")
        .filter_map(Result::ok)
        .filter(|entry| entry.file_name().to_string_lossy().starts_with("handoff-"))
        .collect();
    assert_eq!(snapshots.len(), 1);
    assert_eq!(llm.call_count(), 2);

    // The per-sender transcript reflects the flip as soon as it happens.
    let transcript = std::fs::read_to_string(dir.path().join(format!("{CUSTOMER}.txt")))
        .expect("sender transcript");
    assert!(transcript.contains("handed_off: true"));
    assert!(transcript.contains("pending_handoff: -"));
}

#[tokio::test]
async fn unwritable_transcript_dir_does_not_block_the_turn() {
    let dir = TempDir::new().expect("temp dir");
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, "not a directory").expect("blocker file");

    let mut config = AppConfig::default();
    // Creating this directory fails because a plain file sits in the way.
    config.transcripts.dir = blocker.join("transcripts");
    config.llm.retry_backoff_ms = 0;
    config.wa.operator_number = Some(OPERATOR.to_string());

    let llm = Arc::new(ScriptedLlmClient::new(vec![decision_json(
        "¡Hola! Contame qué necesitás.",
        r#""handoff_intent": "none""#,
    )]));
    let sender = Arc::new(RecordingSender::default());
    let state = build_state(&config, llm.clone(), sender.clone());

    state.orchestrator.process_inbound(CUSTOMER, "hola").await;

    assert_eq!(llm.call_count(), 1, "inference still runs when transcript IO fails");
    assert_eq!(sender.sent_to(CUSTOMER), vec!["¡Hola! Contame qué necesitás.".to_string()]);
    let conversation = state.store.get(CUSTOMER).expect("conversation exists");
    assert!(conversation
        .messages
        .iter()
        .all(|message| message.origin != MessageOrigin::System));
}

#[tokio::test]
async fn post_handoff_messages_get_fixed_ack_and_no_inference() {
    let dir = TempDir::new().expect("temp dir");
    let (state, sender, llm) = scripted_state(
        &dir,
        vec![decision_json(
            "ok",
            r#""handoff_intent": "visit", "name": "Ana", "zone": "Centro", "intentSummary": "cortinas", "availability": "viernes a la tarde""#,
        )],
    );

    state.orchestrator.process_inbound(CUSTOMER, "quiero que vengan a medir, soy Ana").await;
    let conversation = state.store.get(CUSTOMER).expect("conversation exists");
    assert!(conversation.handed_off);
    assert_eq!(llm.call_count(), 1);
    assert_eq!(sender.sent_to(OPERATOR).len(), 1);

    state.orchestrator.process_inbound(CUSTOMER, "¿me confirman el horario?").await;

    assert_eq!(llm.call_count(), 1, "post-handoff turns must not call inference");
    let replies = sender.sent_to(CUSTOMER);
    assert_eq!(replies.last().map(String::as_str), Some(POST_HANDOFF_ACK));

    // One qualification notification, plus one low-priority forward.
    let operator_messages = sender.sent_to(OPERATOR);
    assert_eq!(operator_messages.len(), 2);
    assert!(operator_messages[1].contains("¿me confirman el horario?"));
    let qualified = operator_messages
        .iter()
        .filter(|body| body.contains("Nuevo cliente calificado"))
        .count();
    assert_eq!(qualified, 1);
}

#[tokio::test]
async fn double_deadline_miss_degrades_to_the_local_classifier() {
    let dir = TempDir::new().expect("temp dir");
    let (state, sender, llm) =
        scripted_state(&dir, vec![Err(LlmError::Timeout), Err(LlmError::Timeout)]);

    state.orchestrator.process_inbound(CUSTOMER, "hola, cuánto sale una cortina?").await;

    assert_eq!(llm.call_count(), 2);
    let replies = sender.sent_to(CUSTOMER);
    assert_eq!(replies, vec![QualField::IntentSummary.question().to_string()]);
    let conversation = state.store.get(CUSTOMER).expect("conversation exists");
    assert_eq!(
        conversation.pending_handoff.map(|pending| pending.kind),
        Some(HandoffKind::Price)
    );
    assert!(!conversation.handed_off);
}

#[tokio::test]
async fn same_sender_messages_are_processed_in_arrival_order() {
    let dir = TempDir::new().expect("temp dir");
    let (state, _, _) = scripted_state(
        &dir,
        vec![decision_json("respuesta uno", ""), decision_json("respuesta dos", "")],
    );

    for text in ["primer mensaje", "segundo mensaje"] {
        let orchestrator = state.orchestrator.clone();
        let text = text.to_string();
        state.queue.enqueue(CUSTOMER, async move {
            orchestrator.process_inbound(CUSTOMER, &text).await;
        });
    }

    let (tx, rx) = tokio::sync::oneshot::channel::<()>();
    state.queue.enqueue(CUSTOMER, async move {
        let _ = tx.send(());
    });
    rx.await.expect("queue drained");

    let conversation = state.store.get(CUSTOMER).expect("conversation exists");
    let texts: Vec<_> = conversation
        .messages
        .iter()
        .map(|message| (message.origin, message.text.as_str()))
        .collect();
    assert_eq!(
        texts,
        vec![
            (MessageOrigin::Customer, "primer mensaje"),
            (MessageOrigin::Assistant, "respuesta uno"),
            (MessageOrigin::Customer, "segundo mensaje"),
            (MessageOrigin::Assistant, "respuesta dos"),
        ]
    );
}

#[tokio::test]
async fn failed_customer_delivery_never_rolls_back_state() {
    let dir = TempDir::new().expect("temp dir");
    let (state, sender, _) = scripted_state(
        &dir,
        vec![decision_json("hola, contame", r#""handoff_intent": "none""#)],
    );
    sender.fail_deliveries_to(CUSTOMER);

    state.orchestrator.process_inbound(CUSTOMER, "hola").await;

    let conversation = state.store.get(CUSTOMER).expect("conversation exists");
    assert!(conversation
        .messages
        .iter()
        .any(|message| message.origin == MessageOrigin::System
            && message.text.contains("reply delivery failed")));
    // The assistant turn is still on record even though delivery failed.
    assert!(conversation
        .messages
        .iter()
        .any(|message| message.origin == MessageOrigin::Assistant));
}

#[tokio::test]
async fn failed_operator_notification_keeps_the_handoff() {
    let dir = TempDir::new().expect("temp dir");
    let (state, sender, _) = scripted_state(
        &dir,
        vec![decision_json(
            "ok",
            r#""handoff_intent": "price", "name": "Ana", "zone": "Centro", "intentSummary": "cortinas""#,
        )],
    );
    sender.fail_deliveries_to(OPERATOR);

    state.orchestrator.process_inbound(CUSTOMER, "presupuesto para cortinas, soy Ana").await;

    let conversation = state.store.get(CUSTOMER).expect("conversation exists");
    assert!(conversation.handed_off, "handoff is not rolled back on notification failure");
    assert!(conversation
        .messages
        .iter()
        .any(|message| message.origin == MessageOrigin::System
            && message.text.contains("operator notification failed")));
    assert_eq!(sender.sent_to(CUSTOMER).last().map(String::as_str), Some(HANDOFF_CONFIRMATION));
}
