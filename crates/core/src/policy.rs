//! Qualification & handoff policy.
//!
//! Pure decision logic over a conversation's collected fields and the latest
//! [`Decision`]. The policy decides what to answer, whether a handoff fires
//! now, and what pending-handoff bookkeeping to keep. Replies that gate the
//! handoff itself are deterministic templates, never model output, so the
//! confirmation a customer sees is always consistent.

use chrono::Utc;

use crate::domain::conversation::{Conversation, HandoffKind, PendingHandoff, QualField};
use crate::domain::decision::Decision;

/// Default greeting when the model produced no usable reply and no handoff
/// intent is active.
pub const GREETING: &str =
    "¡Hola! Gracias por escribirnos. Contame qué necesitás y te ayudo con tu consulta de cortinas.";

/// Deterministic confirmation sent the moment a handoff becomes ready.
pub const HANDOFF_CONFIRMATION: &str =
    "¡Perfecto! Ya tengo todo lo que necesito. Te paso con una persona del equipo para que siga tu consulta. ¡Gracias!";

/// Fixed acknowledgment for every message that arrives after handoff.
pub const POST_HANDOFF_ACK: &str =
    "¡Gracias por tu mensaje! Tu consulta ya está con nuestro equipo y te responden a la brevedad.";

const TECHNICAL_ISSUE: &str =
    "Tuvimos un inconveniente técnico al procesar tu mensaje. ¿Me lo repetís, por favor?";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PolicyOutcome {
    pub reply: String,
    pub handoff_now: bool,
    pub kind: Option<HandoffKind>,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct QualificationPolicy;

impl QualificationPolicy {
    /// Merges the decision into the conversation and resolves the next reply
    /// plus handoff bookkeeping.
    pub fn apply(&self, conversation: &mut Conversation, decision: &Decision) -> PolicyOutcome {
        conversation.merge_fields(&decision.fields);

        let active = conversation
            .pending_handoff
            .as_ref()
            .map(|pending| pending.kind)
            .or(decision.intent);

        let Some(kind) = active else {
            let reply = non_empty(&decision.reply).unwrap_or(GREETING).to_string();
            return PolicyOutcome { reply, handoff_now: false, kind: None };
        };

        if conversation.is_ready(kind) {
            conversation.pending_handoff = None;
            return PolicyOutcome {
                reply: HANDOFF_CONFIRMATION.to_string(),
                handoff_now: true,
                kind: Some(kind),
            };
        }

        conversation.pending_handoff =
            Some(PendingHandoff { kind, requested_at: Utc::now() });
        let reply = match non_empty(&decision.reply) {
            Some(reply) => reply.to_string(),
            None => single_question(conversation, kind),
        };
        PolicyOutcome { reply, handoff_now: false, kind: Some(kind) }
    }

    /// Degraded reply for an unexpected processing failure. Still respects
    /// the single-question discipline when a handoff is pending.
    pub fn technical_issue_reply(&self, conversation: &Conversation) -> String {
        match conversation.pending_handoff.as_ref() {
            Some(pending) => match conversation.missing_fields(pending.kind).first() {
                Some(field) => format!("{TECHNICAL_ISSUE} {}", field.question()),
                None => TECHNICAL_ISSUE.to_string(),
            },
            None => TECHNICAL_ISSUE.to_string(),
        }
    }
}

/// Asks for exactly one missing field, in priority order. Falls back to the
/// confirmation when nothing is missing.
pub fn single_question(conversation: &Conversation, kind: HandoffKind) -> String {
    conversation
        .missing_fields(kind)
        .first()
        .map(QualField::question)
        .unwrap_or(HANDOFF_CONFIRMATION)
        .to_string()
}

fn non_empty(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}
