//! Degraded-mode classifier.
//!
//! Last resort when both inference attempts soft-fail: a deterministic,
//! lexical guess at the customer's intent plus a reply that asks for exactly
//! one missing field. Uses only locally available signals; repeated runs over
//! the same state produce the same decision.

use telar_core::domain::conversation::{Conversation, HandoffKind};
use telar_core::domain::decision::{Decision, ExtractedFields};
use telar_core::policy::{single_question, GREETING};

const PRICE_MARKERS: [&str; 7] =
    ["presupuesto", "precio", "cuanto sale", "cuanto cuesta", "cuanto esta", "cotiza", "valor"];

const VISIT_MARKERS: [&str; 7] =
    ["visita", "medicion", "medir", "vengan", "venir", "agendar", "domicilio"];

/// Lexical intent guess over normalized text. Visit markers win over price
/// markers: a message asking to "venir a medir para presupuestar" is a visit.
pub fn classify_intent(text: &str) -> Option<HandoffKind> {
    let normalized = normalize(text);
    if VISIT_MARKERS.iter().any(|marker| normalized.contains(marker)) {
        return Some(HandoffKind::Visit);
    }
    if PRICE_MARKERS.iter().any(|marker| normalized.contains(marker)) {
        return Some(HandoffKind::Price);
    }
    None
}

/// Synthesizes the deterministic fallback decision for an inbound message.
pub fn fallback_decision(conversation: &Conversation, inbound: &str) -> Decision {
    let classified = classify_intent(inbound);
    let active =
        conversation.pending_handoff.as_ref().map(|pending| pending.kind).or(classified);

    let reply = match active {
        Some(kind) => single_question(conversation, kind),
        None => GREETING.to_string(),
    };

    Decision { reply, fields: ExtractedFields::default(), intent: classified }
}

fn normalize(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|ch| match ch {
            'á' => 'a',
            'é' => 'e',
            'í' => 'i',
            'ó' => 'o',
            'ú' | 'ü' => 'u',
            _ => ch,
        })
        .collect()
}
