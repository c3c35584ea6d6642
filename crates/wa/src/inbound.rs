use serde::Deserialize;

use telar_core::store::ConversationStore;

/// One normalized inbound event: who wrote, and what.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundMessage {
    pub sender_id: String,
    pub text: String,
}

/// Carrier webhook envelope. Every level defaults to empty so a partially
/// formed payload degrades to "no messages" instead of a deserialize error.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub entry: Vec<Entry>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct Entry {
    #[serde(default)]
    pub changes: Vec<Change>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct Change {
    #[serde(default)]
    pub value: ChangeValue,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ChangeValue {
    #[serde(default)]
    pub messages: Vec<CarrierMessage>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct CarrierMessage {
    #[serde(default)]
    pub from: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub text: Option<TextBody>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct TextBody {
    #[serde(default)]
    pub body: String,
}

/// Flattens a webhook payload into normalized `(sender, text)` pairs.
///
/// Only text messages are kept. A sender that yields no digits maps to the
/// store's `unknown` sentinel rather than being dropped, so the request is
/// never rejected at the transport layer.
pub fn normalize_payload(payload: &WebhookPayload) -> Vec<InboundMessage> {
    let mut messages = Vec::new();
    for entry in &payload.entry {
        for change in &entry.changes {
            for message in &change.value.messages {
                if message.kind != "text" {
                    continue;
                }
                let Some(text) = message.text.as_ref() else {
                    continue;
                };
                let body = text.body.trim();
                if body.is_empty() {
                    continue;
                }
                messages.push(InboundMessage {
                    sender_id: ConversationStore::normalize_sender(&message.from),
                    text: body.to_string(),
                });
            }
        }
    }
    messages
}

/// Webhook verification handshake: echo the challenge back when the mode is
/// `subscribe` and the shared token matches. A deployment without a
/// configured token accepts any handshake.
pub fn verify_subscription(
    mode: Option<&str>,
    token: Option<&str>,
    challenge: Option<&str>,
    expected_token: Option<&str>,
) -> Option<String> {
    if mode != Some("subscribe") {
        return None;
    }
    if let Some(expected) = expected_token {
        if token != Some(expected) {
            return None;
        }
    }
    challenge.map(str::to_string)
}
