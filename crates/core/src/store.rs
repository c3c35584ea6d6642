//! In-memory conversation store.
//!
//! The store is the single owner of conversation state: entities are created
//! lazily on first contact and live for the process lifetime. Mutation only
//! happens from inside a sender's serial-queue slot, so the internal mutex is
//! held for map access only and never across an await point.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::conversation::{Conversation, QualField};

/// Sentinel key used when the sender identifier cannot be normalized.
pub const UNKNOWN_SENDER: &str = "unknown";

#[derive(Debug, Default)]
pub struct ConversationStore {
    inner: Mutex<HashMap<String, Conversation>>,
}

/// Read-only row for the debug listing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ConversationSummary {
    pub sender_id: String,
    pub name: Option<String>,
    pub handed_off: bool,
    pub pending_handoff: Option<String>,
    pub collected_fields: Vec<&'static str>,
    pub message_count: usize,
    pub last_activity: DateTime<Utc>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Digits-only normalization of a raw sender identifier. Anything that
    /// yields no digits maps to the [`UNKNOWN_SENDER`] sentinel rather than
    /// being rejected.
    pub fn normalize_sender(raw: &str) -> String {
        let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
        if digits.is_empty() {
            UNKNOWN_SENDER.to_string()
        } else {
            digits
        }
    }

    /// Runs `f` against the conversation for `sender_id`, creating it on
    /// first contact.
    pub fn with_conversation<R>(
        &self,
        sender_id: &str,
        f: impl FnOnce(&mut Conversation) -> R,
    ) -> R {
        let mut map = self.lock();
        let conversation = map
            .entry(sender_id.to_string())
            .or_insert_with(|| Conversation::new(sender_id));
        f(conversation)
    }

    pub fn get(&self, sender_id: &str) -> Option<Conversation> {
        self.lock().get(sender_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Summaries for the debug surface, most recent activity first.
    pub fn summaries(&self) -> Vec<ConversationSummary> {
        let map = self.lock();
        let mut rows: Vec<ConversationSummary> = map.values().map(summarize).collect();
        rows.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
        rows
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Conversation>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn summarize(conversation: &Conversation) -> ConversationSummary {
    ConversationSummary {
        sender_id: conversation.sender_id.clone(),
        name: conversation.name.clone(),
        handed_off: conversation.handed_off,
        pending_handoff: conversation
            .pending_handoff
            .as_ref()
            .map(|pending| pending.kind.label().to_string()),
        collected_fields: QualField::PRIORITY
            .into_iter()
            .filter(|field| conversation.field(*field).is_some())
            .map(|field| field.label())
            .collect(),
        message_count: conversation.messages.len(),
        last_activity: conversation.last_activity(),
    }
}
