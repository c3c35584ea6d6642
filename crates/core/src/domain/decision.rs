use serde::{Deserialize, Serialize};

use crate::domain::conversation::HandoffKind;

/// Qualification fields extracted from a single customer message.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedFields {
    pub name: Option<String>,
    pub zone: Option<String>,
    pub intent_summary: Option<String>,
    pub availability: Option<String>,
}

impl ExtractedFields {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.zone.is_none()
            && self.intent_summary.is_none()
            && self.availability.is_none()
    }
}

/// The structured output produced per processed inbound message.
///
/// Ephemeral by design: a decision is consumed by the qualification policy
/// and never persisted as an entity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Decision {
    pub reply: String,
    pub fields: ExtractedFields,
    pub intent: Option<HandoffKind>,
}

impl Decision {
    pub fn reply_only(reply: impl Into<String>) -> Self {
        Self { reply: reply.into(), fields: ExtractedFields::default(), intent: None }
    }
}
