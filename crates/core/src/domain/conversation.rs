use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::decision::ExtractedFields;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageOrigin {
    Customer,
    Assistant,
    System,
}

impl MessageOrigin {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Customer => "customer",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub at: DateTime<Utc>,
    pub origin: MessageOrigin,
    pub text: String,
}

/// The two customer intents that trigger a handoff to a human operator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandoffKind {
    Price,
    Visit,
}

impl HandoffKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Price => "price",
            Self::Visit => "visit",
        }
    }

    /// A visit request additionally needs the customer's availability.
    pub fn requires_availability(&self) -> bool {
        matches!(self, Self::Visit)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingHandoff {
    pub kind: HandoffKind,
    pub requested_at: DateTime<Utc>,
}

/// Qualification fields in the fixed priority order used whenever the
/// assistant has to ask for exactly one missing field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualField {
    IntentSummary,
    Name,
    Zone,
    Availability,
}

impl QualField {
    pub const PRIORITY: [QualField; 4] =
        [Self::IntentSummary, Self::Name, Self::Zone, Self::Availability];

    pub fn label(&self) -> &'static str {
        match self {
            Self::IntentSummary => "intent_summary",
            Self::Name => "name",
            Self::Zone => "zone",
            Self::Availability => "availability",
        }
    }

    /// The single clarifying question the assistant asks for this field.
    pub fn question(&self) -> &'static str {
        match self {
            Self::IntentSummary => {
                "¿Qué tipo de cortinas estás buscando y para qué ambiente son?"
            }
            Self::Name => "¿Me decís tu nombre para avanzar con la consulta?",
            Self::Zone => "¿En qué zona o barrio estás?",
            Self::Availability => {
                "¿Qué días y horarios te quedan cómodos para coordinar la visita?"
            }
        }
    }
}

/// Full state tracked for one customer across all turns.
///
/// Owned exclusively by the [`ConversationStore`](crate::store::ConversationStore);
/// lives for the process lifetime and is only ever mutated from inside the
/// per-sender serial queue.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub sender_id: String,
    pub name: Option<String>,
    pub zone: Option<String>,
    pub intent_summary: Option<String>,
    pub availability: Option<String>,
    pub messages: Vec<Message>,
    pub handed_off: bool,
    pub pending_handoff: Option<PendingHandoff>,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new(sender_id: impl Into<String>) -> Self {
        Self {
            sender_id: sender_id.into(),
            name: None,
            zone: None,
            intent_summary: None,
            availability: None,
            messages: Vec::new(),
            handed_off: false,
            pending_handoff: None,
            created_at: Utc::now(),
        }
    }

    /// Appends a message, keeping timestamps monotone within the log.
    pub fn push(&mut self, origin: MessageOrigin, text: impl Into<String>) {
        let mut at = Utc::now();
        if let Some(last) = self.messages.last() {
            if at < last.at {
                at = last.at;
            }
        }
        self.messages.push(Message { at, origin, text: text.into() });
    }

    pub fn field(&self, field: QualField) -> Option<&str> {
        match field {
            QualField::IntentSummary => self.intent_summary.as_deref(),
            QualField::Name => self.name.as_deref(),
            QualField::Zone => self.zone.as_deref(),
            QualField::Availability => self.availability.as_deref(),
        }
    }

    /// Merges extracted fields with first-non-empty-wins semantics and
    /// returns which fields were newly populated.
    ///
    /// Values are trimmed; blank strings count as absent. A field that is
    /// already populated is never overwritten.
    pub fn merge_fields(&mut self, fields: &ExtractedFields) -> Vec<QualField> {
        let mut newly_set = Vec::new();
        for field in QualField::PRIORITY {
            let incoming = match field {
                QualField::IntentSummary => fields.intent_summary.as_deref(),
                QualField::Name => fields.name.as_deref(),
                QualField::Zone => fields.zone.as_deref(),
                QualField::Availability => fields.availability.as_deref(),
            };
            let Some(value) = incoming.map(str::trim).filter(|value| !value.is_empty()) else {
                continue;
            };
            if self.field(field).is_some() {
                continue;
            }
            let value = value.to_string();
            match field {
                QualField::IntentSummary => self.intent_summary = Some(value),
                QualField::Name => self.name = Some(value),
                QualField::Zone => self.zone = Some(value),
                QualField::Availability => self.availability = Some(value),
            }
            newly_set.push(field);
        }
        newly_set
    }

    /// Missing required fields for the given handoff kind, in priority order.
    pub fn missing_fields(&self, kind: HandoffKind) -> Vec<QualField> {
        QualField::PRIORITY
            .into_iter()
            .filter(|field| {
                *field != QualField::Availability || kind.requires_availability()
            })
            .filter(|field| self.field(*field).is_none())
            .collect()
    }

    pub fn is_ready(&self, kind: HandoffKind) -> bool {
        self.missing_fields(kind).is_empty()
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        self.messages.last().map(|message| message.at).unwrap_or(self.created_at)
    }
}
