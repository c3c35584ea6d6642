//! Core domain for the Telar lead-qualification orchestrator.
//!
//! This crate owns everything that must stay deterministic and testable
//! without a network: the conversation entity and its invariants, the
//! in-memory store, the qualification/handoff policy, the transcript
//! writer, configuration loading, and the shared error taxonomy.
//!
//! # Invariants enforced here
//!
//! - Qualification fields are write-once: the first non-empty value wins
//!   and later extractions never overwrite it.
//! - The message log is append-only and chronologically ordered.
//! - `handed_off` only ever transitions `false -> true`.
//! - Handoff readiness is a pure function of the collected fields and the
//!   active handoff kind (a price request needs name + zone + intent
//!   summary; a visit additionally needs availability).

pub mod config;
pub mod domain;
pub mod errors;
pub mod policy;
pub mod store;
pub mod transcript;

pub use config::{AppConfig, ConfigError, LoadOptions, LogFormat};
pub use domain::conversation::{
    Conversation, HandoffKind, Message, MessageOrigin, PendingHandoff, QualField,
};
pub use domain::decision::{Decision, ExtractedFields};
pub use errors::{ApplicationError, DomainError};
pub use policy::{PolicyOutcome, QualificationPolicy};
pub use store::{ConversationStore, ConversationSummary};
pub use transcript::{TranscriptError, TranscriptWriter};
