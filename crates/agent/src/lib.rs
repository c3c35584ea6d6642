//! Agent runtime - resilient inference over customer conversations.
//!
//! This crate turns one inbound customer message plus the conversation's
//! current state into a [`Decision`](telar_core::Decision), and it never
//! fails past its boundary:
//!
//! 1. **Primary attempt** (`llm`) - the configured model, bounded by the
//!    primary deadline.
//! 2. **Degraded retry** (`engine`) - after a soft failure (timeout,
//!    transport error, unparseable output), exactly one retry with a cheaper
//!    model and a strictly shorter deadline.
//! 3. **Local fallback** (`fallback`) - a deterministic, lexical
//!    classification that asks for exactly one missing field. No provider
//!    call is made.
//!
//! The model is strictly a translator: it drafts replies and extracts
//! fields, but handoff readiness and the confirmation copy are decided by
//! the deterministic policy in `telar-core`.

pub mod engine;
pub mod fallback;
pub mod llm;
pub mod prompt;

pub use engine::DecisionEngine;
pub use llm::{HttpLlmClient, LlmClient, LlmError, LlmRequest, ScriptedLlmClient};
pub use prompt::PromptBuilder;
