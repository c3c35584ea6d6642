use thiserror::Error;

use crate::transcript::TranscriptError;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

/// Failures that can surface from a queued processing task. None of these
/// ever reach the customer as an error; the orchestrator converts them into
/// a system log entry plus a degraded reply.
#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Transcript(#[from] TranscriptError),
    #[error("outbound delivery failure: {0}")]
    Delivery(String),
    #[error("integration failure: {0}")]
    Integration(String),
}
