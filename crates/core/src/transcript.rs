//! Durable text transcripts.
//!
//! One file per sender, overwritten after every state mutation, plus one
//! immutable snapshot per handoff event. Transcript IO is best effort: the
//! caller logs a failure and moves on, it never blocks a conversation.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use thiserror::Error;

use crate::domain::conversation::{Conversation, HandoffKind, QualField};

#[derive(Debug, Error)]
pub enum TranscriptError {
    #[error("could not create transcript directory `{path}`: {source}")]
    CreateDir { path: PathBuf, source: std::io::Error },
    #[error("could not write transcript `{path}`: {source}")]
    Write { path: PathBuf, source: std::io::Error },
}

#[derive(Clone, Debug)]
pub struct TranscriptWriter {
    dir: PathBuf,
}

impl TranscriptWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Overwrites the sender's transcript with the full current state.
    pub fn write(&self, conversation: &Conversation) -> Result<PathBuf, TranscriptError> {
        self.ensure_dir()?;
        let path = self.dir.join(format!("{}.txt", conversation.sender_id));
        self.write_file(&path, &render(conversation))?;
        Ok(path)
    }

    /// Writes the immutable snapshot that accompanies a handoff. The file
    /// name carries a timestamp, the handoff kind, and sanitized identity
    /// fields so operators can find it without opening anything.
    pub fn write_handoff_snapshot(
        &self,
        conversation: &Conversation,
        kind: HandoffKind,
    ) -> Result<PathBuf, TranscriptError> {
        self.ensure_dir()?;
        let stamp = Utc::now().format("%Y%m%d-%H%M%S");
        let name = sanitize(conversation.name.as_deref().unwrap_or("sin-nombre"));
        let zone = sanitize(conversation.zone.as_deref().unwrap_or("sin-zona"));
        let path =
            self.dir.join(format!("handoff-{stamp}-{}-{name}-{zone}.txt", kind.label()));
        self.write_file(&path, &render(conversation))?;
        Ok(path)
    }

    fn ensure_dir(&self) -> Result<(), TranscriptError> {
        fs::create_dir_all(&self.dir)
            .map_err(|source| TranscriptError::CreateDir { path: self.dir.clone(), source })
    }

    fn write_file(&self, path: &Path, contents: &str) -> Result<(), TranscriptError> {
        fs::write(path, contents)
            .map_err(|source| TranscriptError::Write { path: path.to_path_buf(), source })
    }
}

fn render(conversation: &Conversation) -> String {
    let mut out = String::new();
    out.push_str(&format!("sender: {}\n", conversation.sender_id));
    out.push_str(&format!("created: {}\n", conversation.created_at.to_rfc3339()));
    for field in QualField::PRIORITY {
        out.push_str(&format!(
            "{}: {}\n",
            field.label(),
            conversation.field(field).unwrap_or("-")
        ));
    }
    out.push_str(&format!("handed_off: {}\n", conversation.handed_off));
    match conversation.pending_handoff.as_ref() {
        Some(pending) => out.push_str(&format!(
            "pending_handoff: {} (since {})\n",
            pending.kind.label(),
            pending.requested_at.to_rfc3339()
        )),
        None => out.push_str("pending_handoff: -\n"),
    }
    out.push_str("---\n");
    for message in &conversation.messages {
        out.push_str(&format!(
            "[{}] {}: {}\n",
            message.at.to_rfc3339(),
            message.origin.label(),
            message.text
        ));
    }
    out
}

fn sanitize(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut last_dash = true;
    for ch in value.to_lowercase().chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch);
            last_dash = false;
        } else if !last_dash {
            out.push('-');
            last_dash = true;
        }
    }
    let trimmed = out.trim_matches('-').to_string();
    if trimmed.is_empty() {
        "sin-dato".to_string()
    } else {
        trimmed
    }
}
