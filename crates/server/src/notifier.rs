use std::sync::Arc;

use tracing::{error, info, warn};

use telar_core::domain::conversation::{Conversation, HandoffKind, MessageOrigin, QualField};
use telar_core::store::ConversationStore;
use telar_core::transcript::TranscriptWriter;
use telar_wa::outbound::MessageSender;

/// Emits the one-time operator notification and freezes the conversation
/// into post-handoff mode.
pub struct HandoffNotifier {
    store: Arc<ConversationStore>,
    transcripts: TranscriptWriter,
    sender: Arc<dyn MessageSender>,
    operator_number: Option<String>,
}

impl HandoffNotifier {
    pub fn new(
        store: Arc<ConversationStore>,
        transcripts: TranscriptWriter,
        sender: Arc<dyn MessageSender>,
        operator_number: Option<String>,
    ) -> Self {
        Self { store, transcripts, sender, operator_number }
    }

    /// Idempotent: a no-op when the conversation is already handed off.
    ///
    /// Sets `handed_off`, persists the tagged snapshot, and notifies the
    /// operator. A delivery failure is recorded as a system entry and never
    /// rolls back the handoff; the customer already got their confirmation.
    pub async fn notify(&self, sender_id: &str, triggering_text: &str, kind: HandoffKind) {
        let snapshot = self.store.with_conversation(sender_id, |conversation| {
            if conversation.handed_off {
                return None;
            }
            conversation.handed_off = true;
            conversation.pending_handoff = None;
            Some(conversation.clone())
        });
        let Some(snapshot) = snapshot else {
            return;
        };

        // Write-through: the sender's transcript must reflect the flip
        // immediately, not on the next inbound message.
        if let Err(err) = self.transcripts.write(&snapshot) {
            error!(
                event_name = "transcript.write_failed",
                sender_id = %sender_id,
                error = %err,
                "could not persist transcript"
            );
        }

        let snapshot_ref = match self.transcripts.write_handoff_snapshot(&snapshot, kind) {
            Ok(path) => path.display().to_string(),
            Err(err) => {
                error!(
                    event_name = "handoff.snapshot.write_failed",
                    sender_id = %sender_id,
                    error = %err,
                    "could not persist handoff snapshot"
                );
                "(snapshot unavailable)".to_string()
            }
        };

        info!(
            event_name = "handoff.executed",
            sender_id = %sender_id,
            kind = kind.label(),
            "conversation handed off to operator"
        );

        let Some(operator) = self.operator_number.as_deref() else {
            warn!(
                event_name = "handoff.notification.skipped",
                sender_id = %sender_id,
                "no operator destination configured, skipping notification"
            );
            return;
        };

        let notification = render_notification(&snapshot, triggering_text, kind, &snapshot_ref);
        if let Err(err) = self.sender.send(operator, &notification).await {
            warn!(
                event_name = "handoff.notification.failed",
                sender_id = %sender_id,
                error = %err,
                "operator notification was not delivered"
            );
            let snapshot = self.store.with_conversation(sender_id, |conversation| {
                conversation
                    .push(MessageOrigin::System, format!("operator notification failed: {err}"));
                conversation.clone()
            });
            if let Err(err) = self.transcripts.write(&snapshot) {
                error!(
                    event_name = "transcript.write_failed",
                    sender_id = %sender_id,
                    error = %err,
                    "could not persist transcript"
                );
            }
        }
    }
}

fn render_notification(
    conversation: &Conversation,
    triggering_text: &str,
    kind: HandoffKind,
    snapshot_ref: &str,
) -> String {
    let motive = match kind {
        HandoffKind::Price => "pide presupuesto",
        HandoffKind::Visit => "pide coordinar visita",
    };
    let mut out = format!(
        "Nuevo cliente calificado ({motive})\nTeléfono: {}\n",
        conversation.sender_id
    );
    for field in QualField::PRIORITY {
        if let Some(value) = conversation.field(field) {
            out.push_str(&format!("{}: {value}\n", field.label()));
        }
    }
    out.push_str(&format!("Último mensaje: {triggering_text}\n"));
    out.push_str(&format!("Transcript: {snapshot_ref}"));
    out
}
