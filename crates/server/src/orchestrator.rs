use std::sync::Arc;

use tracing::{error, info, warn};

use telar_agent::DecisionEngine;
use telar_core::domain::conversation::{Conversation, MessageOrigin};
use telar_core::errors::ApplicationError;
use telar_core::policy::{QualificationPolicy, POST_HANDOFF_ACK};
use telar_core::store::ConversationStore;
use telar_core::transcript::TranscriptWriter;
use telar_wa::outbound::MessageSender;

use crate::notifier::HandoffNotifier;

/// Drives one queued unit of work: everything that happens between "an
/// inbound message was dequeued" and "the customer got a reply".
///
/// All conversation mutation in the system goes through here, always inside
/// the sender's serial-queue slot.
pub struct Orchestrator {
    store: Arc<ConversationStore>,
    engine: DecisionEngine,
    policy: QualificationPolicy,
    transcripts: TranscriptWriter,
    sender: Arc<dyn MessageSender>,
    notifier: HandoffNotifier,
    operator_number: Option<String>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<ConversationStore>,
        engine: DecisionEngine,
        transcripts: TranscriptWriter,
        sender: Arc<dyn MessageSender>,
        notifier: HandoffNotifier,
        operator_number: Option<String>,
    ) -> Self {
        Self {
            store,
            engine,
            policy: QualificationPolicy,
            transcripts,
            sender,
            notifier,
            operator_number,
        }
    }

    /// Task body for the serial queue. Never propagates an error: any
    /// processing failure is downgraded to a system log entry plus a
    /// degraded reply, so the customer never faces silence.
    pub async fn process_inbound(&self, sender_id: &str, text: &str) {
        let handed_off = self.store.with_conversation(sender_id, |conversation| {
            conversation.handed_off
        });

        let result = if handed_off {
            self.process_post_handoff(sender_id, text).await
        } else {
            self.process_active(sender_id, text).await
        };

        if let Err(err) = result {
            error!(
                event_name = "orchestrator.task_failed",
                sender_id = %sender_id,
                error = %err,
                "queued task failed, sending degraded reply"
            );
            let (reply, snapshot) = self.store.with_conversation(sender_id, |conversation| {
                conversation.push(MessageOrigin::System, format!("processing failure: {err}"));
                let reply = self.policy.technical_issue_reply(conversation);
                conversation.push(MessageOrigin::Assistant, reply.clone());
                (reply, conversation.clone())
            });
            self.persist(&snapshot);
            self.deliver_reply(sender_id, &reply).await;
        }
    }

    async fn process_active(&self, sender_id: &str, text: &str) -> Result<(), ApplicationError> {
        // The decision runs over the state as it was before this message;
        // the inbound text travels separately in the prompt.
        let (before, after_inbound) = self.store.with_conversation(sender_id, |conversation| {
            let before = conversation.clone();
            conversation.push(MessageOrigin::Customer, text);
            (before, conversation.clone())
        });
        self.persist(&after_inbound);

        let decision = self.engine.decide(&before, text).await;

        let (outcome, snapshot) = self.store.with_conversation(sender_id, |conversation| {
            let outcome = self.policy.apply(conversation, &decision);
            conversation.push(MessageOrigin::Assistant, outcome.reply.clone());
            (outcome, conversation.clone())
        });
        self.persist(&snapshot);

        info!(
            event_name = "orchestrator.turn_processed",
            sender_id = %sender_id,
            handoff_now = outcome.handoff_now,
            pending = snapshot.pending_handoff.is_some(),
            "inbound message processed"
        );

        self.deliver_reply(sender_id, &outcome.reply).await;

        if outcome.handoff_now {
            if let Some(kind) = outcome.kind {
                self.notifier.notify(sender_id, text, kind).await;
            }
        }
        Ok(())
    }

    /// Terminal-state behavior: fixed acknowledgment, no inference, and at
    /// most one low-priority forward of the raw text to the operator.
    async fn process_post_handoff(
        &self,
        sender_id: &str,
        text: &str,
    ) -> Result<(), ApplicationError> {
        let snapshot = self.store.with_conversation(sender_id, |conversation| {
            conversation.push(MessageOrigin::Customer, text);
            conversation.push(MessageOrigin::Assistant, POST_HANDOFF_ACK);
            conversation.clone()
        });
        self.persist(&snapshot);

        self.deliver_reply(sender_id, POST_HANDOFF_ACK).await;

        if let Some(operator) = self.operator_number.as_deref() {
            let notice = format!("Mensaje post-derivación de {sender_id}: {text}");
            if let Err(err) = self.sender.send(operator, &notice).await {
                warn!(
                    event_name = "orchestrator.forward_failed",
                    sender_id = %sender_id,
                    error = %err,
                    "post-handoff forward was not delivered"
                );
            }
        }
        Ok(())
    }

    /// Outbound replies are fire-and-forget: a delivery failure is recorded
    /// in the conversation's system trail and never blocks forward progress.
    async fn deliver_reply(&self, sender_id: &str, reply: &str) {
        if let Err(err) = self.sender.send(sender_id, reply).await {
            warn!(
                event_name = "orchestrator.reply_failed",
                sender_id = %sender_id,
                error = %err,
                "reply was not delivered"
            );
            let snapshot = self.store.with_conversation(sender_id, |conversation| {
                conversation.push(MessageOrigin::System, format!("reply delivery failed: {err}"));
                conversation.clone()
            });
            self.persist(&snapshot);
        }
    }

    /// Transcript IO is best effort: a failed write is logged and the turn
    /// proceeds.
    fn persist(&self, snapshot: &Conversation) {
        if let Err(err) = self.transcripts.write(snapshot) {
            error!(
                event_name = "transcript.write_failed",
                sender_id = %snapshot.sender_id,
                error = %err,
                "could not persist transcript"
            );
        }
    }
}
