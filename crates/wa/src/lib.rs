//! Messaging-carrier boundary.
//!
//! Thin, replaceable adapters around the WhatsApp-style carrier API: inbound
//! webhook payload normalization (including the subscription verification
//! handshake) and the outbound send contract. Nothing here owns conversation
//! state; the orchestrator treats both directions as fire-and-forget.

pub mod inbound;
pub mod outbound;

pub use inbound::{normalize_payload, verify_subscription, InboundMessage, WebhookPayload};
pub use outbound::{HttpMessageSender, MessageSender, NoopMessageSender, SendError};
