//! Normalized inbound events.
//!
//! The provider-specific webhook crate maps raw payloads into these shapes;
//! the reconciler consumes them without knowing the wire format.

use crate::message_log::MessageStatus;

/// Body of an inbound content event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentKind {
    Text { body: String },
    ButtonReply { id: String, title: String },
}

/// One event extracted from a provider webhook delivery.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    /// Delivery-status update for a message we previously sent.
    Status {
        provider_message_id: String,
        status: MessageStatus,
    },
    /// A message from a learner (free text or a quick-reply tap).
    Content {
        from: String,
        provider_message_id: String,
        kind: ContentKind,
    },
}
