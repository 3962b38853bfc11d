//! Persistent record of every outbound/inbound message.

use {
    async_trait::async_trait,
    serde::{Deserialize, Serialize},
};

use crate::Result;

/// Which way the message travelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Incoming,
    Outgoing,
}

impl Direction {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Incoming => "incoming",
            Self::Outgoing => "outgoing",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "incoming" => Some(Self::Incoming),
            "outgoing" => Some(Self::Outgoing),
            _ => None,
        }
    }
}

/// Provider-defined delivery lifecycle of a message.
///
/// Outgoing messages move forward only: `sent → delivered → read`, or
/// `sent → failed`. Incoming messages are `received` and never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Sent,
    Delivered,
    Read,
    Failed,
    Received,
}

impl MessageStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Read => "read",
            Self::Failed => "failed",
            Self::Received => "received",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "sent" => Some(Self::Sent),
            "delivered" => Some(Self::Delivered),
            "read" => Some(Self::Read),
            "failed" => Some(Self::Failed),
            "received" => Some(Self::Received),
            _ => None,
        }
    }

    /// Whether a transition from `self` to `next` moves forward along the
    /// lifecycle. Everything else is ignored by the reconciler.
    #[must_use]
    pub fn can_advance_to(self, next: Self) -> bool {
        match (self, next) {
            (Self::Sent, Self::Delivered | Self::Read | Self::Failed) => true,
            (Self::Delivered, Self::Read) => true,
            _ => false,
        }
    }
}

/// A single logged message, keyed by the provider-assigned id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub provider_message_id: String,
    pub direction: Direction,
    /// Message category (job category for outgoing, content kind for incoming).
    pub category: String,
    pub recipient: String,
    pub body: String,
    pub status: MessageStatus,
    pub course_id: Option<String>,
    pub lesson_id: Option<String>,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
}

/// Outcome of a status-advance attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusAdvance {
    /// The transition was forward and has been applied.
    Advanced,
    /// The record exists but the transition would move backward; ignored.
    NotForward,
    /// No record with that provider id — the caller logs and drops.
    Unknown,
}

/// Persistence seam for the message log.
///
/// The pipeline only creates records and advances their status; deletion is
/// an administrative operation outside this interface.
#[async_trait]
pub trait MessageLog: Send + Sync {
    async fn record(&self, record: MessageRecord) -> Result<()>;
    async fn get(&self, provider_message_id: &str) -> Result<Option<MessageRecord>>;
    /// Apply `status` if the transition is forward-only, atomically.
    async fn advance_status(
        &self,
        provider_message_id: &str,
        status: MessageStatus,
        now_ms: u64,
    ) -> Result<StatusAdvance>;
    async fn recent(&self, limit: u32) -> Result<Vec<MessageRecord>>;
}
