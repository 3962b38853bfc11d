//! Outbound delivery seam.
//!
//! One send call delivers one content item to one recipient and returns the
//! provider-assigned message id. Failures carry a classification that drives
//! the queue's retry policy: transient failures are retried with backoff,
//! permanent ones exhaust the job immediately.

use async_trait::async_trait;

/// How a delivery failure should be treated by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Network trouble, timeout, throttling, provider 5xx — worth retrying.
    Transient,
    /// Provider 4xx or malformed content — retrying cannot succeed.
    Permanent,
}

/// A delivery failure with its retry classification.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("delivery timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("network error: {message}")]
    Network { message: String },

    #[error("provider rejected send ({status}): {message}")]
    Provider { status: u16, message: String },

    #[error("invalid outbound content: {message}")]
    InvalidContent { message: String },
}

impl DeliveryError {
    #[must_use]
    pub fn network(message: impl std::fmt::Display) -> Self {
        Self::Network {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn invalid_content(message: impl std::fmt::Display) -> Self {
        Self::InvalidContent {
            message: message.to_string(),
        }
    }

    /// Classify this failure for the retry policy.
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Timeout { .. } | Self::Network { .. } => ErrorClass::Transient,
            // 429 is the provider telling us to slow down, not to give up.
            Self::Provider { status, .. } if *status == 429 || *status >= 500 => {
                ErrorClass::Transient
            },
            Self::Provider { .. } | Self::InvalidContent { .. } => ErrorClass::Permanent,
        }
    }
}

/// One option of an interactive quick-reply message.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ButtonOption {
    pub id: String,
    pub label: String,
}

/// A single outbound content item.
///
/// A job may expand into several items (a lesson body, then its media, then
/// its quiz buttons); each item is one provider send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundContent {
    Text {
        body: String,
    },
    Media {
        url: String,
        caption: Option<String>,
    },
    Buttons {
        body: String,
        options: Vec<ButtonOption>,
    },
}

/// Synchronous send seam to the messaging provider.
#[async_trait]
pub trait DeliveryClient: Send + Sync {
    /// Deliver one content item; returns the provider-assigned message id.
    async fn send(
        &self,
        recipient: &str,
        content: &OutboundContent,
    ) -> Result<String, DeliveryError>;
}
