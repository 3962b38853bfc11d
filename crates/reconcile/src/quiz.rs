//! Active quiz contexts.
//!
//! When a lesson with a quiz is delivered, the worker registers the correct
//! answer under the recipient; a later button tap is resolved against it.
//! At most one context is active per recipient (a newer quiz replaces the
//! older one), and contexts expire so stale taps fall back to free-text
//! handling. Expired rows are purged by the retention sweeper.

use {
    async_trait::async_trait,
    serde::{Deserialize, Serialize},
};

use crate::Result;

/// The quiz a recipient is currently expected to answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizContext {
    pub recipient: String,
    pub course_id: String,
    pub lesson_id: String,
    pub correct_option_id: String,
    pub expires_at_ms: u64,
}

/// Persistence seam for quiz contexts.
#[async_trait]
pub trait QuizContextStore: Send + Sync {
    /// Register a context, replacing any prior one for the recipient.
    async fn put(&self, context: QuizContext) -> Result<()>;

    /// The unexpired context for a recipient, if any. Non-consuming:
    /// repeated taps resolve identically and dedupe at the enqueuer.
    async fn get_active(&self, recipient: &str, now_ms: u64) -> Result<Option<QuizContext>>;

    /// Delete expired contexts; returns how many were purged.
    async fn purge_expired(&self, now_ms: u64) -> Result<u64>;
}
