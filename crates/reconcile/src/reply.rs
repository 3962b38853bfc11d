//! Reply-composition seam.
//!
//! Feedback and acknowledgment text comes from an external text-generation
//! collaborator; the pipeline treats it as an opaque text producer.

use async_trait::async_trait;

use crate::quiz::QuizContext;

/// Produces the text of follow-up replies.
#[async_trait]
pub trait ReplyComposer: Send + Sync {
    /// Feedback for a resolved quiz answer.
    async fn quiz_feedback(
        &self,
        context: &QuizContext,
        selected_option_id: &str,
        correct: bool,
    ) -> anyhow::Result<String>;

    /// Acknowledgment/reply for free-form learner text.
    async fn free_reply(&self, from: &str, text: &str) -> anyhow::Result<String>;
}
