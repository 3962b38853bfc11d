//! Canned reply composer.
//!
//! Stands in for the external text-generation collaborator. Deterministic
//! templates keep the pipeline's dedup behavior predictable: the same quiz
//! answer always produces the same feedback text, so repeated taps collapse
//! onto one follow-up job.

use async_trait::async_trait;

use lernio_reconcile::{QuizContext, ReplyComposer};

/// Template-based composer used when no AI backend is wired in.
pub struct TemplateComposer;

#[async_trait]
impl ReplyComposer for TemplateComposer {
    async fn quiz_feedback(
        &self,
        context: &QuizContext,
        _selected_option_id: &str,
        correct: bool,
    ) -> anyhow::Result<String> {
        Ok(if correct {
            format!(
                "That's right! Nice work on lesson {}. The next lesson is on its way soon.",
                context.lesson_id
            )
        } else {
            format!(
                "Not quite — have another look at lesson {} and try again tomorrow.",
                context.lesson_id
            )
        })
    }

    async fn free_reply(&self, _from: &str, _text: &str) -> anyhow::Result<String> {
        Ok("Thanks for your message! Your course continues automatically; reply to a quiz \
            to check your understanding."
            .to_string())
    }
}
