//! Inbound event reconciler.
//!
//! Consumes normalized provider events: status updates move message-log
//! records forward along their lifecycle; learner replies are persisted and
//! answered — quiz button taps are resolved against the active quiz context
//! and a follow-up `text` job is enqueued with feedback from the reply
//! composer, free text gets a composed acknowledgment the same way.
//!
//! Intake is a bounded channel drained by a dedicated task, keeping event
//! processing out of the webhook request cycle.

pub mod error;
pub mod quiz;
pub mod quiz_memory;
pub mod quiz_sqlite;
pub mod reply;
pub mod service;

pub use {
    error::{Error, Result},
    quiz::{QuizContext, QuizContextStore},
    reply::ReplyComposer,
    service::{EventSubmitter, Reconciler},
};

/// Run database migrations for the reconciler.
///
/// Creates the `quiz_contexts` table. Call at application startup when using
/// [`quiz_sqlite::SqliteQuizContextStore`] on a shared pool.
pub async fn run_migrations(pool: &sqlx::SqlitePool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .set_ignore_missing(true)
        .run(pool)
        .await?;
    Ok(())
}
