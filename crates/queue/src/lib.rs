//! Durable, deduplicating job queue with bounded throughput and retries.
//!
//! One named queue per message category. The enqueuer computes a
//! deterministic fingerprint per job and guarantees at most one live job per
//! fingerprint; workers take jobs under a per-category fixed-window rate
//! limit; failures are retried with exponential backoff until the attempt cap
//! and then parked in `exhausted` for operator inspection.

pub mod error;
pub mod fingerprint;
pub mod limiter;
pub mod service;
pub mod store;
pub mod store_memory;
pub mod store_sqlite;
pub mod sweeper;
pub mod types;

pub use {
    error::{Error, Result},
    service::{JobQueue, QueueTuning},
    store::{JobFilter, JobStore},
    sweeper::{AuxiliarySweep, RetentionSweeper, SweepReport},
    types::{
        Enqueued, FailureKind, Job, JobCategory, JobPayload, JobState, LessonQuiz, QuizOption,
        RetryPolicy,
    },
};

/// Run database migrations for the job queue.
///
/// Creates the `jobs` table and its live-fingerprint index. Call at
/// application startup when using [`store_sqlite::SqliteJobStore`] on a
/// shared pool.
pub async fn run_migrations(pool: &sqlx::SqlitePool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .set_ignore_missing(true)
        .run(pool)
        .await?;
    Ok(())
}
