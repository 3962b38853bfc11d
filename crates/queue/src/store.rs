//! Persistence trait for the job queue.
//!
//! Every method that moves a job between states is a single atomic operation
//! against the backing store; the dedup check, the in-flight claim, and the
//! ack/fail transitions never race between concurrent workers.

use async_trait::async_trait;

use crate::{
    Result,
    types::{Job, JobCategory, JobState},
};

/// Listing filter for the operator API.
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub category: Option<JobCategory>,
    pub state: Option<JobState>,
    pub limit: u32,
}

/// Persistence backend for jobs.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Check-and-insert: store the job unless a live job with the same
    /// (category, fingerprint) exists. Returns whether it was inserted.
    async fn insert_if_no_live(&self, job: &Job) -> Result<bool>;

    /// Claim up to `n` due jobs of a category, atomically marking them
    /// in-flight. A job is due when queued, or retry-pending with
    /// `scheduled_at_ms <= now_ms`.
    async fn claim_due(&self, category: JobCategory, n: u32, now_ms: u64) -> Result<Vec<Job>>;

    async fn get(&self, id: &str) -> Result<Option<Job>>;

    /// in-flight → completed. Errors if the job is not in-flight.
    async fn mark_completed(&self, id: &str, now_ms: u64) -> Result<()>;

    /// in-flight → retry-pending at `scheduled_at_ms`. Errors if the job is
    /// not in-flight.
    async fn mark_retry(
        &self,
        id: &str,
        attempt_count: u32,
        scheduled_at_ms: u64,
        error: &str,
        now_ms: u64,
    ) -> Result<()>;

    /// in-flight → exhausted. Errors if the job is not in-flight.
    async fn mark_exhausted(
        &self,
        id: &str,
        attempt_count: u32,
        error: &str,
        now_ms: u64,
    ) -> Result<()>;

    async fn list(&self, filter: JobFilter) -> Result<Vec<Job>>;

    /// Move every in-flight job back to queued. Startup recovery after a
    /// crash or hard shutdown left claims behind; returns how many moved.
    async fn requeue_in_flight(&self, now_ms: u64) -> Result<u64>;

    /// Keep only the most recent `keep` terminal jobs per outcome within a
    /// category; returns how many were deleted.
    async fn trim_terminal(&self, category: JobCategory, keep: u32) -> Result<u64>;

    /// Delete terminal jobs older than `cutoff_ms`, sparing jobs whose course
    /// is in `excluded_course_ids` (active scheduling runs).
    async fn sweep_terminal(&self, cutoff_ms: u64, excluded_course_ids: &[String]) -> Result<u64>;
}
