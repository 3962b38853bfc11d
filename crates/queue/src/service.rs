//! The queue service: deduplicating enqueue, rate-limited take, ack/fail.

use std::{collections::HashMap, sync::Arc, time::Duration};

use {
    tokio::sync::Mutex,
    tracing::{debug, info, warn},
};

#[cfg(feature = "metrics")]
use lernio_metrics::{counter, queue as queue_metrics};

use lernio_common::time::now_ms;

use crate::{
    Result,
    limiter::{Admission, FixedWindowLimiter},
    store::{JobFilter, JobStore},
    types::{Enqueued, FailureKind, Job, JobCategory, JobPayload, JobState, RetryPolicy},
};

/// Queue behavior knobs, usually mapped from the application config.
#[derive(Debug, Clone)]
pub struct QueueTuning {
    /// In-flight admissions per category per one-second window.
    pub rate_per_sec: u32,
    pub retry: RetryPolicy,
    /// Terminal jobs kept per (category, outcome) for operator inspection.
    pub keep_per_outcome: u32,
}

impl Default for QueueTuning {
    fn default() -> Self {
        Self {
            rate_per_sec: 12,
            retry: RetryPolicy::default(),
            keep_per_outcome: 5,
        }
    }
}

/// Named, durable queues — one per category — sharing a store.
///
/// All state transitions go through single atomic store operations; the
/// per-category rate limiter meters how fast workers may move jobs to
/// in-flight.
pub struct JobQueue {
    store: Arc<dyn JobStore>,
    tuning: QueueTuning,
    limiters: Mutex<HashMap<JobCategory, FixedWindowLimiter>>,
}

impl JobQueue {
    pub fn new(store: Arc<dyn JobStore>, tuning: QueueTuning) -> Arc<Self> {
        Arc::new(Self {
            store,
            tuning,
            limiters: Mutex::new(HashMap::new()),
        })
    }

    /// Idempotent enqueue: validates the payload, computes the fingerprint,
    /// and inserts unless a live job with the same fingerprint exists.
    pub async fn enqueue(&self, payload: JobPayload) -> Result<Enqueued> {
        payload.validate()?;

        let job = Job::new(payload, now_ms());
        let inserted = self.store.insert_if_no_live(&job).await?;

        if inserted {
            #[cfg(feature = "metrics")]
            counter!(queue_metrics::ENQUEUED_TOTAL).increment(1);
            debug!(
                id = %job.id,
                category = job.category.as_str(),
                fingerprint = %job.fingerprint,
                "job enqueued"
            );
            Ok(Enqueued {
                accepted: true,
                job_id: Some(job.id),
            })
        } else {
            #[cfg(feature = "metrics")]
            counter!(queue_metrics::DEDUPED_TOTAL).increment(1);
            debug!(
                category = job.category.as_str(),
                fingerprint = %job.fingerprint,
                "duplicate enqueue ignored (live job exists)"
            );
            Ok(Enqueued {
                accepted: false,
                job_id: None,
            })
        }
    }

    /// Take up to `n` due jobs, each admission metered by the category's
    /// rate limiter. A full window delays the take until the window turns;
    /// an empty queue returns early with whatever was claimed.
    pub async fn take(&self, category: JobCategory, n: u32) -> Result<Vec<Job>> {
        let mut taken = Vec::new();

        while (taken.len() as u32) < n {
            let admission = {
                let mut limiters = self.limiters.lock().await;
                limiters
                    .entry(category)
                    .or_insert_with(|| FixedWindowLimiter::new(self.tuning.rate_per_sec))
                    .try_admit(now_ms())
            };

            match admission {
                Admission::Deferred { retry_at_ms } => {
                    #[cfg(feature = "metrics")]
                    counter!(queue_metrics::RATE_DEFERRED_TOTAL).increment(1);
                    let wait = retry_at_ms.saturating_sub(now_ms());
                    debug!(
                        category = category.as_str(),
                        wait_ms = wait,
                        "rate window full, deferring take"
                    );
                    tokio::time::sleep(Duration::from_millis(wait.max(1))).await;
                },
                Admission::Granted => {
                    let mut claimed = self.store.claim_due(category, 1, now_ms()).await?;
                    match claimed.pop() {
                        Some(job) => taken.push(job),
                        None => {
                            // Nothing due — hand the admission back.
                            self.limiters
                                .lock()
                                .await
                                .entry(category)
                                .or_insert_with(|| {
                                    FixedWindowLimiter::new(self.tuning.rate_per_sec)
                                })
                                .refund();
                            break;
                        },
                    }
                },
            }
        }

        Ok(taken)
    }

    /// Mark a delivered job completed and trim the terminal history.
    pub async fn ack(&self, id: &str) -> Result<()> {
        let job = self.require(id).await?;
        self.store.mark_completed(id, now_ms()).await?;

        #[cfg(feature = "metrics")]
        counter!(queue_metrics::COMPLETED_TOTAL).increment(1);
        info!(id, category = job.category.as_str(), "job completed");

        self.trim(job.category).await;
        Ok(())
    }

    /// Report a delivery failure. Transient failures retry with exponential
    /// backoff until the attempt cap; permanent ones exhaust immediately.
    /// Jobs are never dropped before exhausting their retries.
    pub async fn fail(&self, id: &str, error: &str, kind: FailureKind) -> Result<()> {
        let job = self.require(id).await?;
        let attempt_count = job.attempt_count + 1;
        let now = now_ms();

        let exhausted = match kind {
            FailureKind::Permanent => true,
            FailureKind::Transient => attempt_count > self.tuning.retry.max_attempts,
        };

        if exhausted {
            self.store
                .mark_exhausted(id, attempt_count, error, now)
                .await?;
            #[cfg(feature = "metrics")]
            counter!(queue_metrics::EXHAUSTED_TOTAL).increment(1);
            warn!(
                id,
                category = job.category.as_str(),
                attempt_count,
                error,
                "job exhausted"
            );
            self.trim(job.category).await;
        } else {
            let delay_ms = self.tuning.retry.backoff_ms(attempt_count);
            self.store
                .mark_retry(id, attempt_count, now + delay_ms, error, now)
                .await?;
            #[cfg(feature = "metrics")]
            counter!(queue_metrics::RETRIES_TOTAL).increment(1);
            info!(
                id,
                category = job.category.as_str(),
                attempt_count,
                delay_ms,
                error,
                "job scheduled for retry"
            );
        }
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<Option<Job>> {
        self.store.get(id).await
    }

    /// Startup recovery: requeue jobs a previous process left in-flight.
    /// Single-instance deployment only — with concurrent instances this
    /// would steal live claims.
    pub async fn recover(&self) -> Result<u64> {
        let moved = self.store.requeue_in_flight(now_ms()).await?;
        if moved > 0 {
            info!(moved, "requeued in-flight jobs from previous run");
        }
        Ok(moved)
    }

    pub async fn list(&self, filter: JobFilter) -> Result<Vec<Job>> {
        self.store.list(filter).await
    }

    /// The store behind this queue (shared with the sweeper).
    #[must_use]
    pub fn store(&self) -> Arc<dyn JobStore> {
        Arc::clone(&self.store)
    }

    async fn require(&self, id: &str) -> Result<Job> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| crate::error::Error::job_not_found(id))
    }

    async fn trim(&self, category: JobCategory) {
        match self
            .store
            .trim_terminal(category, self.tuning.keep_per_outcome)
            .await
        {
            Ok(0) => {},
            Ok(deleted) => debug!(category = category.as_str(), deleted, "terminal history trimmed"),
            Err(e) => warn!(category = category.as_str(), error = %e, "terminal trim failed"),
        }
    }
}
