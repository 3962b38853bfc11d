//! Retention sweeper: periodic cleanup of aged terminal jobs and expired
//! auxiliary records.

use std::{future::Future, pin::Pin, sync::Arc, time::Duration};

use {
    async_trait::async_trait,
    tokio::task::JoinHandle,
    tracing::{info, warn},
};

#[cfg(feature = "metrics")]
use lernio_metrics::{counter, sweeper as sweeper_metrics};

use lernio_common::time::now_ms;

use crate::{Result, store::JobStore};

/// An auxiliary store with expiring records the sweeper should purge
/// (e.g. stale quiz contexts).
#[async_trait]
pub trait AuxiliarySweep: Send + Sync {
    fn name(&self) -> &str;
    /// Delete expired records; returns how many were purged.
    async fn purge_expired(&self, now_ms: u64) -> anyhow::Result<u64>;
}

/// Reports which course ids currently have an active scheduling run, so
/// their jobs are spared from the sweep.
pub type ActiveCoursesFn =
    Arc<dyn Fn() -> Pin<Box<dyn Future<Output = Vec<String>> + Send>> + Send + Sync>;

/// What one sweep pass removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub jobs_deleted: u64,
    pub aux_purged: u64,
}

/// Periodic cleanup of the job store and registered auxiliary stores.
pub struct RetentionSweeper {
    store: Arc<dyn JobStore>,
    retention_ms: u64,
    auxiliaries: Vec<Arc<dyn AuxiliarySweep>>,
    active_courses: Option<ActiveCoursesFn>,
}

impl RetentionSweeper {
    pub fn new(store: Arc<dyn JobStore>, retention_days: u32) -> Self {
        Self {
            store,
            retention_ms: u64::from(retention_days) * 24 * 60 * 60 * 1000,
            auxiliaries: Vec::new(),
            active_courses: None,
        }
    }

    #[must_use]
    pub fn with_auxiliary(mut self, aux: Arc<dyn AuxiliarySweep>) -> Self {
        self.auxiliaries.push(aux);
        self
    }

    #[must_use]
    pub fn with_active_courses(mut self, f: ActiveCoursesFn) -> Self {
        self.active_courses = Some(f);
        self
    }

    /// Run one sweep pass at `now_ms`.
    pub async fn sweep_once(&self, now_ms: u64) -> Result<SweepReport> {
        let cutoff = now_ms.saturating_sub(self.retention_ms);
        let excluded = match self.active_courses.as_ref() {
            Some(f) => f().await,
            None => Vec::new(),
        };

        let jobs_deleted = self.store.sweep_terminal(cutoff, &excluded).await?;

        let mut aux_purged = 0;
        for aux in &self.auxiliaries {
            match aux.purge_expired(now_ms).await {
                Ok(purged) => aux_purged += purged,
                Err(e) => warn!(store = aux.name(), error = %e, "auxiliary purge failed"),
            }
        }

        #[cfg(feature = "metrics")]
        {
            counter!(sweeper_metrics::JOBS_SWEPT_TOTAL).increment(jobs_deleted);
            counter!(sweeper_metrics::AUX_PURGED_TOTAL).increment(aux_purged);
        }

        if jobs_deleted > 0 || aux_purged > 0 {
            info!(jobs_deleted, aux_purged, "retention sweep finished");
        }

        Ok(SweepReport {
            jobs_deleted,
            aux_purged,
        })
    }

    /// Run an immediate pass, then one per `interval` until aborted.
    pub fn spawn(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                if let Err(e) = self.sweep_once(now_ms()).await {
                    warn!(error = %e, "retention sweep failed");
                }
                tokio::time::sleep(interval).await;
            }
        })
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            store::{JobFilter, JobStore},
            store_memory::InMemoryJobStore,
            types::{Job, JobCategory, JobPayload},
        },
        std::sync::atomic::{AtomicU64, Ordering},
    };

    const DAY_MS: u64 = 24 * 60 * 60 * 1000;

    struct CountingAux {
        purged: AtomicU64,
    }

    #[async_trait]
    impl AuxiliarySweep for CountingAux {
        fn name(&self) -> &str {
            "counting"
        }

        async fn purge_expired(&self, _now_ms: u64) -> anyhow::Result<u64> {
            self.purged.fetch_add(2, Ordering::SeqCst);
            Ok(2)
        }
    }

    async fn terminal_job(store: &InMemoryJobStore, course: &str, lesson: &str, done_at: u64) {
        let job = Job::new(
            JobPayload::Lesson {
                course_id: course.into(),
                lesson_id: lesson.into(),
                recipient: "+1".into(),
                title: "t".into(),
                body: "b".into(),
                media_url: None,
                quiz: None,
            },
            done_at,
        );
        store.insert_if_no_live(&job).await.unwrap();
        store
            .claim_due(JobCategory::Lesson, 1, done_at)
            .await
            .unwrap();
        store.mark_completed(&job.id, done_at).await.unwrap();
    }

    #[tokio::test]
    async fn test_sweep_deletes_only_aged_terminal_jobs() {
        let store = Arc::new(InMemoryJobStore::new());
        let now = 100 * DAY_MS;
        terminal_job(&store, "C1", "old", now - 40 * DAY_MS).await;
        terminal_job(&store, "C1", "fresh", now - 5 * DAY_MS).await;

        let sweeper = RetentionSweeper::new(Arc::clone(&store) as Arc<dyn JobStore>, 30);
        let report = sweeper.sweep_once(now).await.unwrap();

        assert_eq!(report.jobs_deleted, 1);
        let left = store.list(JobFilter::default()).await.unwrap();
        assert_eq!(left.len(), 1);
    }

    #[tokio::test]
    async fn test_sweep_spares_active_courses() {
        let store = Arc::new(InMemoryJobStore::new());
        let now = 100 * DAY_MS;
        terminal_job(&store, "C1", "old", now - 40 * DAY_MS).await;

        let sweeper = RetentionSweeper::new(Arc::clone(&store) as Arc<dyn JobStore>, 30)
            .with_active_courses(Arc::new(|| Box::pin(async { vec!["C1".to_string()] })));
        let report = sweeper.sweep_once(now).await.unwrap();

        assert_eq!(report.jobs_deleted, 0);
    }

    #[tokio::test]
    async fn test_sweep_runs_auxiliaries() {
        let store = Arc::new(InMemoryJobStore::new());
        let aux = Arc::new(CountingAux {
            purged: AtomicU64::new(0),
        });
        let sweeper = RetentionSweeper::new(store as Arc<dyn JobStore>, 30)
            .with_auxiliary(Arc::clone(&aux) as Arc<dyn AuxiliarySweep>);

        let report = sweeper.sweep_once(100 * DAY_MS).await.unwrap();
        assert_eq!(report.aux_purged, 2);
        assert_eq!(aux.purged.load(Ordering::SeqCst), 2);
    }
}
