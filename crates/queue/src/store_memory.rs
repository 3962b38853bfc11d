//! In-memory job store for testing.

use std::{collections::HashMap, sync::Mutex};

use async_trait::async_trait;

use crate::{
    Result,
    error::Error,
    store::{JobFilter, JobStore},
    types::{Job, JobCategory, JobState},
};

/// In-memory store backed by `HashMap`. No persistence — for tests only.
pub struct InMemoryJobStore {
    jobs: Mutex<HashMap<String, Job>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryJobStore {
    fn default() -> Self {
        Self::new()
    }
}

fn is_due(job: &Job, now_ms: u64) -> bool {
    match job.state {
        JobState::Queued => true,
        JobState::RetryPending => job.scheduled_at_ms <= now_ms,
        _ => false,
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn insert_if_no_live(&self, job: &Job) -> Result<bool> {
        let mut jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        let live_exists = jobs.values().any(|j| {
            j.category == job.category && j.fingerprint == job.fingerprint && j.state.is_live()
        });
        if live_exists {
            return Ok(false);
        }
        jobs.insert(job.id.clone(), job.clone());
        Ok(true)
    }

    async fn claim_due(&self, category: JobCategory, n: u32, now_ms: u64) -> Result<Vec<Job>> {
        let mut jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        let mut due_ids: Vec<(u64, String)> = jobs
            .values()
            .filter(|j| j.category == category && is_due(j, now_ms))
            .map(|j| (j.scheduled_at_ms, j.id.clone()))
            .collect();
        due_ids.sort();
        due_ids.truncate(n as usize);

        let mut claimed = Vec::with_capacity(due_ids.len());
        for (_, id) in due_ids {
            if let Some(job) = jobs.get_mut(&id) {
                job.state = JobState::InFlight;
                job.updated_at_ms = now_ms;
                claimed.push(job.clone());
            }
        }
        Ok(claimed)
    }

    async fn get(&self, id: &str) -> Result<Option<Job>> {
        let jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        Ok(jobs.get(id).cloned())
    }

    async fn mark_completed(&self, id: &str, now_ms: u64) -> Result<()> {
        self.transition(id, now_ms, |job| {
            job.state = JobState::Completed;
            job.terminal_at_ms = Some(now_ms);
        })
    }

    async fn mark_retry(
        &self,
        id: &str,
        attempt_count: u32,
        scheduled_at_ms: u64,
        error: &str,
        now_ms: u64,
    ) -> Result<()> {
        self.transition(id, now_ms, |job| {
            job.state = JobState::RetryPending;
            job.attempt_count = attempt_count;
            job.scheduled_at_ms = scheduled_at_ms;
            job.last_error = Some(error.to_string());
        })
    }

    async fn mark_exhausted(
        &self,
        id: &str,
        attempt_count: u32,
        error: &str,
        now_ms: u64,
    ) -> Result<()> {
        self.transition(id, now_ms, |job| {
            job.state = JobState::Exhausted;
            job.attempt_count = attempt_count;
            job.last_error = Some(error.to_string());
            job.terminal_at_ms = Some(now_ms);
        })
    }

    async fn list(&self, filter: JobFilter) -> Result<Vec<Job>> {
        let jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        let mut out: Vec<Job> = jobs
            .values()
            .filter(|j| filter.category.is_none_or(|c| j.category == c))
            .filter(|j| filter.state.is_none_or(|s| j.state == s))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.updated_at_ms.cmp(&a.updated_at_ms));
        if filter.limit > 0 {
            out.truncate(filter.limit as usize);
        }
        Ok(out)
    }

    async fn requeue_in_flight(&self, now_ms: u64) -> Result<u64> {
        let mut jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        let mut moved = 0;
        for job in jobs.values_mut() {
            if job.state == JobState::InFlight {
                job.state = JobState::Queued;
                job.updated_at_ms = now_ms;
                moved += 1;
            }
        }
        Ok(moved)
    }

    async fn trim_terminal(&self, category: JobCategory, keep: u32) -> Result<u64> {
        let mut jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        let mut deleted = 0;
        for outcome in [JobState::Completed, JobState::Exhausted] {
            let mut terminal: Vec<(u64, String)> = jobs
                .values()
                .filter(|j| j.category == category && j.state == outcome)
                .map(|j| (j.terminal_at_ms.unwrap_or_default(), j.id.clone()))
                .collect();
            terminal.sort_by(|a, b| b.cmp(a));
            for (_, id) in terminal.into_iter().skip(keep as usize) {
                jobs.remove(&id);
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    async fn sweep_terminal(&self, cutoff_ms: u64, excluded_course_ids: &[String]) -> Result<u64> {
        let mut jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        let before = jobs.len();
        jobs.retain(|_, j| {
            let aged_out = j.state.is_terminal()
                && j.terminal_at_ms.is_some_and(|t| t < cutoff_ms)
                && !j
                    .payload
                    .course_id()
                    .is_some_and(|c| excluded_course_ids.iter().any(|e| e == c));
            !aged_out
        });
        Ok((before - jobs.len()) as u64)
    }
}

impl InMemoryJobStore {
    fn transition(&self, id: &str, now_ms: u64, apply: impl FnOnce(&mut Job)) -> Result<()> {
        let mut jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        let job = jobs.get_mut(id).ok_or_else(|| Error::job_not_found(id))?;
        if job.state != JobState::InFlight {
            return Err(Error::not_in_flight(id));
        }
        apply(job);
        job.updated_at_ms = now_ms;
        Ok(())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, crate::types::JobPayload};

    fn make_job(course: &str, lesson: &str, recipient: &str) -> Job {
        Job::new(
            JobPayload::Lesson {
                course_id: course.into(),
                lesson_id: lesson.into(),
                recipient: recipient.into(),
                title: "t".into(),
                body: "b".into(),
                media_url: None,
                quiz: None,
            },
            1000,
        )
    }

    #[tokio::test]
    async fn test_insert_dedupes_live_fingerprint() {
        let store = InMemoryJobStore::new();
        assert!(
            store
                .insert_if_no_live(&make_job("C1", "L1", "+1"))
                .await
                .unwrap()
        );
        assert!(
            !store
                .insert_if_no_live(&make_job("C1", "L1", "+1"))
                .await
                .unwrap()
        );
        // Different lesson is a different fingerprint.
        assert!(
            store
                .insert_if_no_live(&make_job("C1", "L2", "+1"))
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_insert_allowed_after_terminal() {
        let store = InMemoryJobStore::new();
        let job = make_job("C1", "L1", "+1");
        store.insert_if_no_live(&job).await.unwrap();
        store.claim_due(JobCategory::Lesson, 1, 2000).await.unwrap();
        store.mark_completed(&job.id, 3000).await.unwrap();

        assert!(
            store
                .insert_if_no_live(&make_job("C1", "L1", "+1"))
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_claim_due_marks_in_flight_once() {
        let store = InMemoryJobStore::new();
        store
            .insert_if_no_live(&make_job("C1", "L1", "+1"))
            .await
            .unwrap();

        let first = store.claim_due(JobCategory::Lesson, 5, 2000).await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].state, JobState::InFlight);

        let second = store.claim_due(JobCategory::Lesson, 5, 2000).await.unwrap();
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn test_retry_pending_due_only_after_schedule() {
        let store = InMemoryJobStore::new();
        let job = make_job("C1", "L1", "+1");
        store.insert_if_no_live(&job).await.unwrap();
        store.claim_due(JobCategory::Lesson, 1, 2000).await.unwrap();
        store
            .mark_retry(&job.id, 1, 60_000, "timeout", 2000)
            .await
            .unwrap();

        assert!(
            store
                .claim_due(JobCategory::Lesson, 1, 59_999)
                .await
                .unwrap()
                .is_empty()
        );
        let due = store
            .claim_due(JobCategory::Lesson, 1, 60_000)
            .await
            .unwrap();
        assert_eq!(due.len(), 1);
    }

    #[tokio::test]
    async fn test_transition_requires_in_flight() {
        let store = InMemoryJobStore::new();
        let job = make_job("C1", "L1", "+1");
        store.insert_if_no_live(&job).await.unwrap();

        // Still queued — ack must fail.
        assert!(matches!(
            store.mark_completed(&job.id, 2000).await,
            Err(Error::NotInFlight { .. })
        ));

        store.claim_due(JobCategory::Lesson, 1, 2000).await.unwrap();
        store.mark_completed(&job.id, 3000).await.unwrap();

        // Terminal state is immutable.
        assert!(store.mark_exhausted(&job.id, 1, "late", 4000).await.is_err());
    }

    #[tokio::test]
    async fn test_requeue_in_flight() {
        let store = InMemoryJobStore::new();
        let job = make_job("C1", "L1", "+1");
        store.insert_if_no_live(&job).await.unwrap();
        store.claim_due(JobCategory::Lesson, 1, 2000).await.unwrap();

        let moved = store.requeue_in_flight(3000).await.unwrap();
        assert_eq!(moved, 1);
        let got = store.get(&job.id).await.unwrap().unwrap();
        assert_eq!(got.state, JobState::Queued);
    }

    #[tokio::test]
    async fn test_trim_terminal_keeps_recent() {
        let store = InMemoryJobStore::new();
        for i in 0..8 {
            let job = make_job("C1", &format!("L{i}"), "+1");
            store.insert_if_no_live(&job).await.unwrap();
            store.claim_due(JobCategory::Lesson, 1, 1000 + i).await.unwrap();
            store.mark_completed(&job.id, 2000 + i).await.unwrap();
        }
        let deleted = store.trim_terminal(JobCategory::Lesson, 5).await.unwrap();
        assert_eq!(deleted, 3);

        let left = store
            .list(JobFilter {
                state: Some(JobState::Completed),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(left.len(), 5);
        // The oldest were dropped.
        assert!(left.iter().all(|j| j.terminal_at_ms.unwrap() >= 2003));
    }

    #[tokio::test]
    async fn test_sweep_respects_exclusions() {
        let store = InMemoryJobStore::new();
        for (course, lesson) in [("C1", "L1"), ("C2", "L1")] {
            let job = make_job(course, lesson, "+1");
            store.insert_if_no_live(&job).await.unwrap();
            store.claim_due(JobCategory::Lesson, 1, 2000).await.unwrap();
            store.mark_completed(&job.id, 3000).await.unwrap();
        }

        let deleted = store
            .sweep_terminal(10_000, &["C1".to_string()])
            .await
            .unwrap();
        assert_eq!(deleted, 1);
        let left = store.list(JobFilter::default()).await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].payload.course_id(), Some("C1"));
    }
}
