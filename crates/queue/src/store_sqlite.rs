//! SQLite-backed job store using sqlx.
//!
//! The dedup contract is enforced by a partial unique index over live states,
//! so check-and-insert is one statement; claims use `UPDATE ... RETURNING` so
//! two workers can never both move the same job to in-flight.

use {
    async_trait::async_trait,
    sqlx::{Row, SqlitePool, sqlite::SqlitePoolOptions},
};

use crate::{
    Result,
    error::Error,
    store::{JobFilter, JobStore},
    types::{Job, JobCategory, JobState},
};

/// SQLite-backed persistence for jobs.
pub struct SqliteJobStore {
    pool: SqlitePool,
}

impl SqliteJobStore {
    /// Create a new store with its own connection pool and run migrations.
    ///
    /// For shared pools (the gateway's lernio.db), use
    /// [`SqliteJobStore::with_pool`] after calling [`crate::run_migrations`].
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        crate::run_migrations(&pool).await?;

        Ok(Self { pool })
    }

    /// Create a store using an existing pool (migrations must already be run).
    pub fn with_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn row_to_job(row: &sqlx::sqlite::SqliteRow) -> Result<Job> {
    let category_str: String = row.get("category");
    let state_str: String = row.get("state");
    let payload_str: String = row.get("payload");
    Ok(Job {
        id: row.get("id"),
        fingerprint: row.get("fingerprint"),
        category: JobCategory::parse(&category_str)
            .ok_or_else(|| Error::Message {
                message: format!("bad category in store: {category_str}"),
            })?,
        payload: serde_json::from_str(&payload_str)?,
        state: JobState::parse(&state_str).ok_or_else(|| Error::Message {
            message: format!("bad state in store: {state_str}"),
        })?,
        attempt_count: row.get::<i64, _>("attempt_count") as u32,
        scheduled_at_ms: row.get::<i64, _>("scheduled_at_ms") as u64,
        last_error: row.get("last_error"),
        created_at_ms: row.get::<i64, _>("created_at_ms") as u64,
        updated_at_ms: row.get::<i64, _>("updated_at_ms") as u64,
        terminal_at_ms: row
            .get::<Option<i64>, _>("terminal_at_ms")
            .map(|v| v as u64),
    })
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn insert_if_no_live(&self, job: &Job) -> Result<bool> {
        let payload = serde_json::to_string(&job.payload)?;
        let result = sqlx::query(
            "INSERT INTO jobs (id, category, fingerprint, course_id, payload, state,
                               attempt_count, scheduled_at_ms, last_error,
                               created_at_ms, updated_at_ms, terminal_at_ms)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (category, fingerprint)
             WHERE state IN ('queued', 'inFlight', 'retryPending')
             DO NOTHING",
        )
        .bind(&job.id)
        .bind(job.category.as_str())
        .bind(&job.fingerprint)
        .bind(job.payload.course_id())
        .bind(&payload)
        .bind(job.state.as_str())
        .bind(i64::from(job.attempt_count))
        .bind(job.scheduled_at_ms as i64)
        .bind(&job.last_error)
        .bind(job.created_at_ms as i64)
        .bind(job.updated_at_ms as i64)
        .bind(job.terminal_at_ms.map(|v| v as i64))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn claim_due(&self, category: JobCategory, n: u32, now_ms: u64) -> Result<Vec<Job>> {
        let rows = sqlx::query(
            "UPDATE jobs SET state = 'inFlight', updated_at_ms = ?
             WHERE id IN (
                 SELECT id FROM jobs
                 WHERE category = ?
                   AND (state = 'queued'
                        OR (state = 'retryPending' AND scheduled_at_ms <= ?))
                 ORDER BY scheduled_at_ms ASC
                 LIMIT ?
             )
             RETURNING *",
        )
        .bind(now_ms as i64)
        .bind(category.as_str())
        .bind(now_ms as i64)
        .bind(i64::from(n))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_job).collect()
    }

    async fn get(&self, id: &str) -> Result<Option<Job>> {
        let row = sqlx::query("SELECT * FROM jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_job).transpose()
    }

    async fn mark_completed(&self, id: &str, now_ms: u64) -> Result<()> {
        let result = sqlx::query(
            "UPDATE jobs SET state = 'completed', terminal_at_ms = ?, updated_at_ms = ?
             WHERE id = ? AND state = 'inFlight'",
        )
        .bind(now_ms as i64)
        .bind(now_ms as i64)
        .bind(id)
        .execute(&self.pool)
        .await?;
        self.check_transition(id, result.rows_affected()).await
    }

    async fn mark_retry(
        &self,
        id: &str,
        attempt_count: u32,
        scheduled_at_ms: u64,
        error: &str,
        now_ms: u64,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE jobs SET state = 'retryPending', attempt_count = ?, scheduled_at_ms = ?,
                             last_error = ?, updated_at_ms = ?
             WHERE id = ? AND state = 'inFlight'",
        )
        .bind(i64::from(attempt_count))
        .bind(scheduled_at_ms as i64)
        .bind(error)
        .bind(now_ms as i64)
        .bind(id)
        .execute(&self.pool)
        .await?;
        self.check_transition(id, result.rows_affected()).await
    }

    async fn mark_exhausted(
        &self,
        id: &str,
        attempt_count: u32,
        error: &str,
        now_ms: u64,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE jobs SET state = 'exhausted', attempt_count = ?, last_error = ?,
                             terminal_at_ms = ?, updated_at_ms = ?
             WHERE id = ? AND state = 'inFlight'",
        )
        .bind(i64::from(attempt_count))
        .bind(error)
        .bind(now_ms as i64)
        .bind(now_ms as i64)
        .bind(id)
        .execute(&self.pool)
        .await?;
        self.check_transition(id, result.rows_affected()).await
    }

    async fn list(&self, filter: JobFilter) -> Result<Vec<Job>> {
        let mut sql = String::from("SELECT * FROM jobs WHERE 1=1");
        if filter.category.is_some() {
            sql.push_str(" AND category = ?");
        }
        if filter.state.is_some() {
            sql.push_str(" AND state = ?");
        }
        sql.push_str(" ORDER BY updated_at_ms DESC");
        if filter.limit > 0 {
            sql.push_str(" LIMIT ?");
        }

        let mut query = sqlx::query(&sql);
        if let Some(category) = filter.category {
            query = query.bind(category.as_str());
        }
        if let Some(state) = filter.state {
            query = query.bind(state.as_str());
        }
        if filter.limit > 0 {
            query = query.bind(i64::from(filter.limit));
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(row_to_job).collect()
    }

    async fn requeue_in_flight(&self, now_ms: u64) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE jobs SET state = 'queued', updated_at_ms = ? WHERE state = 'inFlight'",
        )
        .bind(now_ms as i64)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn trim_terminal(&self, category: JobCategory, keep: u32) -> Result<u64> {
        let mut deleted = 0;
        for outcome in ["completed", "exhausted"] {
            let result = sqlx::query(
                "DELETE FROM jobs
                 WHERE category = ? AND state = ?
                   AND id NOT IN (
                       SELECT id FROM jobs
                       WHERE category = ? AND state = ?
                       ORDER BY terminal_at_ms DESC
                       LIMIT ?
                   )",
            )
            .bind(category.as_str())
            .bind(outcome)
            .bind(category.as_str())
            .bind(outcome)
            .bind(i64::from(keep))
            .execute(&self.pool)
            .await?;
            deleted += result.rows_affected();
        }
        Ok(deleted)
    }

    async fn sweep_terminal(&self, cutoff_ms: u64, excluded_course_ids: &[String]) -> Result<u64> {
        let mut sql = String::from(
            "DELETE FROM jobs
             WHERE state IN ('completed', 'exhausted')
               AND terminal_at_ms IS NOT NULL AND terminal_at_ms < ?",
        );
        if !excluded_course_ids.is_empty() {
            let placeholders = vec!["?"; excluded_course_ids.len()].join(", ");
            sql.push_str(&format!(
                " AND (course_id IS NULL OR course_id NOT IN ({placeholders}))"
            ));
        }

        let mut query = sqlx::query(&sql).bind(cutoff_ms as i64);
        for course_id in excluded_course_ids {
            query = query.bind(course_id);
        }

        let result = query.execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}

impl SqliteJobStore {
    /// Turn a zero-row transition into the precise error.
    async fn check_transition(&self, id: &str, rows_affected: u64) -> Result<()> {
        if rows_affected == 1 {
            return Ok(());
        }
        match self.get(id).await? {
            Some(_) => Err(Error::not_in_flight(id)),
            None => Err(Error::job_not_found(id)),
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, crate::types::JobPayload};

    async fn make_store() -> SqliteJobStore {
        SqliteJobStore::new("sqlite::memory:").await.unwrap()
    }

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
    async fn test_sqlite_insert_roundtrip() {
        let store = make_store().await;
        let job = make_job("C1", "L1", "+15550001");
        assert!(store.insert_if_no_live(&job).await.unwrap());

        let got = store.get(&job.id).await.unwrap().unwrap();
        assert_eq!(got, job);
    }

    #[tokio::test]
    async fn test_sqlite_live_index_dedupes() {
        let store = make_store().await;
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
    }

    #[tokio::test]
    async fn test_sqlite_dedup_released_after_terminal() {
        let store = make_store().await;
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
    async fn test_sqlite_claim_due_once() {
        let store = make_store().await;
        store
            .insert_if_no_live(&make_job("C1", "L1", "+1"))
            .await
            .unwrap();

        let first = store.claim_due(JobCategory::Lesson, 5, 2000).await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].state, JobState::InFlight);
        assert!(
            store
                .claim_due(JobCategory::Lesson, 5, 2000)
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_sqlite_claim_respects_retry_schedule() {
        let store = make_store().await;
        let job = make_job("C1", "L1", "+1");
        store.insert_if_no_live(&job).await.unwrap();
        store.claim_due(JobCategory::Lesson, 1, 2000).await.unwrap();
        store
            .mark_retry(&job.id, 1, 62_000, "timeout", 2000)
            .await
            .unwrap();

        assert!(
            store
                .claim_due(JobCategory::Lesson, 1, 61_999)
                .await
                .unwrap()
                .is_empty()
        );
        let due = store
            .claim_due(JobCategory::Lesson, 1, 62_000)
            .await
            .unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].attempt_count, 1);
    }

    #[tokio::test]
    async fn test_sqlite_transition_guards() {
        let store = make_store().await;
        let job = make_job("C1", "L1", "+1");
        store.insert_if_no_live(&job).await.unwrap();

        assert!(matches!(
            store.mark_completed(&job.id, 2000).await,
            Err(Error::NotInFlight { .. })
        ));
        assert!(matches!(
            store.mark_completed("nope", 2000).await,
            Err(Error::JobNotFound { .. })
        ));

        store.claim_due(JobCategory::Lesson, 1, 2000).await.unwrap();
        store.mark_exhausted(&job.id, 3, "boom", 3000).await.unwrap();

        // Terminal is immutable.
        assert!(store.mark_completed(&job.id, 4000).await.is_err());
        let got = store.get(&job.id).await.unwrap().unwrap();
        assert_eq!(got.state, JobState::Exhausted);
        assert_eq!(got.last_error.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn test_sqlite_list_filters() {
        let store = make_store().await;
        for lesson in ["L1", "L2", "L3"] {
            store
                .insert_if_no_live(&make_job("C1", lesson, "+1"))
                .await
                .unwrap();
        }
        store.claim_due(JobCategory::Lesson, 1, 2000).await.unwrap();

        let queued = store
            .list(JobFilter {
                category: Some(JobCategory::Lesson),
                state: Some(JobState::Queued),
                limit: 10,
            })
            .await
            .unwrap();
        assert_eq!(queued.len(), 2);

        let in_flight = store
            .list(JobFilter {
                state: Some(JobState::InFlight),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(in_flight.len(), 1);
    }

    #[tokio::test]
    async fn test_sqlite_trim_and_sweep() {
        let store = make_store().await;
        for i in 0..7u64 {
            let job = make_job("C1", &format!("L{i}"), "+1");
            store.insert_if_no_live(&job).await.unwrap();
            store.claim_due(JobCategory::Lesson, 1, 2000 + i).await.unwrap();
            store.mark_completed(&job.id, 3000 + i).await.unwrap();
        }

        let trimmed = store.trim_terminal(JobCategory::Lesson, 5).await.unwrap();
        assert_eq!(trimmed, 2);

        // Sweep everything older than far-future cutoff, sparing C1.
        let spared = store
            .sweep_terminal(u64::from(u32::MAX), &["C1".to_string()])
            .await
            .unwrap();
        assert_eq!(spared, 0);

        let swept = store.sweep_terminal(u64::from(u32::MAX), &[]).await.unwrap();
        assert_eq!(swept, 5);
    }
}
