//! SQLite-backed schedule store using sqlx.
//!
//! Cursor claim and advance are single guarded UPDATEs, so the
//! compare-and-swap semantics hold across processes sharing the database.

use {
    async_trait::async_trait,
    sqlx::{Row, SqlitePool, sqlite::SqlitePoolOptions},
};

use crate::{
    Result,
    error::Error,
    store::ScheduleStore,
    types::{CourseSchedule, ScheduleState},
};

/// SQLite-backed persistence for course schedules.
pub struct SqliteScheduleStore {
    pool: SqlitePool,
}

impl SqliteScheduleStore {
    /// Create a new store with its own connection pool and run migrations.
    ///
    /// For shared pools (the gateway's lernio.db), use
    /// [`SqliteScheduleStore::with_pool`] after calling [`crate::run_migrations`].
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

fn row_to_schedule(row: &sqlx::sqlite::SqliteRow) -> Result<CourseSchedule> {
    let state_str: String = row.get("state");
    Ok(CourseSchedule {
        id: row.get("id"),
        course_id: row.get("course_id"),
        state: ScheduleState::parse(&state_str).ok_or_else(|| Error::Message {
            message: format!("bad schedule state in store: {state_str}"),
        })?,
        tick_cron: row.get("tick_cron"),
        timezone: row.get("timezone"),
        current_lesson_index: row.get::<i64, _>("current_lesson_index") as u32,
        tick_claimed_at_ms: row
            .get::<Option<i64>, _>("tick_claimed_at_ms")
            .map(|v| v as u64),
        created_at_ms: row.get::<i64, _>("created_at_ms") as u64,
        updated_at_ms: row.get::<i64, _>("updated_at_ms") as u64,
        next_tick_at_ms: None,
    })
}

#[async_trait]
impl ScheduleStore for SqliteScheduleStore {
    async fn load(&self) -> Result<Vec<CourseSchedule>> {
        let rows = sqlx::query("SELECT * FROM course_schedules")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_schedule).collect()
    }

    async fn save(&self, schedule: &CourseSchedule) -> Result<()> {
        sqlx::query(
            "INSERT INTO course_schedules
                 (id, course_id, state, tick_cron, timezone, current_lesson_index,
                  tick_claimed_at_ms, created_at_ms, updated_at_ms)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&schedule.id)
        .bind(&schedule.course_id)
        .bind(schedule.state.as_str())
        .bind(&schedule.tick_cron)
        .bind(&schedule.timezone)
        .bind(i64::from(schedule.current_lesson_index))
        .bind(schedule.tick_claimed_at_ms.map(|v| v as i64))
        .bind(schedule.created_at_ms as i64)
        .bind(schedule.updated_at_ms as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update(&self, schedule: &CourseSchedule) -> Result<()> {
        let result = sqlx::query(
            "UPDATE course_schedules
             SET course_id = ?, state = ?, tick_cron = ?, timezone = ?,
                 current_lesson_index = ?, tick_claimed_at_ms = ?, updated_at_ms = ?
             WHERE id = ?",
        )
        .bind(&schedule.course_id)
        .bind(schedule.state.as_str())
        .bind(&schedule.tick_cron)
        .bind(&schedule.timezone)
        .bind(i64::from(schedule.current_lesson_index))
        .bind(schedule.tick_claimed_at_ms.map(|v| v as i64))
        .bind(schedule.updated_at_ms as i64)
        .bind(&schedule.id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(Error::schedule_not_found(&schedule.id));
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM course_schedules WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::schedule_not_found(id));
        }
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<CourseSchedule>> {
        let row = sqlx::query("SELECT * FROM course_schedules WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_schedule).transpose()
    }

    async fn claim_tick(
        &self,
        id: &str,
        expected_cursor: u32,
        now_ms: u64,
        stale_before_ms: u64,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE course_schedules
             SET tick_claimed_at_ms = ?, updated_at_ms = ?
             WHERE id = ? AND state = 'running' AND current_lesson_index = ?
               AND (tick_claimed_at_ms IS NULL OR tick_claimed_at_ms < ?)",
        )
        .bind(now_ms as i64)
        .bind(now_ms as i64)
        .bind(id)
        .bind(i64::from(expected_cursor))
        .bind(stale_before_ms as i64)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn complete_tick(&self, id: &str, expected_cursor: u32, now_ms: u64) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE course_schedules
             SET current_lesson_index = current_lesson_index + 1,
                 tick_claimed_at_ms = NULL, updated_at_ms = ?
             WHERE id = ? AND current_lesson_index = ?
               AND tick_claimed_at_ms IS NOT NULL",
        )
        .bind(now_ms as i64)
        .bind(id)
        .bind(i64::from(expected_cursor))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn release_tick(&self, id: &str, expected_cursor: u32, now_ms: u64) -> Result<()> {
        sqlx::query(
            "UPDATE course_schedules
             SET tick_claimed_at_ms = NULL, updated_at_ms = ?
             WHERE id = ? AND current_lesson_index = ?",
        )
        .bind(now_ms as i64)
        .bind(id)
        .bind(i64::from(expected_cursor))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_state(&self, id: &str, state: ScheduleState, now_ms: u64) -> Result<()> {
        let result = sqlx::query(
            "UPDATE course_schedules SET state = ?, updated_at_ms = ? WHERE id = ?",
        )
        .bind(state.as_str())
        .bind(now_ms as i64)
        .bind(id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(Error::schedule_not_found(id));
        }
        Ok(())
    }
}
