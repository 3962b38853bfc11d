//! SQLite-backed message log using sqlx.

use {
    async_trait::async_trait,
    sqlx::{Row, SqlitePool, sqlite::SqlitePoolOptions},
};

use crate::{
    Error, Result,
    message_log::{Direction, MessageLog, MessageRecord, MessageStatus, StatusAdvance},
};

/// SQLite-backed persistence for the message log.
pub struct SqliteMessageLog {
    pool: SqlitePool,
}

impl SqliteMessageLog {
    /// Create a new log with its own connection pool and run migrations.
    ///
    /// For shared pools (the gateway's lernio.db), use
    /// [`SqliteMessageLog::with_pool`] after calling [`crate::run_migrations`].
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        crate::run_migrations(&pool).await?;

        Ok(Self { pool })
    }

    /// Create a log using an existing pool (migrations must already be run).
    pub fn with_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> Result<MessageRecord> {
    let direction_str: String = row.get("direction");
    let status_str: String = row.get("status");
    Ok(MessageRecord {
        provider_message_id: row.get("provider_message_id"),
        direction: Direction::parse(&direction_str)
            .ok_or_else(|| Error::invalid_input(format!("bad direction: {direction_str}")))?,
        category: row.get("category"),
        recipient: row.get("recipient"),
        body: row.get("body"),
        status: MessageStatus::parse(&status_str)
            .ok_or_else(|| Error::invalid_input(format!("bad status: {status_str}")))?,
        course_id: row.get("course_id"),
        lesson_id: row.get("lesson_id"),
        created_at_ms: row.get::<i64, _>("created_at_ms") as u64,
        updated_at_ms: row.get::<i64, _>("updated_at_ms") as u64,
    })
}

#[async_trait]
impl MessageLog for SqliteMessageLog {
    async fn record(&self, record: MessageRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO messages (provider_message_id, direction, category, recipient, body,
                                   status, course_id, lesson_id, created_at_ms, updated_at_ms)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(provider_message_id) DO NOTHING",
        )
        .bind(&record.provider_message_id)
        .bind(record.direction.as_str())
        .bind(&record.category)
        .bind(&record.recipient)
        .bind(&record.body)
        .bind(record.status.as_str())
        .bind(&record.course_id)
        .bind(&record.lesson_id)
        .bind(record.created_at_ms as i64)
        .bind(record.updated_at_ms as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, provider_message_id: &str) -> Result<Option<MessageRecord>> {
        let row = sqlx::query("SELECT * FROM messages WHERE provider_message_id = ?")
            .bind(provider_message_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_record).transpose()
    }

    async fn advance_status(
        &self,
        provider_message_id: &str,
        status: MessageStatus,
        now_ms: u64,
    ) -> Result<StatusAdvance> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT status FROM messages WHERE provider_message_id = ?")
            .bind(provider_message_id)
            .fetch_optional(&mut *tx)
            .await?;
        let Some(row) = row else {
            return Ok(StatusAdvance::Unknown);
        };

        let current_str: String = row.get("status");
        let current = MessageStatus::parse(&current_str)
            .ok_or_else(|| Error::invalid_input(format!("bad status: {current_str}")))?;
        if !current.can_advance_to(status) {
            return Ok(StatusAdvance::NotForward);
        }

        sqlx::query(
            "UPDATE messages SET status = ?, updated_at_ms = ? WHERE provider_message_id = ?",
        )
        .bind(status.as_str())
        .bind(now_ms as i64)
        .bind(provider_message_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(StatusAdvance::Advanced)
    }

    async fn recent(&self, limit: u32) -> Result<Vec<MessageRecord>> {
        let rows = sqlx::query("SELECT * FROM messages ORDER BY created_at_ms DESC LIMIT ?")
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_record).collect()
    }
}
