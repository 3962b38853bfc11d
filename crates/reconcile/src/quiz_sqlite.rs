//! SQLite-backed quiz context store using sqlx.

use {
    async_trait::async_trait,
    sqlx::{Row, SqlitePool, sqlite::SqlitePoolOptions},
};

use {
    crate::{
        Result,
        quiz::{QuizContext, QuizContextStore},
    },
    lernio_queue::AuxiliarySweep,
};

/// SQLite-backed persistence for quiz contexts.
pub struct SqliteQuizContextStore {
    pool: SqlitePool,
}

impl SqliteQuizContextStore {
    /// Create a new store with its own connection pool and run migrations.
    ///
    /// For shared pools (the gateway's lernio.db), use
    /// [`SqliteQuizContextStore::with_pool`] after calling
    /// [`crate::run_migrations`].
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

#[async_trait]
impl QuizContextStore for SqliteQuizContextStore {
    async fn put(&self, context: QuizContext) -> Result<()> {
        sqlx::query(
            "INSERT INTO quiz_contexts
                 (recipient, course_id, lesson_id, correct_option_id, expires_at_ms)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(recipient) DO UPDATE SET
                 course_id = excluded.course_id,
                 lesson_id = excluded.lesson_id,
                 correct_option_id = excluded.correct_option_id,
                 expires_at_ms = excluded.expires_at_ms",
        )
        .bind(&context.recipient)
        .bind(&context.course_id)
        .bind(&context.lesson_id)
        .bind(&context.correct_option_id)
        .bind(context.expires_at_ms as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_active(&self, recipient: &str, now_ms: u64) -> Result<Option<QuizContext>> {
        let row = sqlx::query(
            "SELECT * FROM quiz_contexts WHERE recipient = ? AND expires_at_ms > ?",
        )
        .bind(recipient)
        .bind(now_ms as i64)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| QuizContext {
            recipient: row.get("recipient"),
            course_id: row.get("course_id"),
            lesson_id: row.get("lesson_id"),
            correct_option_id: row.get("correct_option_id"),
            expires_at_ms: row.get::<i64, _>("expires_at_ms") as u64,
        }))
    }

    async fn purge_expired(&self, now_ms: u64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM quiz_contexts WHERE expires_at_ms <= ?")
            .bind(now_ms as i64)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl AuxiliarySweep for SqliteQuizContextStore {
    fn name(&self) -> &str {
        "quiz_contexts"
    }

    async fn purge_expired(&self, now_ms: u64) -> anyhow::Result<u64> {
        Ok(QuizContextStore::purge_expired(self, now_ms).await?)
    }
}
