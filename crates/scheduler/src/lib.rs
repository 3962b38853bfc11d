//! Course schedule service.
//!
//! A time-driven trigger walks each running course's lesson timeline: on
//! every tick it claims the lesson cursor, fans out one enqueue per enrolled
//! learner for the lesson under the cursor, and only then advances the
//! cursor — a compare-and-swap against the durable schedule record, so
//! concurrent scheduler instances can never double-fire a lesson.

pub mod directory;
pub mod error;
pub mod next_tick;
pub mod service;
pub mod store;
pub mod store_memory;
pub mod store_sqlite;
pub mod types;

pub use {
    directory::{CourseDirectory, LessonContent},
    error::{Error, Result},
    service::{ScheduleService, ScheduleTuning},
    store::ScheduleStore,
    types::{CourseSchedule, ScheduleCreate, ScheduleState},
};

/// Run database migrations for the scheduler.
///
/// Creates the `course_schedules` table. Call at application startup when
/// using [`store_sqlite::SqliteScheduleStore`] on a shared pool.
pub async fn run_migrations(pool: &sqlx::SqlitePool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .set_ignore_missing(true)
        .run(pool)
        .await?;
    Ok(())
}
