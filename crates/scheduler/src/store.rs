//! Persistence trait for course schedules.
//!
//! The cursor operations are compare-and-swap against the durable record:
//! `claim_tick` and `complete_tick` succeed for exactly one caller per
//! (schedule, cursor) pair, which is what keeps concurrent scheduler
//! instances from double-firing a lesson.

use async_trait::async_trait;

use crate::{
    Result,
    types::{CourseSchedule, ScheduleState},
};

/// Persistence backend for schedules and their lesson cursors.
#[async_trait]
pub trait ScheduleStore: Send + Sync {
    async fn load(&self) -> Result<Vec<CourseSchedule>>;
    async fn save(&self, schedule: &CourseSchedule) -> Result<()>;
    async fn update(&self, schedule: &CourseSchedule) -> Result<()>;
    async fn delete(&self, id: &str) -> Result<()>;
    async fn get(&self, id: &str) -> Result<Option<CourseSchedule>>;

    /// Claim the tick for `expected_cursor`: succeeds only when the schedule
    /// is running, the cursor matches, and no live claim exists (claims older
    /// than `stale_before_ms` count as dead and are taken over).
    async fn claim_tick(
        &self,
        id: &str,
        expected_cursor: u32,
        now_ms: u64,
        stale_before_ms: u64,
    ) -> Result<bool>;

    /// Advance the cursor from `expected_cursor` to `expected_cursor + 1`
    /// and release the claim. Fails the swap when the cursor moved.
    async fn complete_tick(&self, id: &str, expected_cursor: u32, now_ms: u64) -> Result<bool>;

    /// Release a claim without advancing (fan-out did not complete).
    async fn release_tick(&self, id: &str, expected_cursor: u32, now_ms: u64) -> Result<()>;

    async fn set_state(&self, id: &str, state: ScheduleState, now_ms: u64) -> Result<()>;
}
