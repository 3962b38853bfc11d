//! In-memory schedule store for testing.

use std::{collections::HashMap, sync::Mutex};

use async_trait::async_trait;

use crate::{
    Result,
    error::Error,
    store::ScheduleStore,
    types::{CourseSchedule, ScheduleState},
};

/// In-memory store backed by `HashMap`. No persistence — for tests only.
pub struct InMemoryScheduleStore {
    schedules: Mutex<HashMap<String, CourseSchedule>>,
}

impl InMemoryScheduleStore {
    pub fn new() -> Self {
        Self {
            schedules: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryScheduleStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ScheduleStore for InMemoryScheduleStore {
    async fn load(&self) -> Result<Vec<CourseSchedule>> {
        let schedules = self.schedules.lock().unwrap_or_else(|e| e.into_inner());
        Ok(schedules.values().cloned().collect())
    }

    async fn save(&self, schedule: &CourseSchedule) -> Result<()> {
        let mut schedules = self.schedules.lock().unwrap_or_else(|e| e.into_inner());
        schedules.insert(schedule.id.clone(), schedule.clone());
        Ok(())
    }

    async fn update(&self, schedule: &CourseSchedule) -> Result<()> {
        let mut schedules = self.schedules.lock().unwrap_or_else(|e| e.into_inner());
        if !schedules.contains_key(&schedule.id) {
            return Err(Error::schedule_not_found(&schedule.id));
        }
        schedules.insert(schedule.id.clone(), schedule.clone());
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let mut schedules = self.schedules.lock().unwrap_or_else(|e| e.into_inner());
        if schedules.remove(id).is_none() {
            return Err(Error::schedule_not_found(id));
        }
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<CourseSchedule>> {
        let schedules = self.schedules.lock().unwrap_or_else(|e| e.into_inner());
        Ok(schedules.get(id).cloned())
    }

    async fn claim_tick(
        &self,
        id: &str,
        expected_cursor: u32,
        now_ms: u64,
        stale_before_ms: u64,
    ) -> Result<bool> {
        let mut schedules = self.schedules.lock().unwrap_or_else(|e| e.into_inner());
        let Some(schedule) = schedules.get_mut(id) else {
            return Ok(false);
        };
        let claimable = schedule.state == ScheduleState::Running
            && schedule.current_lesson_index == expected_cursor
            && schedule
                .tick_claimed_at_ms
                .is_none_or(|claimed| claimed < stale_before_ms);
        if !claimable {
            return Ok(false);
        }
        schedule.tick_claimed_at_ms = Some(now_ms);
        schedule.updated_at_ms = now_ms;
        Ok(true)
    }

    async fn complete_tick(&self, id: &str, expected_cursor: u32, now_ms: u64) -> Result<bool> {
        let mut schedules = self.schedules.lock().unwrap_or_else(|e| e.into_inner());
        let Some(schedule) = schedules.get_mut(id) else {
            return Ok(false);
        };
        if schedule.current_lesson_index != expected_cursor
            || schedule.tick_claimed_at_ms.is_none()
        {
            return Ok(false);
        }
        schedule.current_lesson_index = expected_cursor + 1;
        schedule.tick_claimed_at_ms = None;
        schedule.updated_at_ms = now_ms;
        Ok(true)
    }

    async fn release_tick(&self, id: &str, expected_cursor: u32, now_ms: u64) -> Result<()> {
        let mut schedules = self.schedules.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(schedule) = schedules.get_mut(id)
            && schedule.current_lesson_index == expected_cursor
        {
            schedule.tick_claimed_at_ms = None;
            schedule.updated_at_ms = now_ms;
        }
        Ok(())
    }

    async fn set_state(&self, id: &str, state: ScheduleState, now_ms: u64) -> Result<()> {
        let mut schedules = self.schedules.lock().unwrap_or_else(|e| e.into_inner());
        let schedule = schedules
            .get_mut(id)
            .ok_or_else(|| Error::schedule_not_found(id))?;
        schedule.state = state;
        schedule.updated_at_ms = now_ms;
        Ok(())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn make_schedule(id: &str) -> CourseSchedule {
        CourseSchedule {
            id: id.into(),
            course_id: format!("course-{id}"),
            state: ScheduleState::Running,
            tick_cron: "0 9 * * *".into(),
            timezone: None,
            current_lesson_index: 0,
            tick_claimed_at_ms: None,
            created_at_ms: 1000,
            updated_at_ms: 1000,
            next_tick_at_ms: None,
        }
    }

    #[tokio::test]
    async fn test_save_load_roundtrip() {
        let store = InMemoryScheduleStore::new();
        store.save(&make_schedule("s1")).await.unwrap();
        let all = store.load().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, "s1");
    }

    #[tokio::test]
    async fn test_claim_is_exclusive() {
        let store = InMemoryScheduleStore::new();
        store.save(&make_schedule("s1")).await.unwrap();

        assert!(store.claim_tick("s1", 0, 5000, 4000).await.unwrap());
        // Second concurrent claim for the same cursor loses.
        assert!(!store.claim_tick("s1", 0, 5001, 4000).await.unwrap());
    }

    #[tokio::test]
    async fn test_stale_claim_taken_over() {
        let store = InMemoryScheduleStore::new();
        store.save(&make_schedule("s1")).await.unwrap();

        assert!(store.claim_tick("s1", 0, 5000, 4000).await.unwrap());
        // A claim from before stale_before_ms counts as dead.
        assert!(store.claim_tick("s1", 0, 9000, 8000).await.unwrap());
    }

    #[tokio::test]
    async fn test_claim_requires_running_and_cursor_match() {
        let store = InMemoryScheduleStore::new();
        let mut schedule = make_schedule("s1");
        schedule.state = ScheduleState::Suspended;
        store.save(&schedule).await.unwrap();
        assert!(!store.claim_tick("s1", 0, 5000, 4000).await.unwrap());

        store
            .set_state("s1", ScheduleState::Running, 5000)
            .await
            .unwrap();
        assert!(!store.claim_tick("s1", 3, 5000, 4000).await.unwrap());
        assert!(store.claim_tick("s1", 0, 5000, 4000).await.unwrap());
    }

    #[tokio::test]
    async fn test_complete_advances_once() {
        let store = InMemoryScheduleStore::new();
        store.save(&make_schedule("s1")).await.unwrap();
        store.claim_tick("s1", 0, 5000, 4000).await.unwrap();

        assert!(store.complete_tick("s1", 0, 6000).await.unwrap());
        let got = store.get("s1").await.unwrap().unwrap();
        assert_eq!(got.current_lesson_index, 1);
        assert!(got.tick_claimed_at_ms.is_none());

        // Replay of the same completion is a no-op swap failure.
        assert!(!store.complete_tick("s1", 0, 7000).await.unwrap());
        assert_eq!(
            store.get("s1").await.unwrap().unwrap().current_lesson_index,
            1
        );
    }

    #[tokio::test]
    async fn test_release_clears_claim_without_advancing() {
        let store = InMemoryScheduleStore::new();
        store.save(&make_schedule("s1")).await.unwrap();
        store.claim_tick("s1", 0, 5000, 4000).await.unwrap();
        store.release_tick("s1", 0, 6000).await.unwrap();

        let got = store.get("s1").await.unwrap().unwrap();
        assert_eq!(got.current_lesson_index, 0);
        assert!(got.tick_claimed_at_ms.is_none());
        // Claim is available again.
        assert!(store.claim_tick("s1", 0, 7000, 6000).await.unwrap());
    }
}
