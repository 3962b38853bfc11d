//! Schedule service: timer loop, tick claim, lesson fan-out, cursor advance.

use std::{sync::Arc, time::Duration};

use {
    tokio::{
        sync::{Mutex, Notify, RwLock},
        task::JoinHandle,
    },
    tracing::{debug, error, info, warn},
};

#[cfg(feature = "metrics")]
use lernio_metrics::{counter, scheduler as scheduler_metrics};

use {
    lernio_common::time::now_ms,
    lernio_queue::{JobPayload, JobQueue},
};

use crate::{
    Result,
    directory::CourseDirectory,
    error::Error,
    next_tick::next_tick,
    store::ScheduleStore,
    types::{CourseSchedule, ScheduleCreate, ScheduleState},
};

/// Scheduler behavior knobs, usually mapped from the application config.
#[derive(Debug, Clone)]
pub struct ScheduleTuning {
    /// Delivery-time cron used when a schedule does not set its own.
    pub default_tick_cron: String,
    pub default_timezone: Option<String>,
    /// A tick claim older than this is treated as dead and taken over.
    pub stuck_claim_ms: u64,
}

impl Default for ScheduleTuning {
    fn default() -> Self {
        Self {
            default_tick_cron: "0 9 * * *".into(),
            default_timezone: None,
            stuck_claim_ms: 2 * 60 * 60 * 1000,
        }
    }
}

/// Summary status of the scheduler.
#[derive(Debug, Clone, Default, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerStatus {
    pub running: bool,
    pub schedule_count: usize,
    pub running_count: usize,
    pub next_tick_at_ms: Option<u64>,
}

/// The course schedule service.
pub struct ScheduleService {
    store: Arc<dyn ScheduleStore>,
    directory: Arc<dyn CourseDirectory>,
    queue: Arc<JobQueue>,
    tuning: ScheduleTuning,
    schedules: RwLock<Vec<CourseSchedule>>,
    timer_handle: Mutex<Option<JoinHandle<()>>>,
    wake_notify: Arc<Notify>,
    running: RwLock<bool>,
}

impl ScheduleService {
    pub fn new(
        store: Arc<dyn ScheduleStore>,
        directory: Arc<dyn CourseDirectory>,
        queue: Arc<JobQueue>,
        tuning: ScheduleTuning,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            directory,
            queue,
            tuning,
            schedules: RwLock::new(Vec::new()),
            timer_handle: Mutex::new(None),
            wake_notify: Arc::new(Notify::new()),
            running: RwLock::new(false),
        })
    }

    /// Load schedules from the store and start the timer loop.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        let mut loaded = self.store.load().await?;
        let now = now_ms();
        for schedule in &mut loaded {
            schedule.next_tick_at_ms = self.compute_next(schedule, now);
        }
        info!(count = loaded.len(), "loaded course schedules");

        {
            let mut schedules = self.schedules.write().await;
            *schedules = loaded;
        }

        *self.running.write().await = true;

        let svc = Arc::clone(self);
        let handle = tokio::spawn(async move {
            svc.timer_loop().await;
        });

        *self.timer_handle.lock().await = Some(handle);
        Ok(())
    }

    /// Stop the timer loop.
    pub async fn stop(&self) {
        *self.running.write().await = false;
        self.wake_notify.notify_one();

        let mut handle = self.timer_handle.lock().await;
        if let Some(h) = handle.take() {
            h.abort();
        }
        info!("schedule service stopped");
    }

    /// Create a schedule for a course.
    pub async fn add(&self, create: ScheduleCreate) -> Result<CourseSchedule> {
        let now = now_ms();
        let mut schedule = CourseSchedule {
            id: uuid::Uuid::new_v4().to_string(),
            course_id: create.course_id,
            state: if create.autostart {
                ScheduleState::Running
            } else {
                ScheduleState::Pending
            },
            tick_cron: create
                .tick_cron
                .unwrap_or_else(|| self.tuning.default_tick_cron.clone()),
            timezone: create.timezone.or_else(|| self.tuning.default_timezone.clone()),
            current_lesson_index: 0,
            tick_claimed_at_ms: None,
            created_at_ms: now,
            updated_at_ms: now,
            next_tick_at_ms: None,
        };

        // Reject unparsable expressions up front.
        schedule.next_tick_at_ms =
            next_tick(&schedule.tick_cron, schedule.timezone.as_deref(), now)?;

        self.store.save(&schedule).await?;
        {
            let mut schedules = self.schedules.write().await;
            schedules.push(schedule.clone());
        }
        self.wake_notify.notify_one();
        info!(id = %schedule.id, course_id = %schedule.course_id, "course schedule added");
        Ok(schedule)
    }

    /// Remove a schedule.
    pub async fn remove(&self, id: &str) -> Result<()> {
        self.store.delete(id).await?;
        let mut schedules = self.schedules.write().await;
        schedules.retain(|s| s.id != id);
        drop(schedules);
        info!(id, "course schedule removed");
        Ok(())
    }

    /// List all schedules.
    pub async fn list(&self) -> Vec<CourseSchedule> {
        self.schedules.read().await.clone()
    }

    /// pending/suspended → running.
    pub async fn start_schedule(&self, id: &str) -> Result<()> {
        self.transition(id, ScheduleState::Running).await
    }

    /// running → suspended; ticks become no-ops until resumed.
    pub async fn suspend(&self, id: &str) -> Result<()> {
        self.transition(id, ScheduleState::Suspended).await
    }

    /// suspended → running.
    pub async fn resume(&self, id: &str) -> Result<()> {
        self.transition(id, ScheduleState::Running).await
    }

    /// Course ids with a tick currently mid-fan-out. The retention sweeper
    /// spares these.
    pub async fn active_course_ids(&self) -> Vec<String> {
        self.schedules
            .read()
            .await
            .iter()
            .filter(|s| s.tick_claimed_at_ms.is_some())
            .map(|s| s.course_id.clone())
            .collect()
    }

    /// Scheduler status summary.
    pub async fn status(&self) -> SchedulerStatus {
        let schedules = self.schedules.read().await;
        let running = *self.running.read().await;
        let running_count = schedules
            .iter()
            .filter(|s| s.state == ScheduleState::Running)
            .count();
        let next_tick_at_ms = schedules
            .iter()
            .filter(|s| s.state == ScheduleState::Running)
            .filter_map(|s| s.next_tick_at_ms)
            .min();
        SchedulerStatus {
            running,
            schedule_count: schedules.len(),
            running_count,
            next_tick_at_ms,
        }
    }

    /// Run one tick for a schedule right now (manual trigger; the same claim
    /// guard applies, so a concurrent tick stays safe).
    pub async fn tick(&self, id: &str) -> Result<()> {
        let schedule = {
            let schedules = self.schedules.read().await;
            schedules
                .iter()
                .find(|s| s.id == id)
                .cloned()
                .ok_or_else(|| Error::schedule_not_found(id))?
        };
        self.execute_tick(&schedule).await;
        Ok(())
    }

    // ── Internal ────────────────────────────────────────────────────────

    async fn transition(&self, id: &str, state: ScheduleState) -> Result<()> {
        let now = now_ms();
        self.store.set_state(id, state, now).await?;

        let next = {
            let mut schedules = self.schedules.write().await;
            let schedule = schedules
                .iter_mut()
                .find(|s| s.id == id)
                .ok_or_else(|| Error::schedule_not_found(id))?;
            schedule.state = state;
            schedule.updated_at_ms = now;
            if state == ScheduleState::Running {
                schedule.next_tick_at_ms =
                    next_tick(&schedule.tick_cron, schedule.timezone.as_deref(), now)
                        .unwrap_or(None);
            } else {
                schedule.next_tick_at_ms = None;
            }
            schedule.next_tick_at_ms
        };

        self.wake_notify.notify_one();
        info!(id, state = state.as_str(), next_tick_at_ms = ?next, "schedule state changed");
        Ok(())
    }

    async fn timer_loop(self: &Arc<Self>) {
        loop {
            if !*self.running.read().await {
                break;
            }

            let sleep_ms = self.ms_until_next_wake().await;

            if sleep_ms > 0 {
                let notify = Arc::clone(&self.wake_notify);
                tokio::select! {
                    () = tokio::time::sleep(Duration::from_millis(sleep_ms)) => {},
                    () = notify.notified() => {
                        debug!("timer loop woken by notify");
                        continue;
                    },
                }
            }

            if !*self.running.read().await {
                break;
            }

            self.process_due_ticks().await;
        }
    }

    async fn ms_until_next_wake(&self) -> u64 {
        let schedules = self.schedules.read().await;
        let now = now_ms();
        schedules
            .iter()
            .filter(|s| s.state == ScheduleState::Running)
            .filter_map(|s| s.next_tick_at_ms)
            .map(|t| t.saturating_sub(now))
            .min()
            .unwrap_or(60_000) // poll every 60s if nothing is scheduled
    }

    async fn process_due_ticks(self: &Arc<Self>) {
        let now = now_ms();
        let due: Vec<CourseSchedule> = {
            let mut schedules = self.schedules.write().await;
            let mut due = Vec::new();
            for schedule in schedules.iter_mut() {
                if schedule.state == ScheduleState::Running
                    && schedule.next_tick_at_ms.is_some_and(|t| t <= now)
                {
                    // Move the cached next tick forward before spawning so
                    // this loop does not re-fire the same tick.
                    schedule.next_tick_at_ms =
                        next_tick(&schedule.tick_cron, schedule.timezone.as_deref(), now)
                            .unwrap_or(None);
                    due.push(schedule.clone());
                }
            }
            due
        };

        for schedule in due {
            let svc = Arc::clone(self);
            tokio::spawn(async move {
                svc.execute_tick(&schedule).await;
            });
        }
    }

    /// One claimed fan-out pass for a schedule snapshot.
    async fn execute_tick(&self, schedule: &CourseSchedule) {
        let id = &schedule.id;
        let course_id = &schedule.course_id;
        let cursor = schedule.current_lesson_index;
        let now = now_ms();

        let claimed = match self
            .store
            .claim_tick(id, cursor, now, now.saturating_sub(self.tuning.stuck_claim_ms))
            .await
        {
            Ok(c) => c,
            Err(e) => {
                error!(id, error = %e, "tick claim failed");
                return;
            },
        };
        if !claimed {
            #[cfg(feature = "metrics")]
            counter!(scheduler_metrics::TICKS_SKIPPED_TOTAL).increment(1);
            debug!(id, cursor, "tick already claimed or cursor moved, skipping");
            self.refresh_cached(id).await;
            return;
        }
        self.update_cached(id, |s| s.tick_claimed_at_ms = Some(now)).await;

        let total = match self.directory.lesson_count(course_id).await {
            Ok(t) => t,
            Err(e) => {
                warn!(id, course_id = %course_id, error = %e, "lesson count unavailable, releasing tick");
                self.release(id, cursor).await;
                return;
            },
        };

        let lesson = if cursor >= total {
            None
        } else {
            match self.directory.lesson(course_id, cursor).await {
                Ok(l) => l,
                Err(e) => {
                    warn!(id, course_id = %course_id, error = %e, "lesson fetch failed, releasing tick");
                    self.release(id, cursor).await;
                    return;
                },
            }
        };

        let Some(lesson) = lesson else {
            // Timeline exhausted: the course is done.
            self.release(id, cursor).await;
            if let Err(e) = self.store.set_state(id, ScheduleState::Completed, now_ms()).await {
                warn!(id, error = %e, "failed to mark schedule completed");
                return;
            }
            self.update_cached(id, |s| {
                s.state = ScheduleState::Completed;
                s.next_tick_at_ms = None;
            })
            .await;
            info!(id, course_id = %course_id, lessons = total, "course schedule completed");
            return;
        };

        let roster = match self.directory.roster(course_id).await {
            Ok(r) => r,
            Err(e) => {
                warn!(id, course_id = %course_id, error = %e, "roster unavailable, releasing tick");
                self.release(id, cursor).await;
                return;
            },
        };

        #[cfg(feature = "metrics")]
        counter!(scheduler_metrics::TICKS_TOTAL).increment(1);

        let mut accepted = 0usize;
        let mut deduped = 0usize;
        for recipient in &roster {
            let payload = JobPayload::Lesson {
                course_id: course_id.clone(),
                lesson_id: lesson.lesson_id.clone(),
                recipient: recipient.clone(),
                title: lesson.title.clone(),
                body: lesson.body.clone(),
                media_url: lesson.media_url.clone(),
                quiz: lesson.quiz.clone(),
            };
            match self.queue.enqueue(payload).await {
                Ok(enq) if enq.accepted => accepted += 1,
                Ok(_) => deduped += 1,
                Err(e) => {
                    warn!(id, recipient = %recipient, error = %e, "fan-out enqueue failed");
                },
            }
            #[cfg(feature = "metrics")]
            counter!(scheduler_metrics::FANOUT_TOTAL).increment(1);
        }

        // Every fan-out call has been issued — only now advance the cursor.
        let advanced = match self.store.complete_tick(id, cursor, now_ms()).await {
            Ok(a) => a,
            Err(e) => {
                error!(id, error = %e, "cursor advance failed");
                return;
            },
        };
        if !advanced {
            warn!(id, cursor, "cursor moved under a claimed tick, not advancing");
            return;
        }
        self.update_cached(id, |s| {
            s.current_lesson_index = cursor + 1;
            s.tick_claimed_at_ms = None;
        })
        .await;

        info!(
            id,
            course_id = %course_id,
            lesson_id = %lesson.lesson_id,
            cursor,
            recipients = roster.len(),
            accepted,
            deduped,
            "lesson fan-out finished"
        );

        if cursor + 1 >= total {
            if let Err(e) = self.store.set_state(id, ScheduleState::Completed, now_ms()).await {
                warn!(id, error = %e, "failed to mark schedule completed");
                return;
            }
            self.update_cached(id, |s| {
                s.state = ScheduleState::Completed;
                s.next_tick_at_ms = None;
            })
            .await;
            info!(id, course_id = %course_id, "last lesson dispatched, schedule completed");
        }
    }

    async fn release(&self, id: &str, cursor: u32) {
        if let Err(e) = self.store.release_tick(id, cursor, now_ms()).await {
            warn!(id, error = %e, "tick release failed");
        }
        self.update_cached(id, |s| s.tick_claimed_at_ms = None).await;
    }

    fn compute_next(&self, schedule: &CourseSchedule, now: u64) -> Option<u64> {
        if schedule.state != ScheduleState::Running {
            return None;
        }
        match next_tick(&schedule.tick_cron, schedule.timezone.as_deref(), now) {
            Ok(next) => next,
            Err(e) => {
                warn!(id = %schedule.id, error = %e, "bad schedule expression");
                None
            },
        }
    }

    async fn update_cached<F: FnOnce(&mut CourseSchedule)>(&self, id: &str, f: F) {
        let mut schedules = self.schedules.write().await;
        if let Some(schedule) = schedules.iter_mut().find(|s| s.id == id) {
            f(schedule);
        }
    }

    async fn refresh_cached(&self, id: &str) {
        let Ok(Some(fresh)) = self.store.get(id).await else {
            return;
        };
        let mut schedules = self.schedules.write().await;
        if let Some(schedule) = schedules.iter_mut().find(|s| s.id == id) {
            let next = schedule.next_tick_at_ms;
            *schedule = fresh;
            schedule.next_tick_at_ms = next;
        }
    }
}
