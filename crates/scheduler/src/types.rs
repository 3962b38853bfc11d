//! Core data types for course schedules.

use serde::{Deserialize, Serialize};

/// Per-course schedule state machine.
///
/// `pending → running → {completed | suspended}`; `suspended → running` on
/// resume. Completed schedules ignore further ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleState {
    Pending,
    Running,
    Completed,
    Suspended,
}

impl ScheduleState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Suspended => "suspended",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "suspended" => Some(Self::Suspended),
            _ => None,
        }
    }
}

/// A course delivery schedule with its lesson cursor.
///
/// The cursor (`current_lesson_index`) is owned by the scheduler: it only
/// advances, never rewinds, and only after a full fan-out of the lesson it
/// points at. `tick_claimed_at_ms` is the claim guard — a non-null value
/// means some scheduler instance is mid-fan-out for the current cursor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseSchedule {
    pub id: String,
    pub course_id: String,
    pub state: ScheduleState,
    /// Delivery-time cron expression (5-field).
    pub tick_cron: String,
    /// IANA timezone for cron evaluation; UTC when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    pub current_lesson_index: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tick_claimed_at_ms: Option<u64>,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
    /// Next computed tick time. Runtime-only: recomputed on load, never
    /// persisted.
    #[serde(skip)]
    pub next_tick_at_ms: Option<u64>,
}

/// Input for creating a new schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleCreate {
    pub course_id: String,
    /// Falls back to the configured default delivery time when unset.
    #[serde(default)]
    pub tick_cron: Option<String>,
    #[serde(default)]
    pub timezone: Option<String>,
    /// Start delivering immediately instead of staying `pending`.
    #[serde(default)]
    pub autostart: bool,
}
