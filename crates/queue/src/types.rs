//! Core data types for the job queue.

use serde::{Deserialize, Serialize};

use crate::{Result, error::Error, fingerprint};

/// Message class. Determines the queue, the fingerprint shape, and how the
/// worker renders outbound content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobCategory {
    Lesson,
    Reminder,
    Notification,
    Welcome,
    Text,
}

impl JobCategory {
    pub const ALL: [Self; 5] = [
        Self::Lesson,
        Self::Reminder,
        Self::Notification,
        Self::Welcome,
        Self::Text,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lesson => "lesson",
            Self::Reminder => "reminder",
            Self::Notification => "notification",
            Self::Welcome => "welcome",
            Self::Text => "text",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "lesson" => Some(Self::Lesson),
            "reminder" => Some(Self::Reminder),
            "notification" => Some(Self::Notification),
            "welcome" => Some(Self::Welcome),
            "text" => Some(Self::Text),
            _ => None,
        }
    }
}

/// One quiz option offered with a lesson.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizOption {
    pub id: String,
    pub label: String,
}

/// Quiz attached to a lesson; sent as quick-reply buttons after the body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonQuiz {
    pub question: String,
    pub options: Vec<QuizOption>,
    pub correct_option_id: String,
}

/// Category-tagged job payload. Each handler receives exactly the fields its
/// category needs; the tag doubles as the category on the wire, so an enqueue
/// request body is `{"category": "...", ...payload fields}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "category", rename_all = "lowercase")]
pub enum JobPayload {
    #[serde(rename_all = "camelCase")]
    Lesson {
        course_id: String,
        lesson_id: String,
        recipient: String,
        title: String,
        body: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        media_url: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        quiz: Option<LessonQuiz>,
    },
    #[serde(rename_all = "camelCase")]
    Reminder {
        course_id: String,
        recipient: String,
        body: String,
    },
    #[serde(rename_all = "camelCase")]
    Notification {
        course_id: String,
        recipient: String,
        body: String,
    },
    #[serde(rename_all = "camelCase")]
    Welcome {
        display_name: String,
        recipient: String,
        body: String,
    },
    #[serde(rename_all = "camelCase")]
    Text { recipient: String, body: String },
}

impl JobPayload {
    #[must_use]
    pub fn category(&self) -> JobCategory {
        match self {
            Self::Lesson { .. } => JobCategory::Lesson,
            Self::Reminder { .. } => JobCategory::Reminder,
            Self::Notification { .. } => JobCategory::Notification,
            Self::Welcome { .. } => JobCategory::Welcome,
            Self::Text { .. } => JobCategory::Text,
        }
    }

    #[must_use]
    pub fn recipient(&self) -> &str {
        match self {
            Self::Lesson { recipient, .. }
            | Self::Reminder { recipient, .. }
            | Self::Notification { recipient, .. }
            | Self::Welcome { recipient, .. }
            | Self::Text { recipient, .. } => recipient,
        }
    }

    /// Course context, where the category carries one.
    #[must_use]
    pub fn course_id(&self) -> Option<&str> {
        match self {
            Self::Lesson { course_id, .. }
            | Self::Reminder { course_id, .. }
            | Self::Notification { course_id, .. } => Some(course_id),
            Self::Welcome { .. } | Self::Text { .. } => None,
        }
    }

    /// Reject payloads whose fingerprint fields are empty.
    pub fn validate(&self) -> Result<()> {
        if self.recipient().is_empty() {
            return Err(Error::invalid_payload("recipient must not be empty"));
        }
        match self {
            Self::Lesson {
                course_id,
                lesson_id,
                ..
            } => {
                if course_id.is_empty() || lesson_id.is_empty() {
                    return Err(Error::invalid_payload("lesson needs courseId and lessonId"));
                }
            },
            Self::Reminder { course_id, .. } | Self::Notification { course_id, .. } => {
                if course_id.is_empty() {
                    return Err(Error::invalid_payload("courseId must not be empty"));
                }
            },
            Self::Welcome { display_name, .. } => {
                if display_name.is_empty() {
                    return Err(Error::invalid_payload("displayName must not be empty"));
                }
            },
            Self::Text { body, .. } => {
                if body.is_empty() {
                    return Err(Error::invalid_payload("text body must not be empty"));
                }
            },
        }
        Ok(())
    }
}

/// Job lifecycle state.
///
/// `queued → inFlight → {completed | retryPending | exhausted}`;
/// `retryPending → inFlight` on redelivery. Terminal states are immutable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum JobState {
    Queued,
    InFlight,
    RetryPending,
    Completed,
    Exhausted,
}

impl JobState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::InFlight => "inFlight",
            Self::RetryPending => "retryPending",
            Self::Completed => "completed",
            Self::Exhausted => "exhausted",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(Self::Queued),
            "inFlight" => Some(Self::InFlight),
            "retryPending" => Some(Self::RetryPending),
            "completed" => Some(Self::Completed),
            "exhausted" => Some(Self::Exhausted),
            _ => None,
        }
    }

    /// Live jobs count against the dedup index.
    #[must_use]
    pub fn is_live(self) -> bool {
        matches!(self, Self::Queued | Self::InFlight | Self::RetryPending)
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Exhausted)
    }
}

/// A queued unit of delivery work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    pub fingerprint: String,
    pub category: JobCategory,
    pub payload: JobPayload,
    pub state: JobState,
    pub attempt_count: u32,
    /// Earliest time the job may be taken (now for fresh jobs, the backoff
    /// deadline for retries).
    pub scheduled_at_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terminal_at_ms: Option<u64>,
}

impl Job {
    /// Build a fresh queued job for a validated payload.
    #[must_use]
    pub fn new(payload: JobPayload, now_ms: u64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            fingerprint: fingerprint::compute(&payload),
            category: payload.category(),
            payload,
            state: JobState::Queued,
            attempt_count: 0,
            scheduled_at_ms: now_ms,
            last_error: None,
            created_at_ms: now_ms,
            updated_at_ms: now_ms,
            terminal_at_ms: None,
        }
    }
}

/// How a delivery failure should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Retry with backoff until the attempt cap.
    Transient,
    /// Straight to exhausted; retrying cannot succeed.
    Permanent,
}

/// Bounded-retry policy with exponential backoff.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Retries allowed after failures before the job is exhausted.
    pub max_attempts: u32,
    /// Base delay; retry `k` waits `base * 2^(k-1)`.
    pub backoff_base_secs: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base_secs: 60,
        }
    }
}

impl RetryPolicy {
    /// Backoff delay in millis for the given (1-based) failed-attempt count.
    #[must_use]
    pub fn backoff_ms(&self, attempt_count: u32) -> u64 {
        let exponent = attempt_count.saturating_sub(1).min(16);
        self.backoff_base_secs * 1000 * (1u64 << exponent)
    }
}

/// Result of an enqueue call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Enqueued {
    /// False when a live job with the same fingerprint already existed.
    pub accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
}
