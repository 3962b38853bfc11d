use {lernio_common::FromMessage, thiserror::Error};

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error(transparent)]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error(transparent)]
    CronParse(#[from] cron::error::Error),

    #[error("unknown timezone: {timezone}")]
    UnknownTimezone { timezone: String },

    #[error("schedule not found: {schedule_id}")]
    ScheduleNotFound { schedule_id: String },

    #[error("{message}")]
    Message { message: String },
}

impl Error {
    #[must_use]
    pub fn unknown_timezone(timezone: impl Into<String>) -> Self {
        Self::UnknownTimezone {
            timezone: timezone.into(),
        }
    }

    #[must_use]
    pub fn schedule_not_found(schedule_id: impl Into<String>) -> Self {
        Self::ScheduleNotFound {
            schedule_id: schedule_id.into(),
        }
    }
}

impl FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Message { message }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

lernio_common::impl_context!();
