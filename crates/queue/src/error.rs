use {lernio_common::FromMessage, thiserror::Error};

#[derive(Debug, Error)]
pub enum Error {
    /// The payload is missing or has empty fingerprint fields; never retried.
    #[error("invalid payload: {message}")]
    InvalidPayload { message: String },

    #[error("job not found: {job_id}")]
    JobNotFound { job_id: String },

    /// Ack/fail on a job that is not in-flight (double transition).
    #[error("job not in-flight: {job_id}")]
    NotInFlight { job_id: String },

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error(transparent)]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("{message}")]
    Message { message: String },
}

impl Error {
    #[must_use]
    pub fn invalid_payload(message: impl Into<String>) -> Self {
        Self::InvalidPayload {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn job_not_found(job_id: impl Into<String>) -> Self {
        Self::JobNotFound {
            job_id: job_id.into(),
        }
    }

    #[must_use]
    pub fn not_in_flight(job_id: impl Into<String>) -> Self {
        Self::NotInFlight {
            job_id: job_id.into(),
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
