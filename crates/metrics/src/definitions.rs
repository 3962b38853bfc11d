//! Metric name and label definitions.
//!
//! Centralizing these keeps names consistent across crates and documents
//! what the pipeline exposes.

/// Job queue metrics
pub mod queue {
    /// Total enqueue calls accepted (a new job was created)
    pub const ENQUEUED_TOTAL: &str = "lernio_queue_enqueued_total";
    /// Total enqueue calls rejected by the live-fingerprint check
    pub const DEDUPED_TOTAL: &str = "lernio_queue_deduped_total";
    /// Total take admissions deferred by the rate limiter
    pub const RATE_DEFERRED_TOTAL: &str = "lernio_queue_rate_deferred_total";
    /// Total jobs that reached the completed state
    pub const COMPLETED_TOTAL: &str = "lernio_queue_completed_total";
    /// Total jobs that reached the exhausted state
    pub const EXHAUSTED_TOTAL: &str = "lernio_queue_exhausted_total";
    /// Total retries scheduled
    pub const RETRIES_TOTAL: &str = "lernio_queue_retries_total";
    /// Jobs currently in flight
    pub const IN_FLIGHT: &str = "lernio_queue_in_flight";
}

/// Delivery worker metrics
pub mod delivery {
    /// Total provider send calls issued
    pub const SENDS_TOTAL: &str = "lernio_delivery_sends_total";
    /// Total provider send calls that failed (any classification)
    pub const SEND_ERRORS_TOTAL: &str = "lernio_delivery_send_errors_total";
    /// Duration of a full job delivery in seconds
    pub const DURATION_SECONDS: &str = "lernio_delivery_duration_seconds";
}

/// Scheduler metrics
pub mod scheduler {
    /// Total schedule ticks that fanned out a lesson
    pub const TICKS_TOTAL: &str = "lernio_scheduler_ticks_total";
    /// Total fan-out enqueue calls issued
    pub const FANOUT_TOTAL: &str = "lernio_scheduler_fanout_total";
    /// Total ticks skipped because another claim was active
    pub const TICKS_SKIPPED_TOTAL: &str = "lernio_scheduler_ticks_skipped_total";
}

/// Webhook / reconciler metrics
pub mod webhook {
    /// Total webhook events accepted for processing
    pub const EVENTS_TOTAL: &str = "lernio_webhook_events_total";
    /// Total events referencing unknown messages (logged and dropped)
    pub const RECONCILE_MISSES_TOTAL: &str = "lernio_webhook_reconcile_misses_total";
    /// Total events dropped because the intake channel was full
    pub const EVENTS_DROPPED_TOTAL: &str = "lernio_webhook_events_dropped_total";
}

/// Retention sweeper metrics
pub mod sweeper {
    /// Total job records deleted by the sweep
    pub const JOBS_SWEPT_TOTAL: &str = "lernio_sweeper_jobs_swept_total";
    /// Total auxiliary records purged by the sweep
    pub const AUX_PURGED_TOTAL: &str = "lernio_sweeper_aux_purged_total";
}
