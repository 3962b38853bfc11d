//! Config schema types for the delivery pipeline.

use {
    secrecy::SecretString,
    serde::Deserialize,
};

/// Root configuration.
///
/// Holds secrets (`SecretString`), so it deliberately does not implement
/// `Serialize`; use [`crate::loader::redacted_summary`] for display.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LernioConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub provider: ProviderConfig,
    pub queue: QueueConfig,
    pub scheduler: SchedulerConfig,
    pub retention: RetentionConfig,
}

/// Gateway server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to. Defaults to "127.0.0.1".
    pub bind: String,
    /// Port to listen on.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".into(),
            port: 8686,
        }
    }
}

/// SQLite database location.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Path to the SQLite file. Defaults to `<data_dir>/lernio.db`.
    pub path: Option<std::path::PathBuf>,
}

/// WhatsApp Cloud API credentials and tuning.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Graph API bearer token.
    pub access_token: SecretString,
    /// Sender phone number id assigned by the provider.
    pub phone_number_id: String,
    /// Token echoed during webhook subscription verification.
    pub verify_token: SecretString,
    /// App secret for `X-Hub-Signature-256` verification. When unset,
    /// inbound payload signatures are not checked.
    pub app_secret: Option<SecretString>,
    /// Graph API base URL (override for tests/proxies).
    pub api_base: String,
    /// Per-send timeout in seconds; an elapsed send counts as a transient
    /// delivery failure.
    pub send_timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            access_token: SecretString::new(String::new()),
            phone_number_id: String::new(),
            verify_token: SecretString::new(String::new()),
            app_secret: None,
            api_base: "https://graph.facebook.com/v21.0".into(),
            send_timeout_secs: 60,
        }
    }
}

/// Job queue and worker-pool tuning.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Jobs admitted to in-flight per one-second window, per category.
    /// Sized to stay under the provider's per-second send quota.
    pub rate_per_sec: u32,
    /// Delivery attempts before a job is exhausted.
    pub max_attempts: u32,
    /// Base delay for exponential retry backoff, in seconds.
    pub backoff_base_secs: u64,
    /// Terminal jobs kept per (category, outcome) for operator inspection.
    pub keep_per_outcome: u32,
    /// Concurrent deliveries per category.
    pub worker_concurrency: usize,
    /// Worker poll interval when the queue is empty, in milliseconds.
    pub poll_interval_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            rate_per_sec: 12,
            max_attempts: 3,
            backoff_base_secs: 60,
            keep_per_outcome: 5,
            worker_concurrency: 5,
            poll_interval_ms: 500,
        }
    }
}

/// Course schedule defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Default delivery-time cron expression for new schedules (5-field).
    pub default_tick: String,
    /// IANA timezone name for cron evaluation. Defaults to UTC when unset.
    pub timezone: Option<String>,
    /// A tick claim older than this is considered stuck and reclaimed.
    pub stuck_claim_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            default_tick: "0 9 * * *".into(),
            timezone: None,
            stuck_claim_secs: 2 * 60 * 60,
        }
    }
}

/// Retention sweeper tuning.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Terminal jobs older than this many days are deleted.
    pub days: u32,
    /// Cron expression for the sweep pass (5-field).
    pub sweep_cron: String,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            days: 30,
            sweep_cron: "0 3 * * *".into(),
        }
    }
}
