//! Pipeline assembly from the application config.

use std::{sync::Arc, time::Duration};

use {
    secrecy::ExposeSecret,
    sqlx::{
        SqlitePool,
        sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    },
    tokio::task::JoinHandle,
    tracing::{info, warn},
};

use {
    lernio_channels::{DeliveryClient, MessageLog, log_sqlite::SqliteMessageLog},
    lernio_common::time::now_ms,
    lernio_config::LernioConfig,
    lernio_delivery::{WorkerPool, WorkerTuning},
    lernio_queue::{
        JobQueue, QueueTuning, RetentionSweeper, RetryPolicy, store_sqlite::SqliteJobStore,
    },
    lernio_reconcile::{
        EventSubmitter, Reconciler, ReplyComposer, quiz_sqlite::SqliteQuizContextStore,
    },
    lernio_scheduler::{
        CourseDirectory, ScheduleService, ScheduleTuning, next_tick::next_tick,
        store_sqlite::SqliteScheduleStore,
    },
    lernio_wacloud::{WaCloudClient, WaCloudConfig},
};

use crate::server::AppState;

/// All pipeline services, wired and ready to start.
pub struct Services {
    pub pool: SqlitePool,
    pub queue: Arc<JobQueue>,
    pub workers: Arc<WorkerPool>,
    pub scheduler: Arc<ScheduleService>,
    pub reconciler: Arc<Reconciler>,
    pub submitter: EventSubmitter,
    pub wa_config: Arc<WaCloudConfig>,
    sweeper: Arc<RetentionSweeper>,
    sweep_cron: String,
    sweep_tz: Option<String>,
    background: Vec<JoinHandle<()>>,
}

impl Services {
    /// Open the database, run every crate's migrations, and wire the
    /// pipeline together. The course directory and reply composer are the
    /// external collaborators the caller chooses.
    pub async fn build(
        config: &LernioConfig,
        database_path: &std::path::Path,
        directory: Arc<dyn CourseDirectory>,
        composer: Arc<dyn ReplyComposer>,
    ) -> anyhow::Result<Self> {
        if let Some(parent) = database_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let options = SqliteConnectOptions::new()
            .filename(database_path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        info!(path = %database_path.display(), "database opened");

        lernio_queue::run_migrations(&pool).await?;
        lernio_channels::run_migrations(&pool).await?;
        lernio_scheduler::run_migrations(&pool).await?;
        lernio_reconcile::run_migrations(&pool).await?;

        let wa_config = Arc::new(WaCloudConfig {
            access_token: config.provider.access_token.expose_secret().clone(),
            phone_number_id: config.provider.phone_number_id.clone(),
            verify_token: config.provider.verify_token.expose_secret().clone(),
            app_secret: config
                .provider
                .app_secret
                .as_ref()
                .map(|s| s.expose_secret().clone()),
            api_base: config.provider.api_base.clone(),
            send_timeout_secs: config.provider.send_timeout_secs,
        });
        let client: Arc<dyn DeliveryClient> =
            Arc::new(WaCloudClient::new(wa_config.as_ref().clone()));

        let job_store = Arc::new(SqliteJobStore::with_pool(pool.clone()));
        let queue = JobQueue::new(job_store, QueueTuning {
            rate_per_sec: config.queue.rate_per_sec,
            retry: RetryPolicy {
                max_attempts: config.queue.max_attempts,
                backoff_base_secs: config.queue.backoff_base_secs,
            },
            keep_per_outcome: config.queue.keep_per_outcome,
        });
        queue.recover().await?;

        let log: Arc<dyn MessageLog> = Arc::new(SqliteMessageLog::with_pool(pool.clone()));
        let quiz_store = Arc::new(SqliteQuizContextStore::with_pool(pool.clone()));

        let workers = WorkerPool::new(
            Arc::clone(&queue),
            client,
            Arc::clone(&log),
            Arc::clone(&quiz_store) as Arc<dyn lernio_reconcile::QuizContextStore>,
            WorkerTuning {
                concurrency: config.queue.worker_concurrency,
                poll_interval: Duration::from_millis(config.queue.poll_interval_ms),
                send_timeout: Duration::from_secs(config.provider.send_timeout_secs),
                ..WorkerTuning::default()
            },
        );

        let reconciler = Reconciler::new(
            log,
            Arc::clone(&queue),
            Arc::clone(&quiz_store) as Arc<dyn lernio_reconcile::QuizContextStore>,
            composer,
        );
        let (submitter, intake_rx) = lernio_reconcile::service::channel(1024);

        let schedule_store = Arc::new(SqliteScheduleStore::with_pool(pool.clone()));
        let scheduler = ScheduleService::new(
            schedule_store,
            directory,
            Arc::clone(&queue),
            ScheduleTuning {
                default_tick_cron: config.scheduler.default_tick.clone(),
                default_timezone: config.scheduler.timezone.clone(),
                stuck_claim_ms: config.scheduler.stuck_claim_secs * 1000,
            },
        );

        let scheduler_for_sweep = Arc::clone(&scheduler);
        let sweeper = Arc::new(
            RetentionSweeper::new(queue.store(), config.retention.days)
                .with_auxiliary(quiz_store as Arc<dyn lernio_queue::AuxiliarySweep>)
                .with_active_courses(Arc::new(move || {
                    let scheduler = Arc::clone(&scheduler_for_sweep);
                    Box::pin(async move { scheduler.active_course_ids().await })
                })),
        );

        let mut services = Self {
            pool,
            queue,
            workers,
            scheduler,
            reconciler,
            submitter,
            wa_config,
            sweeper,
            sweep_cron: config.retention.sweep_cron.clone(),
            sweep_tz: config.scheduler.timezone.clone(),
            background: Vec::new(),
        };
        services
            .background
            .push(services.reconciler.spawn_intake(intake_rx));
        Ok(services)
    }

    /// Start workers, the scheduler timer, and the sweep loop.
    pub async fn start(&mut self) -> anyhow::Result<()> {
        self.workers.start().await;
        self.scheduler.start().await?;
        self.background.push(spawn_cron_sweeper(
            Arc::clone(&self.sweeper),
            self.sweep_cron.clone(),
            self.sweep_tz.clone(),
        ));
        Ok(())
    }

    /// Graceful shutdown: stop intake sources, then drain workers.
    pub async fn stop(&mut self) {
        self.scheduler.stop().await;
        self.workers.stop().await;
        for handle in self.background.drain(..) {
            handle.abort();
        }
        info!("pipeline services stopped");
    }

    /// Handler state for [`crate::server::build_router`].
    #[must_use]
    pub fn app_state(&self) -> AppState {
        AppState {
            queue: Arc::clone(&self.queue),
            scheduler: Arc::clone(&self.scheduler),
            submitter: self.submitter.clone(),
            wa_config: Arc::clone(&self.wa_config),
        }
    }
}

/// Run one sweep at startup, then one per firing of the sweep cron.
fn spawn_cron_sweeper(
    sweeper: Arc<RetentionSweeper>,
    cron: String,
    tz: Option<String>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            if let Err(e) = sweeper.sweep_once(now_ms()).await {
                warn!(error = %e, "retention sweep failed");
            }

            let now = now_ms();
            let wait_ms = match next_tick(&cron, tz.as_deref(), now) {
                Ok(Some(next)) => next.saturating_sub(now),
                Ok(None) | Err(_) => {
                    warn!(cron = %cron, "bad sweep schedule, falling back to daily");
                    24 * 60 * 60 * 1000
                },
            };
            tokio::time::sleep(Duration::from_millis(wait_ms.max(1000))).await;
        }
    })
}
