//! Per-category delivery worker pools.

use std::{sync::Arc, time::Duration};

use {
    tokio::{
        sync::{Mutex, watch},
        task::JoinHandle,
    },
    tracing::{debug, info, warn},
};

#[cfg(feature = "metrics")]
use lernio_metrics::{counter, delivery as delivery_metrics, histogram};

use {
    lernio_channels::{
        DeliveryClient, DeliveryError, Direction, ErrorClass, MessageLog, MessageRecord,
        MessageStatus,
    },
    lernio_common::time::now_ms,
    lernio_queue::{FailureKind, Job, JobCategory, JobPayload, JobQueue},
    lernio_reconcile::{QuizContext, QuizContextStore},
};

use crate::content;

/// Worker behavior knobs, usually mapped from the application config.
#[derive(Debug, Clone)]
pub struct WorkerTuning {
    /// Concurrent deliveries per category.
    pub concurrency: usize,
    /// Sleep between polls when the queue is empty.
    pub poll_interval: Duration,
    /// Bound on one delivery-client call; an elapse is a transient failure.
    pub send_timeout: Duration,
    /// How long a delivered quiz stays answerable.
    pub quiz_ttl: Duration,
}

impl Default for WorkerTuning {
    fn default() -> Self {
        Self {
            concurrency: 5,
            poll_interval: Duration::from_millis(500),
            send_timeout: Duration::from_secs(60),
            quiz_ttl: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// Spawns and supervises the per-category worker loops.
pub struct WorkerPool {
    queue: Arc<JobQueue>,
    client: Arc<dyn DeliveryClient>,
    log: Arc<dyn MessageLog>,
    quiz: Arc<dyn QuizContextStore>,
    tuning: WorkerTuning,
    shutdown: watch::Sender<bool>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    pub fn new(
        queue: Arc<JobQueue>,
        client: Arc<dyn DeliveryClient>,
        log: Arc<dyn MessageLog>,
        quiz: Arc<dyn QuizContextStore>,
        tuning: WorkerTuning,
    ) -> Arc<Self> {
        let (shutdown, _) = watch::channel(false);
        Arc::new(Self {
            queue,
            client,
            log,
            quiz,
            tuning,
            shutdown,
            handles: Mutex::new(Vec::new()),
        })
    }

    /// Spawn `concurrency` worker loops for every category.
    pub async fn start(self: &Arc<Self>) {
        let mut handles = self.handles.lock().await;
        for category in JobCategory::ALL {
            for slot in 0..self.tuning.concurrency {
                let pool = Arc::clone(self);
                let mut shutdown_rx = self.shutdown.subscribe();
                handles.push(tokio::spawn(async move {
                    pool.worker_loop(category, slot, &mut shutdown_rx).await;
                }));
            }
        }
        info!(
            concurrency = self.tuning.concurrency,
            categories = JobCategory::ALL.len(),
            "delivery workers started"
        );
    }

    /// Signal shutdown and wait for in-flight deliveries to finish.
    pub async fn stop(&self) {
        let _ = self.shutdown.send(true);
        let mut handles = self.handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
        info!("delivery workers stopped");
    }

    async fn worker_loop(
        &self,
        category: JobCategory,
        slot: usize,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) {
        debug!(category = category.as_str(), slot, "worker loop up");
        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            let taken = tokio::select! {
                taken = self.queue.take(category, 1) => taken,
                _ = shutdown_rx.changed() => break,
            };

            let job = match taken {
                Ok(mut jobs) => jobs.pop(),
                Err(e) => {
                    warn!(category = category.as_str(), error = %e, "take failed");
                    None
                },
            };

            match job {
                Some(job) => self.deliver(job).await,
                None => {
                    // Queue empty — idle until the next poll or shutdown.
                    tokio::select! {
                        () = tokio::time::sleep(self.tuning.poll_interval) => {},
                        _ = shutdown_rx.changed() => break,
                    }
                },
            }
        }
        debug!(category = category.as_str(), slot, "worker loop down");
    }

    /// Deliver one job: send every content item, then ack or fail.
    async fn deliver(&self, job: Job) {
        let started = now_ms();
        let recipient = job.payload.recipient().to_string();
        let items = content::render(&job.payload);

        for item in &items {
            #[cfg(feature = "metrics")]
            counter!(delivery_metrics::SENDS_TOTAL).increment(1);

            let sent = tokio::time::timeout(
                self.tuning.send_timeout,
                self.client.send(&recipient, item),
            )
            .await;

            let result = match sent {
                Ok(result) => result,
                Err(_) => Err(DeliveryError::Timeout {
                    timeout_secs: self.tuning.send_timeout.as_secs(),
                }),
            };

            match result {
                Ok(provider_message_id) => {
                    self.record_sent(&job, &recipient, item, &provider_message_id)
                        .await;
                },
                Err(e) => {
                    #[cfg(feature = "metrics")]
                    counter!(delivery_metrics::SEND_ERRORS_TOTAL).increment(1);
                    let kind = match e.class() {
                        ErrorClass::Transient => FailureKind::Transient,
                        ErrorClass::Permanent => FailureKind::Permanent,
                    };
                    warn!(
                        id = %job.id,
                        recipient = %recipient,
                        error = %e,
                        classification = ?kind,
                        "delivery failed"
                    );
                    if let Err(fail_err) = self.queue.fail(&job.id, &e.to_string(), kind).await {
                        warn!(id = %job.id, error = %fail_err, "fail report failed");
                    }
                    return;
                },
            }
        }

        // Every item went out; arm the quiz context before acking so a fast
        // reply cannot race an unregistered quiz.
        if let JobPayload::Lesson {
            course_id,
            lesson_id,
            quiz: Some(quiz),
            ..
        } = &job.payload
        {
            let context = QuizContext {
                recipient: recipient.clone(),
                course_id: course_id.clone(),
                lesson_id: lesson_id.clone(),
                correct_option_id: quiz.correct_option_id.clone(),
                expires_at_ms: now_ms() + self.tuning.quiz_ttl.as_millis() as u64,
            };
            if let Err(e) = self.quiz.put(context).await {
                warn!(id = %job.id, error = %e, "quiz context registration failed");
            }
        }

        if let Err(e) = self.queue.ack(&job.id).await {
            warn!(id = %job.id, error = %e, "ack failed");
            return;
        }

        #[cfg(feature = "metrics")]
        histogram!(delivery_metrics::DURATION_SECONDS)
            .record((now_ms().saturating_sub(started)) as f64 / 1000.0);
        #[cfg(not(feature = "metrics"))]
        let _ = started;

        debug!(
            id = %job.id,
            category = job.category.as_str(),
            recipient = %recipient,
            items = items.len(),
            "job delivered"
        );
    }

    async fn record_sent(
        &self,
        job: &Job,
        recipient: &str,
        item: &lernio_channels::OutboundContent,
        provider_message_id: &str,
    ) {
        let now = now_ms();
        let record = MessageRecord {
            provider_message_id: provider_message_id.to_string(),
            direction: Direction::Outgoing,
            category: job.category.as_str().to_string(),
            recipient: recipient.to_string(),
            body: content::record_body(item),
            status: MessageStatus::Sent,
            course_id: job.payload.course_id().map(str::to_string),
            lesson_id: match &job.payload {
                JobPayload::Lesson { lesson_id, .. } => Some(lesson_id.clone()),
                _ => None,
            },
            created_at_ms: now,
            updated_at_ms: now,
        };
        if let Err(e) = self.log.record(record).await {
            warn!(
                id = %job.id,
                provider_message_id,
                error = %e,
                "failed to log outgoing message"
            );
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use {async_trait::async_trait, tokio::sync::Mutex as AsyncMutex};

    use {
        super::*,
        lernio_channels::{OutboundContent, log_memory::InMemoryMessageLog},
        lernio_queue::{
            JobState, LessonQuiz, QueueTuning, QuizOption, store_memory::InMemoryJobStore,
        },
        lernio_reconcile::quiz_memory::InMemoryQuizContextStore,
    };

    /// Scriptable fake client: fails the first `fail_count` sends, then
    /// succeeds with generated ids.
    struct FakeClient {
        sends: AsyncMutex<Vec<OutboundContent>>,
        fail_count: AtomicU32,
        failure: fn() -> DeliveryError,
        delay: Duration,
        counter: AtomicU32,
    }

    impl FakeClient {
        fn ok() -> Self {
            Self {
                sends: AsyncMutex::new(Vec::new()),
                fail_count: AtomicU32::new(0),
                failure: || DeliveryError::network("unreachable"),
                delay: Duration::ZERO,
                counter: AtomicU32::new(0),
            }
        }

        fn failing(count: u32, failure: fn() -> DeliveryError) -> Self {
            Self {
                fail_count: AtomicU32::new(count),
                failure,
                ..Self::ok()
            }
        }
    }

    #[async_trait]
    impl DeliveryClient for FakeClient {
        async fn send(
            &self,
            _recipient: &str,
            content: &OutboundContent,
        ) -> Result<String, DeliveryError> {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self
                .fail_count
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err((self.failure)());
            }
            self.sends.lock().await.push(content.clone());
            let n = self.counter.fetch_add(1, Ordering::SeqCst);
            Ok(format!("wamid.fake{n}"))
        }
    }

    struct Harness {
        pool: Arc<WorkerPool>,
        queue: Arc<JobQueue>,
        log: Arc<InMemoryMessageLog>,
        quiz: Arc<InMemoryQuizContextStore>,
        client: Arc<FakeClient>,
    }

    fn make_harness(client: FakeClient, tuning: WorkerTuning) -> Harness {
        let queue = JobQueue::new(Arc::new(InMemoryJobStore::new()), QueueTuning::default());
        let log = Arc::new(InMemoryMessageLog::new());
        let quiz = Arc::new(InMemoryQuizContextStore::new());
        let client = Arc::new(client);
        let pool = WorkerPool::new(
            Arc::clone(&queue),
            Arc::clone(&client) as Arc<dyn DeliveryClient>,
            Arc::clone(&log) as Arc<dyn MessageLog>,
            Arc::clone(&quiz) as Arc<dyn QuizContextStore>,
            tuning,
        );
        Harness {
            pool,
            queue,
            log,
            quiz,
            client,
        }
    }

    fn lesson(quiz: Option<LessonQuiz>) -> JobPayload {
        JobPayload::Lesson {
            course_id: "C1".into(),
            lesson_id: "lesson1".into(),
            recipient: "+15550001".into(),
            title: "Intro".into(),
            body: "Hello".into(),
            media_url: None,
            quiz,
        }
    }

    /// Enqueue, take, and deliver one job inline (no background loops).
    async fn deliver_one(harness: &Harness, payload: JobPayload) -> String {
        let enq = harness.queue.enqueue(payload).await.unwrap();
        let id = enq.job_id.unwrap();
        let mut taken = harness.queue.take(JobCategory::Lesson, 1).await.unwrap();
        let job = taken.pop().unwrap_or_else(|| panic!("job not takeable"));
        harness.pool.deliver(job).await;
        id
    }

    #[tokio::test]
    async fn test_successful_delivery_acks_and_logs() {
        let harness = make_harness(FakeClient::ok(), WorkerTuning::default());
        let id = deliver_one(&harness, lesson(None)).await;

        let job = harness.queue.get(&id).await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Completed);

        let record = harness.log.get("wamid.fake0").await.unwrap().unwrap();
        assert_eq!(record.status, MessageStatus::Sent);
        assert_eq!(record.direction, Direction::Outgoing);
        assert_eq!(record.course_id.as_deref(), Some("C1"));
        assert_eq!(record.lesson_id.as_deref(), Some("lesson1"));
    }

    #[tokio::test]
    async fn test_transient_failure_schedules_retry() {
        let harness = make_harness(
            FakeClient::failing(1, || DeliveryError::network("reset")),
            WorkerTuning::default(),
        );
        let id = deliver_one(&harness, lesson(None)).await;

        let job = harness.queue.get(&id).await.unwrap().unwrap();
        assert_eq!(job.state, JobState::RetryPending);
        assert_eq!(job.attempt_count, 1);
        assert!(job.last_error.as_deref().unwrap().contains("reset"));
    }

    #[tokio::test]
    async fn test_permanent_failure_exhausts() {
        let harness = make_harness(
            FakeClient::failing(10, || DeliveryError::Provider {
                status: 400,
                message: "bad recipient".into(),
            }),
            WorkerTuning::default(),
        );
        let id = deliver_one(&harness, lesson(None)).await;

        let job = harness.queue.get(&id).await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Exhausted);
        assert_eq!(job.attempt_count, 1, "no retries for permanent failures");
    }

    #[tokio::test]
    async fn test_slow_client_times_out_as_transient() {
        let mut client = FakeClient::ok();
        client.delay = Duration::from_millis(200);
        let tuning = WorkerTuning {
            send_timeout: Duration::from_millis(20),
            ..WorkerTuning::default()
        };
        let harness = make_harness(client, tuning);
        let id = deliver_one(&harness, lesson(None)).await;

        let job = harness.queue.get(&id).await.unwrap().unwrap();
        assert_eq!(job.state, JobState::RetryPending);
        assert!(job.last_error.as_deref().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_lesson_with_quiz_registers_context() {
        let harness = make_harness(FakeClient::ok(), WorkerTuning::default());
        let quiz = LessonQuiz {
            question: "2+2?".into(),
            options: vec![
                QuizOption {
                    id: "a".into(),
                    label: "3".into(),
                },
                QuizOption {
                    id: "b".into(),
                    label: "4".into(),
                },
            ],
            correct_option_id: "b".into(),
        };
        deliver_one(&harness, lesson(Some(quiz))).await;

        // Body + buttons were both sent.
        assert_eq!(harness.client.sends.lock().await.len(), 2);

        let context = harness
            .quiz
            .get_active("+15550001", now_ms())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(context.correct_option_id, "b");
        assert_eq!(context.lesson_id, "lesson1");
    }

    #[tokio::test]
    async fn test_worker_loop_end_to_end() {
        let harness = make_harness(FakeClient::ok(), WorkerTuning {
            concurrency: 2,
            poll_interval: Duration::from_millis(10),
            ..WorkerTuning::default()
        });
        harness.pool.start().await;

        let enq = harness.queue.enqueue(lesson(None)).await.unwrap();
        let id = enq.job_id.unwrap();

        // Wait for the background workers to pick it up.
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let job = harness.queue.get(&id).await.unwrap().unwrap();
            if job.state == JobState::Completed {
                break;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "job not delivered in time (state: {:?})",
                job.state
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        harness.pool.stop().await;
    }
}
