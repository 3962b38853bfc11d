//! The reconciler itself: intake channel plus event processing.

use std::sync::Arc;

use {
    tokio::{sync::mpsc, task::JoinHandle},
    tracing::{debug, info, warn},
};

#[cfg(feature = "metrics")]
use lernio_metrics::{counter, webhook as webhook_metrics};

use {
    lernio_channels::{
        ContentKind, Direction, InboundEvent, MessageLog, MessageRecord, MessageStatus,
        StatusAdvance,
    },
    lernio_common::time::now_ms,
    lernio_queue::{JobPayload, JobQueue},
};

use crate::{
    quiz::{QuizContext, QuizContextStore},
    reply::ReplyComposer,
};

/// Hands events from the webhook handler to the intake task without
/// blocking the request. A full channel drops the event (the provider will
/// redeliver on its own schedule; processing stays best-effort).
#[derive(Clone)]
pub struct EventSubmitter {
    tx: mpsc::Sender<InboundEvent>,
}

impl EventSubmitter {
    /// Returns whether the event was accepted.
    pub fn submit(&self, event: InboundEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => {
                #[cfg(feature = "metrics")]
                counter!(webhook_metrics::EVENTS_TOTAL).increment(1);
                true
            },
            Err(e) => {
                #[cfg(feature = "metrics")]
                counter!(webhook_metrics::EVENTS_DROPPED_TOTAL).increment(1);
                warn!(error = %e, "reconciler intake full, dropping event");
                false
            },
        }
    }
}

/// Create an intake channel pair.
pub fn channel(capacity: usize) -> (EventSubmitter, mpsc::Receiver<InboundEvent>) {
    let (tx, rx) = mpsc::channel(capacity);
    (EventSubmitter { tx }, rx)
}

/// Applies inbound events to the message log and drives reply follow-ups.
pub struct Reconciler {
    log: Arc<dyn MessageLog>,
    queue: Arc<JobQueue>,
    quiz: Arc<dyn QuizContextStore>,
    composer: Arc<dyn ReplyComposer>,
}

impl Reconciler {
    pub fn new(
        log: Arc<dyn MessageLog>,
        queue: Arc<JobQueue>,
        quiz: Arc<dyn QuizContextStore>,
        composer: Arc<dyn ReplyComposer>,
    ) -> Arc<Self> {
        Arc::new(Self {
            log,
            queue,
            quiz,
            composer,
        })
    }

    /// Drain the intake channel until all submitters are dropped.
    pub fn spawn_intake(
        self: &Arc<Self>,
        mut rx: mpsc::Receiver<InboundEvent>,
    ) -> JoinHandle<()> {
        let svc = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                svc.process(event).await;
            }
            info!("reconciler intake closed");
        })
    }

    /// Apply one event. Errors are contained here: reconciliation problems
    /// are logged and dropped, never propagated back to the provider.
    pub async fn process(&self, event: InboundEvent) {
        match event {
            InboundEvent::Status {
                provider_message_id,
                status,
            } => self.process_status(&provider_message_id, status).await,
            InboundEvent::Content {
                from,
                provider_message_id,
                kind,
            } => {
                self.process_content(&from, &provider_message_id, kind)
                    .await;
            },
        }
    }

    async fn process_status(&self, provider_message_id: &str, status: MessageStatus) {
        match self
            .log
            .advance_status(provider_message_id, status, now_ms())
            .await
        {
            Ok(StatusAdvance::Advanced) => {
                debug!(provider_message_id, status = status.as_str(), "status advanced");
            },
            Ok(StatusAdvance::NotForward) => {
                debug!(
                    provider_message_id,
                    status = status.as_str(),
                    "out-of-order status ignored"
                );
            },
            Ok(StatusAdvance::Unknown) => {
                // The provider may report on messages outside our log.
                #[cfg(feature = "metrics")]
                counter!(webhook_metrics::RECONCILE_MISSES_TOTAL).increment(1);
                warn!(
                    provider_message_id,
                    status = status.as_str(),
                    "status event for unknown message, dropping"
                );
            },
            Err(e) => {
                warn!(provider_message_id, error = %e, "status reconciliation failed");
            },
        }
    }

    async fn process_content(&self, from: &str, provider_message_id: &str, kind: ContentKind) {
        let now = now_ms();

        let (category, body, context) = match &kind {
            ContentKind::Text { body } => ("text", body.clone(), None),
            ContentKind::ButtonReply { id, title } => {
                let context = match self.quiz.get_active(from, now).await {
                    Ok(c) => c,
                    Err(e) => {
                        warn!(from, error = %e, "quiz context lookup failed");
                        None
                    },
                };
                let body = if title.is_empty() { id.clone() } else { title.clone() };
                ("button", body, context)
            },
        };

        let record = MessageRecord {
            provider_message_id: provider_message_id.to_string(),
            direction: Direction::Incoming,
            category: category.to_string(),
            recipient: from.to_string(),
            body: body.clone(),
            status: MessageStatus::Received,
            course_id: context.as_ref().map(|c| c.course_id.clone()),
            lesson_id: context.as_ref().map(|c| c.lesson_id.clone()),
            created_at_ms: now,
            updated_at_ms: now,
        };
        if let Err(e) = self.log.record(record).await {
            warn!(provider_message_id, error = %e, "failed to log inbound message");
        }

        match (kind, context) {
            (ContentKind::ButtonReply { id, .. }, Some(context)) => {
                self.answer_quiz(from, &id, &context).await;
            },
            // A tap without an active quiz context is just text to us.
            _ => self.answer_text(from, &body).await,
        }
    }

    async fn answer_quiz(&self, from: &str, selected_option_id: &str, context: &QuizContext) {
        let correct = selected_option_id == context.correct_option_id;
        info!(
            from,
            course_id = %context.course_id,
            lesson_id = %context.lesson_id,
            selected_option_id,
            correct,
            "quiz reply resolved"
        );

        let feedback = match self
            .composer
            .quiz_feedback(context, selected_option_id, correct)
            .await
        {
            Ok(text) => text,
            Err(e) => {
                warn!(from, error = %e, "quiz feedback composition failed");
                return;
            },
        };

        self.enqueue_text(from, feedback).await;
    }

    async fn answer_text(&self, from: &str, text: &str) {
        let reply = match self.composer.free_reply(from, text).await {
            Ok(text) => text,
            Err(e) => {
                warn!(from, error = %e, "reply composition failed");
                return;
            },
        };

        self.enqueue_text(from, reply).await;
    }

    async fn enqueue_text(&self, recipient: &str, body: String) {
        let payload = JobPayload::Text {
            recipient: recipient.to_string(),
            body,
        };
        match self.queue.enqueue(payload).await {
            Ok(enq) if enq.accepted => {
                debug!(recipient, job_id = ?enq.job_id, "follow-up text job enqueued");
            },
            Ok(_) => {
                debug!(recipient, "identical follow-up already live, deduped");
            },
            Err(e) => {
                warn!(recipient, error = %e, "follow-up enqueue failed");
            },
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use {
        super::*,
        crate::quiz_memory::InMemoryQuizContextStore,
        lernio_channels::log_memory::InMemoryMessageLog,
        lernio_queue::{JobCategory, JobFilter, QueueTuning, store_memory::InMemoryJobStore},
    };

    struct CannedComposer;

    #[async_trait]
    impl ReplyComposer for CannedComposer {
        async fn quiz_feedback(
            &self,
            context: &QuizContext,
            _selected_option_id: &str,
            correct: bool,
        ) -> anyhow::Result<String> {
            Ok(format!(
                "{} feedback for {}",
                if correct { "correct" } else { "incorrect" },
                context.lesson_id
            ))
        }

        async fn free_reply(&self, _from: &str, text: &str) -> anyhow::Result<String> {
            Ok(format!("you said: {text}"))
        }
    }

    struct Harness {
        reconciler: Arc<Reconciler>,
        log: Arc<InMemoryMessageLog>,
        queue: Arc<JobQueue>,
        quiz: Arc<InMemoryQuizContextStore>,
    }

    fn make_harness() -> Harness {
        let log = Arc::new(InMemoryMessageLog::new());
        let queue = JobQueue::new(Arc::new(InMemoryJobStore::new()), QueueTuning::default());
        let quiz = Arc::new(InMemoryQuizContextStore::new());
        let reconciler = Reconciler::new(
            Arc::clone(&log) as Arc<dyn MessageLog>,
            Arc::clone(&queue),
            Arc::clone(&quiz) as Arc<dyn QuizContextStore>,
            Arc::new(CannedComposer),
        );
        Harness {
            reconciler,
            log,
            queue,
            quiz,
        }
    }

    fn outgoing_record(id: &str) -> MessageRecord {
        MessageRecord {
            provider_message_id: id.into(),
            direction: Direction::Outgoing,
            category: "lesson".into(),
            recipient: "+15550001".into(),
            body: "Lesson 1".into(),
            status: MessageStatus::Sent,
            course_id: Some("C1".into()),
            lesson_id: Some("L1".into()),
            created_at_ms: 1000,
            updated_at_ms: 1000,
        }
    }

    async fn text_jobs(queue: &JobQueue) -> Vec<lernio_queue::Job> {
        queue
            .list(JobFilter {
                category: Some(JobCategory::Text),
                ..Default::default()
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_status_event_advances_record() {
        let harness = make_harness();
        harness.log.record(outgoing_record("wamid.1")).await.unwrap();

        harness
            .reconciler
            .process(InboundEvent::Status {
                provider_message_id: "wamid.1".into(),
                status: MessageStatus::Delivered,
            })
            .await;

        let got = harness.log.get("wamid.1").await.unwrap().unwrap();
        assert_eq!(got.status, MessageStatus::Delivered);
    }

    #[tokio::test]
    async fn test_unknown_status_event_is_dropped_silently() {
        let harness = make_harness();
        harness
            .reconciler
            .process(InboundEvent::Status {
                provider_message_id: "wamid.ghost".into(),
                status: MessageStatus::Read,
            })
            .await;
        // No record created, no panic, nothing enqueued.
        assert!(harness.log.get("wamid.ghost").await.unwrap().is_none());
        assert!(text_jobs(&harness.queue).await.is_empty());
    }

    #[tokio::test]
    async fn test_backward_status_ignored() {
        let harness = make_harness();
        let mut record = outgoing_record("wamid.1");
        record.status = MessageStatus::Read;
        harness.log.record(record).await.unwrap();

        harness
            .reconciler
            .process(InboundEvent::Status {
                provider_message_id: "wamid.1".into(),
                status: MessageStatus::Delivered,
            })
            .await;

        let got = harness.log.get("wamid.1").await.unwrap().unwrap();
        assert_eq!(got.status, MessageStatus::Read);
    }

    #[tokio::test]
    async fn test_free_text_logs_and_enqueues_reply() {
        let harness = make_harness();
        harness
            .reconciler
            .process(InboundEvent::Content {
                from: "+15550001".into(),
                provider_message_id: "wamid.in1".into(),
                kind: ContentKind::Text {
                    body: "when is the next class?".into(),
                },
            })
            .await;

        let logged = harness.log.get("wamid.in1").await.unwrap().unwrap();
        assert_eq!(logged.direction, Direction::Incoming);
        assert_eq!(logged.status, MessageStatus::Received);

        let jobs = text_jobs(&harness.queue).await;
        assert_eq!(jobs.len(), 1);
        match &jobs[0].payload {
            JobPayload::Text { recipient, body } => {
                assert_eq!(recipient, "+15550001");
                assert_eq!(body, "you said: when is the next class?");
            },
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_quiz_button_resolves_and_enqueues_feedback() {
        let harness = make_harness();
        harness
            .quiz
            .put(QuizContext {
                recipient: "+15550001".into(),
                course_id: "C1".into(),
                lesson_id: "L1".into(),
                correct_option_id: "opt-a".into(),
                expires_at_ms: u64::MAX,
            })
            .await
            .unwrap();

        harness
            .reconciler
            .process(InboundEvent::Content {
                from: "+15550001".into(),
                provider_message_id: "wamid.in1".into(),
                kind: ContentKind::ButtonReply {
                    id: "opt-a".into(),
                    title: "A".into(),
                },
            })
            .await;

        let jobs = text_jobs(&harness.queue).await;
        assert_eq!(jobs.len(), 1);
        match &jobs[0].payload {
            JobPayload::Text { body, .. } => assert_eq!(body, "correct feedback for L1"),
            other => panic!("unexpected payload: {other:?}"),
        }

        // The logged inbound record carries the quiz context refs.
        let logged = harness.log.get("wamid.in1").await.unwrap().unwrap();
        assert_eq!(logged.course_id.as_deref(), Some("C1"));
    }

    #[tokio::test]
    async fn test_repeated_identical_taps_dedupe() {
        let harness = make_harness();
        harness
            .quiz
            .put(QuizContext {
                recipient: "+15550001".into(),
                course_id: "C1".into(),
                lesson_id: "L1".into(),
                correct_option_id: "opt-a".into(),
                expires_at_ms: u64::MAX,
            })
            .await
            .unwrap();

        for i in 0..2 {
            harness
                .reconciler
                .process(InboundEvent::Content {
                    from: "+15550001".into(),
                    provider_message_id: format!("wamid.in{i}"),
                    kind: ContentKind::ButtonReply {
                        id: "opt-a".into(),
                        title: "A".into(),
                    },
                })
                .await;
        }

        // Identical feedback content fingerprints to the same job.
        assert_eq!(text_jobs(&harness.queue).await.len(), 1);
    }

    #[tokio::test]
    async fn test_button_without_context_falls_back_to_text() {
        let harness = make_harness();
        harness
            .reconciler
            .process(InboundEvent::Content {
                from: "+15550001".into(),
                provider_message_id: "wamid.in1".into(),
                kind: ContentKind::ButtonReply {
                    id: "opt-a".into(),
                    title: "A".into(),
                },
            })
            .await;

        let jobs = text_jobs(&harness.queue).await;
        assert_eq!(jobs.len(), 1);
        match &jobs[0].payload {
            JobPayload::Text { body, .. } => assert_eq!(body, "you said: A"),
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_intake_overflow_drops_event() {
        let (submitter, _rx) = channel(1);
        assert!(submitter.submit(InboundEvent::Status {
            provider_message_id: "a".into(),
            status: MessageStatus::Delivered,
        }));
        // No consumer attached; the second submit hits the bound.
        assert!(!submitter.submit(InboundEvent::Status {
            provider_message_id: "b".into(),
            status: MessageStatus::Delivered,
        }));
    }

    #[tokio::test]
    async fn test_intake_task_processes_events() {
        let harness = make_harness();
        harness.log.record(outgoing_record("wamid.1")).await.unwrap();

        let (submitter, rx) = channel(16);
        let handle = harness.reconciler.spawn_intake(rx);

        assert!(submitter.submit(InboundEvent::Status {
            provider_message_id: "wamid.1".into(),
            status: MessageStatus::Delivered,
        }));
        drop(submitter);
        handle.await.unwrap();

        let got = harness.log.get("wamid.1").await.unwrap().unwrap();
        assert_eq!(got.status, MessageStatus::Delivered);
    }
}
