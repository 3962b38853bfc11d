//! In-memory quiz context store for testing.

use std::{collections::HashMap, sync::Mutex};

use async_trait::async_trait;

use {
    crate::{
        Result,
        quiz::{QuizContext, QuizContextStore},
    },
    lernio_queue::AuxiliarySweep,
};

/// In-memory store backed by `HashMap`. No persistence — for tests only.
pub struct InMemoryQuizContextStore {
    contexts: Mutex<HashMap<String, QuizContext>>,
}

impl InMemoryQuizContextStore {
    pub fn new() -> Self {
        Self {
            contexts: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryQuizContextStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QuizContextStore for InMemoryQuizContextStore {
    async fn put(&self, context: QuizContext) -> Result<()> {
        let mut contexts = self.contexts.lock().unwrap_or_else(|e| e.into_inner());
        contexts.insert(context.recipient.clone(), context);
        Ok(())
    }

    async fn get_active(&self, recipient: &str, now_ms: u64) -> Result<Option<QuizContext>> {
        let contexts = self.contexts.lock().unwrap_or_else(|e| e.into_inner());
        Ok(contexts
            .get(recipient)
            .filter(|c| c.expires_at_ms > now_ms)
            .cloned())
    }

    async fn purge_expired(&self, now_ms: u64) -> Result<u64> {
        let mut contexts = self.contexts.lock().unwrap_or_else(|e| e.into_inner());
        let before = contexts.len();
        contexts.retain(|_, c| c.expires_at_ms > now_ms);
        Ok((before - contexts.len()) as u64)
    }
}

#[async_trait]
impl AuxiliarySweep for InMemoryQuizContextStore {
    fn name(&self) -> &str {
        "quiz_contexts"
    }

    async fn purge_expired(&self, now_ms: u64) -> anyhow::Result<u64> {
        Ok(QuizContextStore::purge_expired(self, now_ms).await?)
    }
}
