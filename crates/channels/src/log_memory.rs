//! In-memory message log for testing.

use std::{collections::HashMap, sync::Mutex};

use async_trait::async_trait;

use crate::{
    Result,
    message_log::{MessageLog, MessageRecord, MessageStatus, StatusAdvance},
};

/// In-memory log backed by `HashMap`. No persistence — for tests only.
pub struct InMemoryMessageLog {
    records: Mutex<HashMap<String, MessageRecord>>,
}

impl InMemoryMessageLog {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryMessageLog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageLog for InMemoryMessageLog {
    async fn record(&self, record: MessageRecord) -> Result<()> {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        records.insert(record.provider_message_id.clone(), record);
        Ok(())
    }

    async fn get(&self, provider_message_id: &str) -> Result<Option<MessageRecord>> {
        let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        Ok(records.get(provider_message_id).cloned())
    }

    async fn advance_status(
        &self,
        provider_message_id: &str,
        status: MessageStatus,
        now_ms: u64,
    ) -> Result<StatusAdvance> {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        let Some(record) = records.get_mut(provider_message_id) else {
            return Ok(StatusAdvance::Unknown);
        };
        if !record.status.can_advance_to(status) {
            return Ok(StatusAdvance::NotForward);
        }
        record.status = status;
        record.updated_at_ms = now_ms;
        Ok(StatusAdvance::Advanced)
    }

    async fn recent(&self, limit: u32) -> Result<Vec<MessageRecord>> {
        let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        let mut all: Vec<MessageRecord> = records.values().cloned().collect();
        all.sort_by(|a, b| b.created_at_ms.cmp(&a.created_at_ms));
        all.truncate(limit as usize);
        Ok(all)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::message_log::Direction,
    };

    fn make_record(id: &str, status: MessageStatus) -> MessageRecord {
        MessageRecord {
            provider_message_id: id.into(),
            direction: Direction::Outgoing,
            category: "lesson".into(),
            recipient: "+15550001".into(),
            body: "Lesson 1".into(),
            status,
            course_id: Some("C1".into()),
            lesson_id: Some("L1".into()),
            created_at_ms: 1000,
            updated_at_ms: 1000,
        }
    }

    #[tokio::test]
    async fn test_record_and_get() {
        let log = InMemoryMessageLog::new();
        log.record(make_record("wamid.1", MessageStatus::Sent))
            .await
            .unwrap();
        let got = log.get("wamid.1").await.unwrap().unwrap();
        assert_eq!(got.status, MessageStatus::Sent);
    }

    #[tokio::test]
    async fn test_advance_forward() {
        let log = InMemoryMessageLog::new();
        log.record(make_record("wamid.1", MessageStatus::Sent))
            .await
            .unwrap();

        let out = log
            .advance_status("wamid.1", MessageStatus::Delivered, 2000)
            .await
            .unwrap();
        assert_eq!(out, StatusAdvance::Advanced);
        let got = log.get("wamid.1").await.unwrap().unwrap();
        assert_eq!(got.status, MessageStatus::Delivered);
        assert_eq!(got.updated_at_ms, 2000);
    }

    #[tokio::test]
    async fn test_advance_backward_ignored() {
        let log = InMemoryMessageLog::new();
        log.record(make_record("wamid.1", MessageStatus::Read))
            .await
            .unwrap();

        let out = log
            .advance_status("wamid.1", MessageStatus::Delivered, 2000)
            .await
            .unwrap();
        assert_eq!(out, StatusAdvance::NotForward);
        let got = log.get("wamid.1").await.unwrap().unwrap();
        assert_eq!(got.status, MessageStatus::Read);
    }

    #[tokio::test]
    async fn test_advance_unknown_id() {
        let log = InMemoryMessageLog::new();
        let out = log
            .advance_status("wamid.none", MessageStatus::Delivered, 2000)
            .await
            .unwrap();
        assert_eq!(out, StatusAdvance::Unknown);
    }

    #[tokio::test]
    async fn test_recent_orders_newest_first() {
        let log = InMemoryMessageLog::new();
        for (i, id) in ["a", "b", "c"].iter().enumerate() {
            let mut r = make_record(id, MessageStatus::Sent);
            r.created_at_ms = 1000 + i as u64;
            log.record(r).await.unwrap();
        }
        let recent = log.recent(2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].provider_message_id, "c");
    }
}
