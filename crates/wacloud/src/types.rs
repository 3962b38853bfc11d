//! Webhook payload shapes and their mapping to channel events.

use {
    serde::Deserialize,
    tracing::{debug, warn},
};

use lernio_channels::{ContentKind, InboundEvent, MessageStatus};

/// Top-level webhook delivery. One POST may batch several entries.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub entry: Vec<Entry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Entry {
    #[serde(default)]
    pub changes: Vec<Change>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Change {
    #[serde(default)]
    pub field: String,
    pub value: ChangeValue,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChangeValue {
    pub metadata: Option<Metadata>,
    #[serde(default)]
    pub messages: Vec<InboundMessage>,
    #[serde(default)]
    pub statuses: Vec<StatusUpdate>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Metadata {
    #[serde(default)]
    pub phone_number_id: String,
}

/// One inbound learner message.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundMessage {
    pub from: String,
    pub id: String,
    #[serde(rename = "type", default)]
    pub message_type: String,
    pub text: Option<TextBody>,
    pub interactive: Option<Interactive>,
    pub button: Option<TemplateButton>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TextBody {
    #[serde(default)]
    pub body: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Interactive {
    pub button_reply: Option<ButtonReply>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ButtonReply {
    pub id: String,
    #[serde(default)]
    pub title: String,
}

/// Quick-reply tap on a template message.
#[derive(Debug, Clone, Deserialize)]
pub struct TemplateButton {
    #[serde(default)]
    pub payload: String,
    #[serde(default)]
    pub text: String,
}

/// One delivery-status update for a previously sent message.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusUpdate {
    pub id: String,
    #[serde(default)]
    pub status: String,
}

/// Flatten a webhook payload into normalized channel events.
///
/// Non-`messages` changes are ignored, as are payloads reporting a different
/// sender number than ours (misrouted webhook subscriptions).
pub fn events_from_payload(
    payload: WebhookPayload,
    expected_phone_number_id: &str,
) -> Vec<InboundEvent> {
    let mut events = Vec::new();

    for entry in payload.entry {
        for change in entry.changes {
            if change.field != "messages" {
                debug!(field = %change.field, "ignoring non-message webhook change");
                continue;
            }

            let value = change.value;

            if let Some(ref metadata) = value.metadata
                && metadata.phone_number_id != expected_phone_number_id
            {
                warn!(
                    expected = %expected_phone_number_id,
                    received = %metadata.phone_number_id,
                    "phone number id mismatch"
                );
                continue;
            }

            for status in value.statuses {
                let Some(parsed) = MessageStatus::parse(&status.status) else {
                    debug!(status = %status.status, "ignoring unknown status value");
                    continue;
                };
                events.push(InboundEvent::Status {
                    provider_message_id: status.id,
                    status: parsed,
                });
            }

            for msg in value.messages {
                let Some(kind) = content_kind(&msg) else {
                    debug!(msg_type = %msg.message_type, "ignoring unsupported message type");
                    continue;
                };
                events.push(InboundEvent::Content {
                    from: msg.from,
                    provider_message_id: msg.id,
                    kind,
                });
            }
        }
    }

    events
}

fn content_kind(msg: &InboundMessage) -> Option<ContentKind> {
    if let Some(ref interactive) = msg.interactive
        && let Some(ref reply) = interactive.button_reply
    {
        return Some(ContentKind::ButtonReply {
            id: reply.id.clone(),
            title: reply.title.clone(),
        });
    }
    if let Some(ref button) = msg.button {
        return Some(ContentKind::ButtonReply {
            id: button.payload.clone(),
            title: button.text.clone(),
        });
    }
    if let Some(ref text) = msg.text
        && !text.body.is_empty()
    {
        return Some(ContentKind::Text {
            body: text.body.clone(),
        });
    }
    None
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    const PHONE_ID: &str = "1065.....";

    fn parse(json: &str) -> WebhookPayload {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_status_event() {
        let payload = parse(
            r#"{
              "object": "whatsapp_business_account",
              "entry": [{"changes": [{"field": "messages", "value": {
                "metadata": {"phone_number_id": "1065....."},
                "statuses": [{"id": "wamid.X", "status": "delivered"}]
              }}]}]
            }"#,
        );
        let events = events_from_payload(payload, PHONE_ID);
        assert_eq!(events, vec![InboundEvent::Status {
            provider_message_id: "wamid.X".into(),
            status: MessageStatus::Delivered,
        }]);
    }

    #[test]
    fn test_text_message_event() {
        let payload = parse(
            r#"{
              "entry": [{"changes": [{"field": "messages", "value": {
                "metadata": {"phone_number_id": "1065....."},
                "messages": [{"from": "15550001", "id": "wamid.Y",
                              "type": "text", "text": {"body": "hola"}}]
              }}]}]
            }"#,
        );
        let events = events_from_payload(payload, PHONE_ID);
        assert_eq!(events, vec![InboundEvent::Content {
            from: "15550001".into(),
            provider_message_id: "wamid.Y".into(),
            kind: ContentKind::Text {
                body: "hola".into()
            },
        }]);
    }

    #[test]
    fn test_button_reply_event() {
        let payload = parse(
            r#"{
              "entry": [{"changes": [{"field": "messages", "value": {
                "metadata": {"phone_number_id": "1065....."},
                "messages": [{"from": "15550001", "id": "wamid.Z",
                              "type": "interactive",
                              "interactive": {"type": "button_reply",
                                              "button_reply": {"id": "opt-b", "title": "B"}}}]
              }}]}]
            }"#,
        );
        let events = events_from_payload(payload, PHONE_ID);
        assert_eq!(events, vec![InboundEvent::Content {
            from: "15550001".into(),
            provider_message_id: "wamid.Z".into(),
            kind: ContentKind::ButtonReply {
                id: "opt-b".into(),
                title: "B".into()
            },
        }]);
    }

    #[test]
    fn test_phone_number_mismatch_dropped() {
        let payload = parse(
            r#"{
              "entry": [{"changes": [{"field": "messages", "value": {
                "metadata": {"phone_number_id": "other"},
                "statuses": [{"id": "wamid.X", "status": "read"}]
              }}]}]
            }"#,
        );
        assert!(events_from_payload(payload, PHONE_ID).is_empty());
    }

    #[test]
    fn test_non_message_field_ignored() {
        let payload = parse(
            r#"{
              "entry": [{"changes": [{"field": "account_update", "value": {}}]}]
            }"#,
        );
        assert!(events_from_payload(payload, PHONE_ID).is_empty());
    }

    #[test]
    fn test_unknown_status_value_skipped() {
        let payload = parse(
            r#"{
              "entry": [{"changes": [{"field": "messages", "value": {
                "metadata": {"phone_number_id": "1065....."},
                "statuses": [{"id": "wamid.X", "status": "warped"}]
              }}]}]
            }"#,
        );
        assert!(events_from_payload(payload, PHONE_ID).is_empty());
    }
}
