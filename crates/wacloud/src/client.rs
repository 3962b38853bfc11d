//! Cloud API send client.

use std::time::Duration;

use {
    async_trait::async_trait,
    tracing::debug,
};

use lernio_channels::{DeliveryClient, DeliveryError, OutboundContent};

use crate::config::WaCloudConfig;

/// Sends messages through the Cloud API `/{phone_number_id}/messages` endpoint.
pub struct WaCloudClient {
    config: WaCloudConfig,
    http: reqwest::Client,
}

impl WaCloudClient {
    pub fn new(config: WaCloudConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.send_timeout_secs))
            .build()
            .unwrap_or_default();
        Self { config, http }
    }
}

/// Build the request body for one content item.
fn request_body(to: &str, content: &OutboundContent) -> serde_json::Value {
    match content {
        OutboundContent::Text { body } => serde_json::json!({
            "messaging_product": "whatsapp",
            "recipient_type": "individual",
            "to": to,
            "type": "text",
            "text": { "preview_url": false, "body": body },
        }),
        OutboundContent::Media { url, caption } => serde_json::json!({
            "messaging_product": "whatsapp",
            "recipient_type": "individual",
            "to": to,
            "type": "image",
            "image": { "link": url, "caption": caption },
        }),
        OutboundContent::Buttons { body, options } => {
            let buttons: Vec<serde_json::Value> = options
                .iter()
                .map(|o| {
                    serde_json::json!({
                        "type": "reply",
                        "reply": { "id": o.id, "title": o.label },
                    })
                })
                .collect();
            serde_json::json!({
                "messaging_product": "whatsapp",
                "recipient_type": "individual",
                "to": to,
                "type": "interactive",
                "interactive": {
                    "type": "button",
                    "body": { "text": body },
                    "action": { "buttons": buttons },
                },
            })
        },
    }
}

fn validate(content: &OutboundContent) -> Result<(), DeliveryError> {
    match content {
        OutboundContent::Text { body } if body.is_empty() => {
            Err(DeliveryError::invalid_content("empty text body"))
        },
        OutboundContent::Media { url, .. } if url.is_empty() => {
            Err(DeliveryError::invalid_content("empty media url"))
        },
        OutboundContent::Buttons { options, .. } if options.is_empty() || options.len() > 3 => {
            Err(DeliveryError::invalid_content(
                "interactive sends take 1-3 buttons",
            ))
        },
        _ => Ok(()),
    }
}

#[async_trait]
impl DeliveryClient for WaCloudClient {
    async fn send(
        &self,
        recipient: &str,
        content: &OutboundContent,
    ) -> Result<String, DeliveryError> {
        validate(content)?;

        let url = format!(
            "{}/{}/messages",
            self.config.api_base, self.config.phone_number_id
        );

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.access_token)
            .json(&request_body(recipient, content))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DeliveryError::Timeout {
                        timeout_secs: self.config.send_timeout_secs,
                    }
                } else {
                    DeliveryError::network(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(DeliveryError::Provider {
                status: status.as_u16(),
                message,
            });
        }

        let body: serde_json::Value = response.json().await.map_err(DeliveryError::network)?;
        let message_id = body["messages"][0]["id"]
            .as_str()
            .ok_or_else(|| DeliveryError::network("response missing message id"))?
            .to_string();

        debug!(%message_id, recipient, "cloud api send accepted");
        Ok(message_id)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, lernio_channels::ButtonOption};

    #[test]
    fn test_text_body_shape() {
        let body = request_body("15550001", &OutboundContent::Text {
            body: "Lesson 1".into(),
        });
        assert_eq!(body["type"], "text");
        assert_eq!(body["to"], "15550001");
        assert_eq!(body["text"]["body"], "Lesson 1");
        assert_eq!(body["messaging_product"], "whatsapp");
    }

    #[test]
    fn test_media_body_shape() {
        let body = request_body("15550001", &OutboundContent::Media {
            url: "https://cdn.example/l1.png".into(),
            caption: Some("diagram".into()),
        });
        assert_eq!(body["type"], "image");
        assert_eq!(body["image"]["link"], "https://cdn.example/l1.png");
        assert_eq!(body["image"]["caption"], "diagram");
    }

    #[test]
    fn test_buttons_body_shape() {
        let body = request_body("15550001", &OutboundContent::Buttons {
            body: "Pick one".into(),
            options: vec![
                ButtonOption {
                    id: "a".into(),
                    label: "A".into(),
                },
                ButtonOption {
                    id: "b".into(),
                    label: "B".into(),
                },
            ],
        });
        assert_eq!(body["type"], "interactive");
        assert_eq!(body["interactive"]["type"], "button");
        let buttons = body["interactive"]["action"]["buttons"].as_array().unwrap();
        assert_eq!(buttons.len(), 2);
        assert_eq!(buttons[1]["reply"]["id"], "b");
    }

    #[test]
    fn test_validate_rejects_empty_text() {
        assert!(validate(&OutboundContent::Text { body: String::new() }).is_err());
    }

    #[test]
    fn test_validate_rejects_too_many_buttons() {
        let options = (0..4)
            .map(|i| ButtonOption {
                id: format!("o{i}"),
                label: format!("O{i}"),
            })
            .collect();
        assert!(
            validate(&OutboundContent::Buttons {
                body: "q".into(),
                options,
            })
            .is_err()
        );
    }
}
