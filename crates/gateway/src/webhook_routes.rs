//! Provider webhook endpoints.
//!
//! `GET /webhook` is the subscription handshake; `POST /webhook` ingests
//! events. Ingestion always answers 200 after handing events to the
//! reconciler intake — the provider retries non-2xx responses, and a retry
//! flood helps nobody. The one exception is a failed signature check, which
//! is rejected before any parsing.

use {
    axum::{
        Router,
        body::Bytes,
        extract::{Query, State},
        http::{HeaderMap, StatusCode},
        response::IntoResponse,
        routing::get,
    },
    serde::Deserialize,
    tracing::{debug, warn},
};

use lernio_wacloud::{WebhookPayload, events_from_payload, verify_signature, verify_subscription};

use crate::server::AppState;

/// Query parameters of the verification handshake.
#[derive(Debug, Deserialize)]
pub struct VerifyParams {
    #[serde(rename = "hub.mode")]
    mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    challenge: Option<String>,
}

/// Subscription verification: echo the challenge or reject.
async fn verify_handler(
    State(state): State<AppState>,
    Query(params): Query<VerifyParams>,
) -> impl IntoResponse {
    match verify_subscription(
        params.mode.as_deref(),
        params.verify_token.as_deref(),
        params.challenge.as_deref(),
        &state.wa_config.verify_token,
    ) {
        Some(challenge) => (StatusCode::OK, challenge),
        None => {
            warn!("webhook verification rejected");
            (StatusCode::FORBIDDEN, String::new())
        },
    }
}

/// Event ingestion: authenticate, parse, submit, acknowledge.
async fn ingest_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    if let Some(ref app_secret) = state.wa_config.app_secret {
        let signature = headers
            .get("x-hub-signature-256")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if !verify_signature(&body, signature, app_secret) {
            warn!("webhook payload signature mismatch");
            return (StatusCode::UNAUTHORIZED, "");
        }
    }

    let payload: WebhookPayload = match serde_json::from_slice(&body) {
        Ok(p) => p,
        Err(e) => {
            // Unparsable deliveries are acknowledged so the provider does
            // not retry them forever.
            warn!(error = %e, "unparsable webhook payload");
            return (StatusCode::OK, "EVENT_RECEIVED");
        },
    };

    let events = events_from_payload(payload, &state.wa_config.phone_number_id);
    debug!(count = events.len(), "webhook events extracted");
    for event in events {
        state.submitter.submit(event);
    }

    (StatusCode::OK, "EVENT_RECEIVED")
}

pub fn router() -> Router<AppState> {
    Router::new().route("/webhook", get(verify_handler).post(ingest_handler))
}
