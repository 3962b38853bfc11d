//! Deterministic job fingerprints.
//!
//! The fingerprint captures the semantic identity of a send. The enqueuer
//! guarantees at most one live job per (category, fingerprint), which is the
//! system's primary duplicate-send defense — so these formats must stay
//! stable across versions:
//!
//! - lesson:       `{courseId}:{lessonId}:{recipient}`
//! - reminder:     `{courseId}:{recipient}`
//! - notification: `{courseId}:{recipient}`
//! - welcome:      `{displayName}:{recipient}`
//! - text:         `{digest(body)}:{recipient}` (first 16 hex chars of SHA-256)

use sha2::{Digest, Sha256};

use crate::types::JobPayload;

/// Hex chars of the content digest kept in a text fingerprint.
const TEXT_DIGEST_LEN: usize = 16;

/// Compute the fingerprint for a payload.
#[must_use]
pub fn compute(payload: &JobPayload) -> String {
    match payload {
        JobPayload::Lesson {
            course_id,
            lesson_id,
            recipient,
            ..
        } => format!("{course_id}:{lesson_id}:{recipient}"),
        JobPayload::Reminder {
            course_id,
            recipient,
            ..
        }
        | JobPayload::Notification {
            course_id,
            recipient,
            ..
        } => format!("{course_id}:{recipient}"),
        JobPayload::Welcome {
            display_name,
            recipient,
            ..
        } => format!("{display_name}:{recipient}"),
        JobPayload::Text { recipient, body } => {
            format!("{}:{recipient}", text_digest(body))
        },
    }
}

/// Truncated content digest used for free-text fingerprints, so repeated
/// identical replies dedupe while distinct texts do not collide.
#[must_use]
pub fn text_digest(body: &str) -> String {
    let digest = Sha256::digest(body.as_bytes());
    let mut hex = String::with_capacity(TEXT_DIGEST_LEN);
    for byte in digest.iter().take(TEXT_DIGEST_LEN / 2) {
        hex.push_str(&format!("{byte:02x}"));
    }
    hex
}
