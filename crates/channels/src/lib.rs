//! Messaging-provider abstractions.
//!
//! The pipeline talks to the provider through two narrow seams: a
//! [`client::DeliveryClient`] for outbound sends (with classified failures)
//! and a [`message_log::MessageLog`] recording every outbound/inbound message
//! keyed by the provider-assigned id. Inbound webhook traffic is normalized
//! into [`event::InboundEvent`] values before it reaches the reconciler.

pub mod client;
pub mod error;
pub mod event;
pub mod log_memory;
pub mod log_sqlite;
pub mod message_log;

pub use {
    client::{ButtonOption, DeliveryClient, DeliveryError, ErrorClass, OutboundContent},
    error::{Error, Result},
    event::{ContentKind, InboundEvent},
    message_log::{Direction, MessageLog, MessageRecord, MessageStatus, StatusAdvance},
};

/// Run database migrations for the message log.
///
/// Creates the `messages` table. Call at application startup when using
/// [`log_sqlite::SqliteMessageLog`] on a shared pool.
pub async fn run_migrations(pool: &sqlx::SqlitePool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .set_ignore_missing(true)
        .run(pool)
        .await
        .map_err(Error::from)?;
    Ok(())
}
