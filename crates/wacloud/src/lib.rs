//! WhatsApp Business Cloud API integration.
//!
//! Outbound sends go through [`client::WaCloudClient`] (a
//! [`lernio_channels::DeliveryClient`]); inbound webhook payloads are parsed
//! by [`types`] and normalized into channel events; [`webhook`] holds the
//! subscription handshake and payload signature checks.

pub mod client;
pub mod config;
pub mod types;
pub mod webhook;

pub use {
    client::WaCloudClient,
    config::WaCloudConfig,
    types::{WebhookPayload, events_from_payload},
    webhook::{verify_signature, verify_subscription},
};
