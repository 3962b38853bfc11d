//! HTTP gateway and service wiring.
//!
//! Mounts the provider webhook (verification handshake + event ingestion),
//! the enqueue API, and the operator surfaces for jobs and schedules, and
//! assembles the pipeline services from the application config.

pub mod composer;
pub mod courses;
pub mod job_routes;
pub mod schedule_routes;
pub mod server;
pub mod services;
pub mod webhook_routes;

pub use {
    server::{AppState, build_router, run},
    services::Services,
};
