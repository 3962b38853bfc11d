//! Delivery worker pools.
//!
//! One pool of concurrent workers per job category. A worker takes a job
//! from the rate-limited queue, renders the payload into outbound content
//! items, sends each through the delivery client under a bounded timeout,
//! then acks or fails the job with the failure's retry classification.

pub mod content;
pub mod worker;

pub use worker::{WorkerPool, WorkerTuning};
