//! Metric definitions for the delivery pipeline.
//!
//! Thin layer over the `metrics` facade: pipeline crates depend on this
//! optionally (behind their `metrics` feature) and record against the
//! constants in [`definitions`] so metric names stay consistent. Without a
//! recorder installed the macros are no-ops.

mod definitions;

pub use definitions::*;

// Re-export metrics macros for convenience
pub use metrics::{counter, gauge, histogram};
