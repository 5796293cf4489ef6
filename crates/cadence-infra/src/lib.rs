//! Cadence Infrastructure Library
//!
//! Process-level plumbing shared by the entry points.

pub mod telemetry;

pub use telemetry::{init_telemetry, LogFormat};
