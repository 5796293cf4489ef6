//! Cadence Core Library
//!
//! This crate provides the domain models, error types, configuration and
//! identifier validation shared by every Cadence pipeline component.

pub mod config;
pub mod error;
pub mod ids;
pub mod models;
pub mod storage_types;
pub mod validation;

// Re-export commonly used types
pub use config::{Config, EncoderConfig};
pub use error::{ErrorMetadata, LogLevel, ValidationError};
pub use ids::{Clock, IdGenerator, SystemClock, UuidIdGenerator};
pub use storage_types::StorageBackend;
