//! Cadence Storage Library
//!
//! Object-store abstraction used by the pipeline stages. It includes the
//! Storage trait and implementations for S3 (via `object_store`) and the local
//! filesystem.
//!
//! # Storage key format
//!
//! Raw uploads arrive under `uploads/{user_id}/{file_name}`; the mover
//! relocates them to `media/{user_id}/{track_id}{ext}`. HLS renditions are
//! written by the encoder under `hls/{user_id}/{track_id}/`.
//!
//! Keys must not contain `..` or a leading `/`.

pub mod factory;
pub mod keys;
#[cfg(feature = "storage-local")]
pub mod local;
#[cfg(feature = "storage-s3")]
pub mod s3;
pub mod traits;

// Re-export commonly used types
pub use cadence_core::StorageBackend;
pub use factory::create_storage;
pub use keys::{extension_of, hls_manifest_key, hls_output_prefix, media_key};
#[cfg(feature = "storage-local")]
pub use local::LocalStorage;
#[cfg(feature = "storage-s3")]
pub use s3::S3Storage;
pub use traits::{Storage, StorageError, StorageResult};
