//! Adaptive-bitrate encoder abstraction.
//!
//! The transcode stage only submits jobs; completion is observed elsewhere and
//! moves the track from `processing` to `ready` or `failed`.

#[cfg(feature = "mediaconvert")]
pub mod mediaconvert;

use async_trait::async_trait;
use thiserror::Error;

#[cfg(feature = "mediaconvert")]
pub use mediaconvert::MediaConvertEncoder;

#[derive(Debug, Error)]
pub enum EncoderError {
    #[error("Encoder configuration error: {0}")]
    Config(String),

    #[error("Encode job submission failed: {0}")]
    Submission(String),
}

/// One encode job to submit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeRequest {
    pub user_id: String,
    pub track_id: String,
    /// Object key of the audio in the media bucket
    pub source_key: String,
    /// Key prefix the renditions and manifests are written under, ending in '/'
    pub output_prefix: String,
}

/// Handle of a submitted job and the manifest it will produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeJob {
    pub job_id: String,
    pub manifest_key: String,
}

#[async_trait]
pub trait Encoder: Send + Sync {
    async fn submit(&self, request: &EncodeRequest) -> Result<EncodeJob, EncoderError>;
}
