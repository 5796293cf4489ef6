//! Domain models for the upload pipeline

pub mod album;
pub mod stage;
pub mod track;
pub mod upload;

pub use album::Album;
pub use stage::Stage;
pub use track::{HlsStatus, HlsUpdate, Track};
pub use upload::{
    StageError, StageRecord, Upload, UploadMetadata, UploadProgress, UploadStatus,
    UNKNOWN_ARTIST,
};
