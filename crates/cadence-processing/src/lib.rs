//! Cadence Processing Library
//!
//! The upload pipeline: the three stages (register, move, transcode), the
//! orchestrator that drives them for one upload, and the reprocess
//! coordinator that re-enters it at a named stage.
//!
//! Every collaborator (repository, object store, encoder, id generator,
//! clock) is passed in through a [`PipelineContext`]; nothing here builds
//! clients of its own.

pub mod context;
pub mod deadline;
pub mod error;
pub mod orchestrator;
pub mod payloads;
pub mod reprocess;
pub mod stages;
pub mod transcode;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

// Re-export commonly used types
pub use context::{PipelineContext, PipelineSettings};
pub use deadline::with_deadline;
pub use error::{ErrorKind, PipelineError, PipelineResult};
pub use orchestrator::{Orchestrator, PipelineOutcome};
pub use payloads::{
    CoverArt, EngineError, MoveInput, MoveOutput, RegisterInput, RegisterOutput, StatusInput,
    StatusOutput, TranscodeInput, TranscodeOutput, TranscodeStatus,
};
pub use reprocess::ReprocessCoordinator;
pub use stages::{Mover, TrackRegistrar, TranscodeInitiator};
#[cfg(feature = "mediaconvert")]
pub use transcode::MediaConvertEncoder;
pub use transcode::{EncodeJob, EncodeRequest, Encoder, EncoderError};
