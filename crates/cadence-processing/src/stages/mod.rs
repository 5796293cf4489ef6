//! Pipeline stages. Each is a stateless struct over a [`PipelineContext`]
//! that can run standalone from a stage event or under the orchestrator.
//!
//! [`PipelineContext`]: crate::context::PipelineContext

pub mod mover;
pub mod registrar;
pub mod transcode;

pub use mover::Mover;
pub use registrar::TrackRegistrar;
pub use transcode::TranscodeInitiator;
