//! Pipeline error taxonomy
//!
//! Every stage returns [`PipelineError`]. Hard failures stop the pipeline and
//! land in `Upload.last_error`; soft failures never reach this type and are
//! only logged through [`soft_failure`].

use std::time::Duration;

use cadence_core::models::Stage;
use cadence_core::{ErrorMetadata, LogLevel, ValidationError};
use cadence_db::RepositoryError;
use cadence_storage::StorageError;
use thiserror::Error;

use crate::transcode::EncoderError;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Encoder(#[from] EncoderError),

    #[error("{stage} stage exceeded its {}s deadline", .limit.as_secs())]
    DeadlineExceeded { stage: Stage, limit: Duration },

    #[error("Conflict: {0}")]
    Conflict(String),
}

pub type PipelineResult<T> = Result<T, PipelineError>;

/// Coarse classification used by entry points to decide what to surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    TransientIo,
    NotFound,
    Conflict,
}

impl PipelineError {
    pub fn conflict(message: impl Into<String>) -> Self {
        PipelineError::Conflict(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Validation(_) => ErrorKind::Validation,
            PipelineError::Repository(RepositoryError::NotFound { .. }) => ErrorKind::NotFound,
            PipelineError::Repository(
                RepositoryError::AlreadyExists { .. } | RepositoryError::VersionConflict { .. },
            ) => ErrorKind::Conflict,
            PipelineError::Repository(_) => ErrorKind::TransientIo,
            PipelineError::Storage(StorageError::NotFound(_)) => ErrorKind::NotFound,
            PipelineError::Storage(StorageError::InvalidKey(_)) => ErrorKind::Validation,
            PipelineError::Storage(_) => ErrorKind::TransientIo,
            PipelineError::Encoder(EncoderError::Config(_)) => ErrorKind::Validation,
            PipelineError::Encoder(_) => ErrorKind::TransientIo,
            PipelineError::DeadlineExceeded { .. } => ErrorKind::TransientIo,
            PipelineError::Conflict(_) => ErrorKind::Conflict,
        }
    }
}

impl ErrorMetadata for PipelineError {
    fn error_code(&self) -> &'static str {
        match self {
            PipelineError::Validation(e) => e.error_code(),
            PipelineError::Repository(e) => e.error_code(),
            PipelineError::Storage(StorageError::NotFound(_)) => "OBJECT_NOT_FOUND",
            PipelineError::Storage(_) => "STORAGE_ERROR",
            PipelineError::Encoder(_) => "ENCODER_ERROR",
            PipelineError::DeadlineExceeded { .. } => "DEADLINE_EXCEEDED",
            PipelineError::Conflict(_) => "CONFLICT",
        }
    }

    fn is_recoverable(&self) -> bool {
        self.kind() == ErrorKind::TransientIo
    }

    fn log_level(&self) -> LogLevel {
        match self.kind() {
            ErrorKind::Validation => LogLevel::Debug,
            ErrorKind::NotFound | ErrorKind::Conflict => LogLevel::Warn,
            ErrorKind::TransientIo => LogLevel::Error,
        }
    }
}

/// Log a hard stage failure at the level its metadata asks for.
pub fn log_stage_error(upload_id: &str, stage: Stage, error: &PipelineError) {
    let error_code = error.error_code();
    match error.log_level() {
        LogLevel::Debug => tracing::debug!(
            upload_id = %upload_id,
            stage = %stage,
            error = %error,
            error_code = error_code,
            "Stage rejected its input"
        ),
        LogLevel::Warn => tracing::warn!(
            upload_id = %upload_id,
            stage = %stage,
            error = %error,
            error_code = error_code,
            "Stage failed"
        ),
        LogLevel::Error => tracing::error!(
            upload_id = %upload_id,
            stage = %stage,
            error = %error,
            error_code = error_code,
            recoverable = error.is_recoverable(),
            "Stage failed"
        ),
    }
}

/// Record a failure that must not change the stage result.
pub fn soft_failure(stage: Stage, action: &str, error: &dyn std::fmt::Display) {
    tracing::warn!(
        stage = %stage,
        action = action,
        error = %error,
        "Soft failure; continuing"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_errors() {
        let err = PipelineError::from(ValidationError::Missing { field: "userId" });
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(!err.is_recoverable());
        assert_eq!(err.log_level(), LogLevel::Debug);

        let err = PipelineError::from(RepositoryError::not_found("track", "t1"));
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.error_code(), "NOT_FOUND");

        let err = PipelineError::from(StorageError::CopyFailed("boom".into()));
        assert_eq!(err.kind(), ErrorKind::TransientIo);
        assert!(err.is_recoverable());
        assert_eq!(err.log_level(), LogLevel::Error);

        let err = PipelineError::conflict("upload is not failed");
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(err.error_code(), "CONFLICT");
    }

    #[test]
    fn deadline_message_names_stage() {
        let err = PipelineError::DeadlineExceeded {
            stage: Stage::Move,
            limit: Duration::from_secs(55),
        };
        assert_eq!(err.to_string(), "move stage exceeded its 55s deadline");
        assert_eq!(err.error_code(), "DEADLINE_EXCEEDED");
        assert!(err.is_recoverable());
    }
}
