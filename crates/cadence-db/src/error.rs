//! Repository error taxonomy

use cadence_core::{ErrorMetadata, LogLevel};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("{entity} {id} already exists")]
    AlreadyExists { entity: &'static str, id: String },

    #[error("{entity} {id} was modified concurrently (expected version {expected})")]
    VersionConflict {
        entity: &'static str,
        id: String,
        expected: i64,
    },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

impl RepositoryError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        RepositoryError::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, RepositoryError::NotFound { .. })
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}

impl From<cadence_core::ValidationError> for RepositoryError {
    // Raised when a stored enum column holds a value this build does not know
    fn from(err: cadence_core::ValidationError) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}

impl ErrorMetadata for RepositoryError {
    fn error_code(&self) -> &'static str {
        match self {
            RepositoryError::NotFound { .. } => "NOT_FOUND",
            RepositoryError::AlreadyExists { .. } => "ALREADY_EXISTS",
            RepositoryError::VersionConflict { .. } => "VERSION_CONFLICT",
            RepositoryError::Database(_) => "DATABASE_ERROR",
            RepositoryError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    fn is_recoverable(&self) -> bool {
        matches!(
            self,
            RepositoryError::VersionConflict { .. } | RepositoryError::Database(_)
        )
    }

    fn log_level(&self) -> LogLevel {
        match self {
            RepositoryError::NotFound { .. } => LogLevel::Debug,
            RepositoryError::AlreadyExists { .. } | RepositoryError::VersionConflict { .. } => {
                LogLevel::Warn
            }
            RepositoryError::Database(_) | RepositoryError::Serialization(_) => LogLevel::Error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        let err = RepositoryError::not_found("track", "t1");
        assert_eq!(err.to_string(), "track t1 not found");
        assert!(err.is_not_found());
        assert!(!err.is_recoverable());

        let err = RepositoryError::VersionConflict {
            entity: "track",
            id: "t1".into(),
            expected: 3,
        };
        assert_eq!(err.error_code(), "VERSION_CONFLICT");
        assert!(err.is_recoverable());
        assert_eq!(err.log_level(), LogLevel::Warn);

        let err = RepositoryError::from(sqlx::Error::PoolTimedOut);
        assert_eq!(err.error_code(), "DATABASE_ERROR");
        assert!(err.is_recoverable());
    }
}
