//! Error types module
//!
//! Shared error vocabulary for the pipeline crates. Each crate keeps its own
//! `thiserror` enum; the [`ErrorMetadata`] trait lets the orchestrator and the
//! entry points classify any of them the same way (retryable or not, which log
//! level, which machine-readable code).

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug level - for expected errors like validation failures
    Debug,
    /// Warning level - for recoverable issues like lost conditional writes
    Warn,
    /// Error level - for unexpected failures
    Error,
}

/// Metadata describing how an error should be reported and handled.
pub trait ErrorMetadata {
    /// Machine-readable error code (e.g., "VALIDATION_ERROR")
    fn error_code(&self) -> &'static str;

    /// Whether a later re-invocation may succeed without changing the input
    fn is_recoverable(&self) -> bool;

    /// Log level for this error
    fn log_level(&self) -> LogLevel;
}

/// Malformed or missing input, detected before any side-effecting call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field} is required")]
    Missing { field: &'static str },

    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ValidationError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ValidationError::Invalid {
            field,
            reason: reason.into(),
        }
    }

    /// Name of the offending input field
    pub fn field(&self) -> &'static str {
        match self {
            ValidationError::Missing { field } | ValidationError::Invalid { field, .. } => field,
        }
    }
}

impl ErrorMetadata for ValidationError {
    fn error_code(&self) -> &'static str {
        "VALIDATION_ERROR"
    }

    fn is_recoverable(&self) -> bool {
        false
    }

    fn log_level(&self) -> LogLevel {
        LogLevel::Debug
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_metadata() {
        let err = ValidationError::invalid("userId", "contains '/'");
        assert_eq!(err.error_code(), "VALIDATION_ERROR");
        assert!(!err.is_recoverable());
        assert_eq!(err.log_level(), LogLevel::Debug);
        assert_eq!(err.field(), "userId");
        assert_eq!(err.to_string(), "invalid userId: contains '/'");
    }

    #[test]
    fn missing_field_message() {
        let err = ValidationError::Missing { field: "trackId" };
        assert_eq!(err.to_string(), "trackId is required");
    }
}
