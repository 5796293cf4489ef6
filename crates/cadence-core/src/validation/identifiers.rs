//! Identifier and storage-key validation.
//!
//! Every id that ends up inside an object key or a repository lookup goes
//! through here before the first side-effecting call.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::ValidationError;

pub const MAX_IDENTIFIER_LENGTH: usize = 128;

static IDENTIFIER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_-]*$").expect("identifier pattern compiles")
});

static BUCKET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9][a-z0-9.-]{1,61}[a-z0-9]$").expect("bucket pattern compiles")
});

/// Validate a user, upload or track identifier.
///
/// Accepts 1-128 characters from `[A-Za-z0-9_-]` starting with an
/// alphanumeric, which covers both minted UUIDs and external subject ids.
pub fn validate_identifier(value: &str, field: &'static str) -> Result<(), ValidationError> {
    if value.is_empty() {
        return Err(ValidationError::Missing { field });
    }
    if value.len() > MAX_IDENTIFIER_LENGTH {
        return Err(ValidationError::invalid(
            field,
            format!("exceeds {} characters", MAX_IDENTIFIER_LENGTH),
        ));
    }
    if !IDENTIFIER_RE.is_match(value) {
        return Err(ValidationError::invalid(
            field,
            format!("'{}' is not a well-formed identifier", value),
        ));
    }
    Ok(())
}

/// Validate an object key received from a stage payload.
pub fn validate_object_key(key: &str, field: &'static str) -> Result<(), ValidationError> {
    if key.trim().is_empty() {
        return Err(ValidationError::Missing { field });
    }
    if key.starts_with('/') {
        return Err(ValidationError::invalid(field, "must not start with '/'"));
    }
    if key.split('/').any(|segment| segment == "..") {
        return Err(ValidationError::invalid(field, "must not contain '..'"));
    }
    if key.chars().any(|c| c.is_control()) {
        return Err(ValidationError::invalid(field, "contains control characters"));
    }
    Ok(())
}

/// Validate an S3 bucket name (3-63 chars, lowercase alphanumerics, `.` and `-`).
pub fn validate_bucket_name(bucket: &str, field: &'static str) -> Result<(), ValidationError> {
    if bucket.is_empty() {
        return Err(ValidationError::Missing { field });
    }
    if !BUCKET_RE.is_match(bucket) || bucket.contains("..") {
        return Err(ValidationError::invalid(
            field,
            format!("'{}' is not a valid bucket name", bucket),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_uuids_and_subject_ids() {
        assert!(validate_identifier("u1", "userId").is_ok());
        assert!(validate_identifier("550e8400-e29b-41d4-a716-446655440000", "trackId").is_ok());
        assert!(validate_identifier("user_42-a", "userId").is_ok());
    }

    #[test]
    fn rejects_path_like_identifiers() {
        for bad in ["../etc", "a/b", "a.b", " u1", "-lead", "_lead", "u 1"] {
            assert!(
                matches!(
                    validate_identifier(bad, "userId"),
                    Err(ValidationError::Invalid { field: "userId", .. })
                ),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn empty_identifier_is_missing() {
        assert_eq!(
            validate_identifier("", "trackId"),
            Err(ValidationError::Missing { field: "trackId" })
        );
    }

    #[test]
    fn overlong_identifier_is_rejected() {
        let long = "a".repeat(MAX_IDENTIFIER_LENGTH + 1);
        assert!(validate_identifier(&long, "uploadId").is_err());
        let max = "a".repeat(MAX_IDENTIFIER_LENGTH);
        assert!(validate_identifier(&max, "uploadId").is_ok());
    }

    #[test]
    fn object_keys() {
        assert!(validate_object_key("uploads/u1/song.wav", "sourceKey").is_ok());
        assert!(validate_object_key("uploads/u1/my song (live).mp3", "sourceKey").is_ok());
        assert!(validate_object_key("", "sourceKey").is_err());
        assert!(validate_object_key("/uploads/a.mp3", "sourceKey").is_err());
        assert!(validate_object_key("uploads/../secret", "sourceKey").is_err());
        assert!(validate_object_key("uploads/a\nb", "sourceKey").is_err());
    }

    #[test]
    fn bucket_names() {
        assert!(validate_bucket_name("cadence-media", "bucketName").is_ok());
        assert!(validate_bucket_name("media.example.com", "bucketName").is_ok());
        assert!(validate_bucket_name("ab", "bucketName").is_err());
        assert!(validate_bucket_name("Upper", "bucketName").is_err());
        assert!(validate_bucket_name("a..b", "bucketName").is_err());
        assert!(validate_bucket_name("bucket/", "bucketName").is_err());
    }
}
