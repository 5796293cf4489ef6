//! Validation modules

pub mod identifiers;

pub use identifiers::{
    validate_bucket_name, validate_identifier, validate_object_key, MAX_IDENTIFIER_LENGTH,
};
