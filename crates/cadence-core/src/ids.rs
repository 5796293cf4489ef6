//! Identifier generator and clock collaborators.
//!
//! Stages never call `Uuid::new_v4()` or `Utc::now()` directly; they receive
//! these through their context so tests can pin both.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Mints new record identities.
pub trait IdGenerator: Send + Sync {
    fn generate(&self) -> String;
}

/// Production generator: random v4 UUIDs in hyphenated form.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidIdGenerator;

impl IdGenerator for UuidIdGenerator {
    fn generate(&self) -> String {
        Uuid::new_v4().to_string()
    }
}

/// Source of the current time for `created_at`/`updated_at` stamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::validate_identifier;

    #[test]
    fn generated_ids_are_valid_identifiers() {
        let id = UuidIdGenerator.generate();
        assert!(validate_identifier(&id, "trackId").is_ok());
        assert_ne!(id, UuidIdGenerator.generate());
    }
}
