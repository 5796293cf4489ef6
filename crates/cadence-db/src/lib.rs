//! Cadence Database Library
//!
//! Durable storage of tracks, albums and uploads. Stages talk to the
//! [`LibraryRepository`] trait; [`PgLibraryRepository`] implements it on
//! PostgreSQL with sqlx.

pub mod db;
pub mod error;
pub mod setup;

pub use db::{LibraryRepository, PgLibraryRepository};
pub use error::{RepositoryError, RepositoryResult};
pub use setup::{connect, run_migrations, setup_database};
