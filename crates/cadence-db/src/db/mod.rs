//! Repository contract and its PostgreSQL implementation

pub mod postgres;
pub mod repository;

pub use postgres::PgLibraryRepository;
pub use repository::LibraryRepository;
