//! Taleplay Database Layer
//!
//! SQLite storage for books, chapters, listening progress and settings,
//! built on sqlx. [`SqliteStore`] is the entry point and implements the
//! core's [`taleplay_core::PersistenceStore`] contract.

pub mod connection;
pub mod migrations;
pub mod queries;
pub mod store;

pub use connection::{DatabaseConfig, DbPool};
pub use migrations::{current_version, run_migrations, verify_integrity};
pub use store::SqliteStore;
