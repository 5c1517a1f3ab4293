//! Shared domain types, errors and storage contracts for Taleplay

pub mod error;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use error::{AppError, Result};
pub use store::PersistenceStore;
pub use types::{
    format_clock, Book, BookId, Chapter, ChapterId, PlaybackIdentity, PlaybackSnapshot,
    PlaybackSpeed, ProgressRecord, SleepTimerMode, SleepTimerState, Timestamp, Validator,
};
