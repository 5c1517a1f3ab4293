//! Storage contract consumed by the playback core

use crate::error::Result;
use crate::types::{BookId, Chapter, ProgressRecord};
use async_trait::async_trait;

/// Durable storage for chapter lists and progress records.
///
/// Implementations must be safe to call from several tasks at once.
#[async_trait]
pub trait PersistenceStore: Send + Sync {
    /// Returns the book's chapters ordered by ordinal
    async fn get_chapters(&self, book_id: BookId) -> Result<Vec<Chapter>>;

    /// Upserts the record keyed by `(book_id, chapter_id)`
    async fn save_progress(&self, record: &ProgressRecord) -> Result<()>;
}
