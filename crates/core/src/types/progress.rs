//! Durable listening progress

use crate::types::{BookId, ChapterId, Timestamp};
use serde::{Deserialize, Serialize};

/// Saved position within one chapter of a book.
///
/// There is one logical record per `(book_id, chapter_id)`; the last write wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub book_id: BookId,
    pub chapter_id: ChapterId,
    /// Zero-based position of the chapter in the book's ordered chapter list
    pub chapter_index: u32,
    pub position_secs: f64,
    pub updated_at: Timestamp,
}

impl ProgressRecord {
    /// Creates a record stamped with the current time; negative positions become zero
    pub fn new(book_id: BookId, chapter_id: ChapterId, chapter_index: u32, position_secs: f64) -> Self {
        Self {
            book_id,
            chapter_id,
            chapter_index,
            position_secs: if position_secs.is_finite() {
                position_secs.max(0.0)
            } else {
                0.0
            },
            updated_at: Timestamp::now(),
        }
    }
}
