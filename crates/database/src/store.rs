//! SQLite-backed library store

use crate::connection::{self, DatabaseConfig, DbPool};
use crate::{migrations, queries};
use async_trait::async_trait;
use taleplay_core::{
    AppError, Book, BookId, Chapter, PersistenceStore, PlaybackSpeed, ProgressRecord,
};

/// Library, progress and settings storage over one connection pool
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: DbPool,
}

impl SqliteStore {
    /// Opens (creating if needed) the database and applies migrations
    pub async fn open(config: DatabaseConfig) -> Result<Self, AppError> {
        let pool = connection::connect(config).await?;
        migrations::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    /// Opens a migrated private in-memory database
    pub async fn in_memory() -> Result<Self, AppError> {
        let pool = connection::connect_in_memory().await?;
        migrations::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Saves a book together with its chapter list
    pub async fn add_book(&self, book: &Book, chapters: &[Chapter]) -> Result<(), AppError> {
        queries::save_book(&self.pool, book).await?;
        queries::save_chapters(&self.pool, book.id, chapters).await?;
        log::info!("Saved book '{}' with {} chapters", book.title, chapters.len());
        Ok(())
    }

    pub async fn book(&self, id: BookId) -> Result<Book, AppError> {
        queries::get_book(&self.pool, id).await
    }

    pub async fn books(&self) -> Result<Vec<Book>, AppError> {
        queries::list_books(&self.pool).await
    }

    pub async fn remove_book(&self, id: BookId) -> Result<(), AppError> {
        queries::delete_book(&self.pool, id).await
    }

    pub async fn latest_progress(&self, id: BookId) -> Result<Option<ProgressRecord>, AppError> {
        queries::latest_progress(&self.pool, id).await
    }

    pub async fn playback_speed(&self) -> Result<PlaybackSpeed, AppError> {
        queries::get_playback_speed(&self.pool).await
    }

    /// The speed the listener last chose, if any
    pub async fn stored_playback_speed(&self) -> Result<Option<PlaybackSpeed>, AppError> {
        queries::get_stored_playback_speed(&self.pool).await
    }

    pub async fn set_playback_speed(&self, speed: PlaybackSpeed) -> Result<(), AppError> {
        queries::set_playback_speed(&self.pool, speed).await
    }

    pub async fn last_opened_book(&self) -> Result<Option<BookId>, AppError> {
        queries::get_last_opened_book(&self.pool).await
    }

    pub async fn set_last_opened_book(&self, id: BookId) -> Result<(), AppError> {
        queries::set_last_opened_book(&self.pool, id).await
    }

    pub async fn close(self) {
        connection::close(self.pool).await;
    }
}

#[async_trait]
impl PersistenceStore for SqliteStore {
    async fn get_chapters(&self, book_id: BookId) -> Result<Vec<Chapter>, AppError> {
        queries::get_book_chapters(&self.pool, book_id).await
    }

    async fn save_progress(&self, record: &ProgressRecord) -> Result<(), AppError> {
        queries::save_progress(&self.pool, record).await
    }
}
