//! Chapter database operations

use crate::DbPool;
use std::path::PathBuf;
use taleplay_core::{AppError, BookId, Chapter, ChapterId};

/// Replaces a book's chapter list in one transaction
pub async fn save_chapters(pool: &DbPool, book_id: BookId, chapters: &[Chapter]) -> Result<(), AppError> {
    let mut tx = pool
        .begin()
        .await
        .map_err(|e| AppError::database("Failed to begin chapter update", e))?;

    sqlx::query("DELETE FROM chapters WHERE book_id = ?")
        .bind(book_id.as_string())
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::database("Failed to clear chapters", e))?;

    for chapter in chapters {
        if chapter.book_id != book_id {
            return Err(AppError::InvalidArgument {
                argument: "chapters".to_string(),
                reason: format!("chapter {} belongs to another book", chapter.id),
            });
        }

        sqlx::query(
            r#"
            INSERT INTO chapters (id, book_id, title, ordinal, duration_secs, file_path, last_position_secs)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(chapter.id.as_string())
        .bind(book_id.as_string())
        .bind(&chapter.title)
        .bind(chapter.ordinal as i64)
        .bind(chapter.duration_secs)
        .bind(chapter.file_path.to_string_lossy().into_owned())
        .bind(chapter.last_position_secs)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::database("Failed to insert chapter", e))?;
    }

    tx.commit()
        .await
        .map_err(|e| AppError::database("Failed to commit chapters", e))?;

    Ok(())
}

/// Gets a chapter by ID
pub async fn get_chapter(pool: &DbPool, id: ChapterId) -> Result<Chapter, AppError> {
    let row = sqlx::query(
        "SELECT id, book_id, title, ordinal, duration_secs, file_path, last_position_secs FROM chapters WHERE id = ?",
    )
    .bind(id.as_string())
    .fetch_optional(pool)
    .await
    .map_err(|e| AppError::database("Failed to fetch chapter", e))?
    .ok_or_else(|| AppError::not_found("Chapter", id))?;

    row_to_chapter(row)
}

/// Gets all chapters for a book, ordered by ordinal
pub async fn get_book_chapters(pool: &DbPool, book_id: BookId) -> Result<Vec<Chapter>, AppError> {
    let rows = sqlx::query(
        "SELECT id, book_id, title, ordinal, duration_secs, file_path, last_position_secs FROM chapters WHERE book_id = ? ORDER BY ordinal, rowid",
    )
    .bind(book_id.as_string())
    .fetch_all(pool)
    .await
    .map_err(|e| AppError::database("Failed to get book chapters", e))?;

    rows.into_iter().map(row_to_chapter).collect()
}

pub(crate) fn row_to_chapter(row: sqlx::sqlite::SqliteRow) -> Result<Chapter, AppError> {
    use sqlx::Row;

    let id_str: String = row
        .try_get("id")
        .map_err(|e| AppError::database("Missing chapter ID", e))?;
    let id =
        ChapterId::from_string(&id_str).map_err(|e| AppError::database("Invalid chapter ID", e))?;

    let book_id_str: String = row
        .try_get("book_id")
        .map_err(|e| AppError::database("Missing book ID", e))?;
    let book_id =
        BookId::from_string(&book_id_str).map_err(|e| AppError::database("Invalid book ID", e))?;

    let title: String = row
        .try_get("title")
        .map_err(|e| AppError::database("Missing title", e))?;
    let ordinal: i64 = row
        .try_get("ordinal")
        .map_err(|e| AppError::database("Missing ordinal", e))?;
    let duration_secs: f64 = row
        .try_get("duration_secs")
        .map_err(|e| AppError::database("Missing duration", e))?;
    let file_path: String = row
        .try_get("file_path")
        .map_err(|e| AppError::database("Missing file path", e))?;
    let last_position_secs: f64 = row
        .try_get("last_position_secs")
        .map_err(|e| AppError::database("Missing last position", e))?;

    Ok(Chapter {
        id,
        book_id,
        title,
        ordinal: ordinal.max(0) as u32,
        duration_secs,
        file_path: PathBuf::from(file_path),
        last_position_secs,
    })
}
