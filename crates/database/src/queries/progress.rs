//! Listening progress database operations

use crate::DbPool;
use taleplay_core::{AppError, BookId, ChapterId, ProgressRecord, Timestamp};

/// Upserts a progress record and mirrors it onto the book and chapter rows.
///
/// All three writes share one transaction.
pub async fn save_progress(pool: &DbPool, record: &ProgressRecord) -> Result<(), AppError> {
    let mut tx = pool
        .begin()
        .await
        .map_err(|e| AppError::database("Failed to begin progress save", e))?;

    sqlx::query(
        r#"
        INSERT INTO playback_progress (book_id, chapter_id, chapter_index, position_secs, updated_at, write_seq)
        VALUES (?, ?, ?, ?, ?,
            (SELECT COALESCE(MAX(write_seq), 0) + 1 FROM playback_progress WHERE book_id = ?))
        ON CONFLICT(book_id, chapter_id) DO UPDATE SET
            chapter_index = excluded.chapter_index,
            position_secs = excluded.position_secs,
            updated_at = excluded.updated_at,
            write_seq = excluded.write_seq
        "#,
    )
    .bind(record.book_id.as_string())
    .bind(record.chapter_id.as_string())
    .bind(record.chapter_index as i64)
    .bind(record.position_secs)
    .bind(record.updated_at.as_millis())
    .bind(record.book_id.as_string())
    .execute(&mut *tx)
    .await
    .map_err(|e| AppError::database("Failed to save progress", e))?;

    sqlx::query(
        "UPDATE books SET last_chapter_index = ?, last_position_secs = ?, updated_at = ? WHERE id = ?",
    )
    .bind(record.chapter_index as i64)
    .bind(record.position_secs)
    .bind(record.updated_at.as_millis())
    .bind(record.book_id.as_string())
    .execute(&mut *tx)
    .await
    .map_err(|e| AppError::database("Failed to update book position", e))?;

    sqlx::query("UPDATE chapters SET last_position_secs = ? WHERE id = ? AND book_id = ?")
        .bind(record.position_secs)
        .bind(record.chapter_id.as_string())
        .bind(record.book_id.as_string())
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::database("Failed to update chapter position", e))?;

    tx.commit()
        .await
        .map_err(|e| AppError::database("Failed to commit progress", e))?;

    Ok(())
}

/// Gets the saved progress for one chapter
pub async fn get_progress(
    pool: &DbPool,
    book_id: BookId,
    chapter_id: ChapterId,
) -> Result<Option<ProgressRecord>, AppError> {
    let row = sqlx::query(
        "SELECT book_id, chapter_id, chapter_index, position_secs, updated_at FROM playback_progress WHERE book_id = ? AND chapter_id = ?",
    )
    .bind(book_id.as_string())
    .bind(chapter_id.as_string())
    .fetch_optional(pool)
    .await
    .map_err(|e| AppError::database("Failed to fetch progress", e))?;

    row.map(row_to_progress).transpose()
}

/// Gets the most recently written progress record for a book
///
/// Ordered by write sequence, not timestamp, so saves made within the same
/// millisecond still resolve to the last one.
pub async fn latest_progress(pool: &DbPool, book_id: BookId) -> Result<Option<ProgressRecord>, AppError> {
    let row = sqlx::query(
        r#"
        SELECT book_id, chapter_id, chapter_index, position_secs, updated_at
        FROM playback_progress
        WHERE book_id = ?
        ORDER BY write_seq DESC
        LIMIT 1
        "#,
    )
    .bind(book_id.as_string())
    .fetch_optional(pool)
    .await
    .map_err(|e| AppError::database("Failed to fetch latest progress", e))?;

    row.map(row_to_progress).transpose()
}

fn row_to_progress(row: sqlx::sqlite::SqliteRow) -> Result<ProgressRecord, AppError> {
    use sqlx::Row;

    let book_id_str: String = row
        .try_get("book_id")
        .map_err(|e| AppError::database("Missing book ID", e))?;
    let chapter_id_str: String = row
        .try_get("chapter_id")
        .map_err(|e| AppError::database("Missing chapter ID", e))?;
    let chapter_index: i64 = row
        .try_get("chapter_index")
        .map_err(|e| AppError::database("Missing chapter index", e))?;
    let position_secs: f64 = row
        .try_get("position_secs")
        .map_err(|e| AppError::database("Missing position", e))?;
    let updated_at: i64 = row
        .try_get("updated_at")
        .map_err(|e| AppError::database("Missing updated_at", e))?;

    Ok(ProgressRecord {
        book_id: BookId::from_string(&book_id_str)
            .map_err(|e| AppError::database("Invalid book ID", e))?,
        chapter_id: ChapterId::from_string(&chapter_id_str)
            .map_err(|e| AppError::database("Invalid chapter ID", e))?,
        chapter_index: chapter_index.max(0) as u32,
        position_secs,
        updated_at: Timestamp::from_millis(updated_at),
    })
}
