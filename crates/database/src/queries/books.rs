//! Book database operations

use crate::DbPool;
use std::path::PathBuf;
use taleplay_core::{AppError, Book, BookId, Timestamp};

const BOOK_COLUMNS: &str = "id, title, author, cover_path, last_chapter_index, last_position_secs, added_date, updated_at";

/// Inserts or replaces a book row
pub async fn save_book(pool: &DbPool, book: &Book) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO books (id, title, author, cover_path, last_chapter_index, last_position_secs, added_date, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            title = excluded.title,
            author = excluded.author,
            cover_path = excluded.cover_path,
            last_chapter_index = excluded.last_chapter_index,
            last_position_secs = excluded.last_position_secs,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(book.id.as_string())
    .bind(&book.title)
    .bind(&book.author)
    .bind(book.cover_path.as_ref().and_then(|p| p.to_str()))
    .bind(book.last_chapter_index as i64)
    .bind(book.last_position_secs)
    .bind(book.added_date.as_millis())
    .bind(book.updated_at.as_millis())
    .execute(pool)
    .await
    .map_err(|e| AppError::database("Failed to save book", e))?;

    Ok(())
}

/// Gets a book by ID
pub async fn get_book(pool: &DbPool, id: BookId) -> Result<Book, AppError> {
    let row = sqlx::query(&format!("SELECT {BOOK_COLUMNS} FROM books WHERE id = ?"))
        .bind(id.as_string())
        .fetch_optional(pool)
        .await
        .map_err(|e| AppError::database("Failed to fetch book", e))?
        .ok_or_else(|| AppError::not_found("Book", id))?;

    row_to_book(row)
}

/// Lists all books, most recently listened first
pub async fn list_books(pool: &DbPool) -> Result<Vec<Book>, AppError> {
    let rows = sqlx::query(&format!(
        "SELECT {BOOK_COLUMNS} FROM books ORDER BY updated_at DESC, title COLLATE NOCASE"
    ))
    .fetch_all(pool)
    .await
    .map_err(|e| AppError::database("Failed to list books", e))?;

    rows.into_iter().map(row_to_book).collect()
}

/// Deletes a book; chapters and progress cascade
pub async fn delete_book(pool: &DbPool, id: BookId) -> Result<(), AppError> {
    let result = sqlx::query("DELETE FROM books WHERE id = ?")
        .bind(id.as_string())
        .execute(pool)
        .await
        .map_err(|e| AppError::database("Failed to delete book", e))?;

    if result.rows_affected() == 0 {
        return Err(AppError::not_found("Book", id));
    }
    Ok(())
}

fn row_to_book(row: sqlx::sqlite::SqliteRow) -> Result<Book, AppError> {
    use sqlx::Row;

    let id_str: String = row
        .try_get("id")
        .map_err(|e| AppError::database("Missing book ID", e))?;
    let id = BookId::from_string(&id_str).map_err(|e| AppError::database("Invalid book ID", e))?;

    let title: String = row
        .try_get("title")
        .map_err(|e| AppError::database("Missing title", e))?;
    let author: Option<String> = row
        .try_get("author")
        .map_err(|e| AppError::database("Missing author", e))?;
    let cover_path: Option<String> = row
        .try_get("cover_path")
        .map_err(|e| AppError::database("Missing cover path", e))?;
    let last_chapter_index: i64 = row
        .try_get("last_chapter_index")
        .map_err(|e| AppError::database("Missing last chapter index", e))?;
    let last_position_secs: f64 = row
        .try_get("last_position_secs")
        .map_err(|e| AppError::database("Missing last position", e))?;
    let added_date: i64 = row
        .try_get("added_date")
        .map_err(|e| AppError::database("Missing added date", e))?;
    let updated_at: i64 = row
        .try_get("updated_at")
        .map_err(|e| AppError::database("Missing updated_at", e))?;

    Ok(Book {
        id,
        title,
        author,
        cover_path: cover_path.map(PathBuf::from),
        last_chapter_index: last_chapter_index.max(0) as u32,
        last_position_secs,
        added_date: Timestamp::from_millis(added_date),
        updated_at: Timestamp::from_millis(updated_at),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::connect_in_memory;
    use crate::migrations::run_migrations;

    async fn setup() -> DbPool {
        let pool = connect_in_memory().await.unwrap();
        run_migrations(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn test_save_and_get_book() {
        let pool = setup().await;
        let book = Book::new("Dune").with_author("Frank Herbert");

        save_book(&pool, &book).await.unwrap();

        let retrieved = get_book(&pool, book.id).await.unwrap();
        assert_eq!(retrieved.title, "Dune");
        assert_eq!(retrieved.author.as_deref(), Some("Frank Herbert"));
        assert_eq!(retrieved.last_chapter_index, 0);
    }

    #[tokio::test]
    async fn test_save_book_updates_existing_row() {
        let pool = setup().await;
        let mut book = Book::new("Draft Title");
        save_book(&pool, &book).await.unwrap();

        book.title = "Final Title".to_string();
        save_book(&pool, &book).await.unwrap();

        let books = list_books(&pool).await.unwrap();
        assert_eq!(books.len(), 1);
        assert_eq!(books[0].title, "Final Title");
    }

    #[tokio::test]
    async fn test_get_missing_book() {
        let pool = setup().await;
        let result = get_book(&pool, BookId::new()).await;
        assert!(matches!(result, Err(AppError::RecordNotFound { .. })));
    }

    #[tokio::test]
    async fn test_list_books_most_recent_first() {
        let pool = setup().await;
        let mut old = Book::new("Old");
        old.updated_at = Timestamp::from_millis(1_000);
        let mut new = Book::new("New");
        new.updated_at = Timestamp::from_millis(2_000);

        save_book(&pool, &old).await.unwrap();
        save_book(&pool, &new).await.unwrap();

        let titles: Vec<_> = list_books(&pool)
            .await
            .unwrap()
            .into_iter()
            .map(|b| b.title)
            .collect();
        assert_eq!(titles, vec!["New", "Old"]);
    }

    #[tokio::test]
    async fn test_delete_book() {
        let pool = setup().await;
        let book = Book::new("Gone");
        save_book(&pool, &book).await.unwrap();

        delete_book(&pool, book.id).await.unwrap();

        assert!(get_book(&pool, book.id).await.is_err());
        assert!(matches!(
            delete_book(&pool, book.id).await,
            Err(AppError::RecordNotFound { .. })
        ));
    }
}
