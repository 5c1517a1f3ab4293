//! Application settings stored alongside the library

use crate::DbPool;
use taleplay_core::{AppError, BookId, PlaybackSpeed};

const PLAYBACK_SPEED_KEY: &str = "playback_speed";
const LAST_OPENED_BOOK_KEY: &str = "last_opened_book_id";

async fn get_setting(pool: &DbPool, key: &str) -> Result<Option<String>, AppError> {
    sqlx::query_scalar("SELECT value FROM app_settings WHERE key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to read setting {key}"), e))
}

async fn set_setting(pool: &DbPool, key: &str, value: &str) -> Result<(), AppError> {
    sqlx::query(
        "INSERT INTO app_settings (key, value) VALUES (?, ?) ON CONFLICT(key) DO UPDATE SET value = excluded.value",
    )
    .bind(key)
    .bind(value)
    .execute(pool)
    .await
    .map_err(|e| AppError::database(format!("Failed to write setting {key}"), e))?;

    Ok(())
}

/// Returns the stored speed, or none when unset or unreadable
pub async fn get_stored_playback_speed(pool: &DbPool) -> Result<Option<PlaybackSpeed>, AppError> {
    let stored = get_setting(pool, PLAYBACK_SPEED_KEY).await?;
    Ok(stored
        .and_then(|v| v.parse::<f32>().ok())
        .map(PlaybackSpeed::clamped))
}

/// Returns the stored speed, or normal speed when unset or unreadable
pub async fn get_playback_speed(pool: &DbPool) -> Result<PlaybackSpeed, AppError> {
    Ok(get_stored_playback_speed(pool).await?.unwrap_or_default())
}

pub async fn set_playback_speed(pool: &DbPool, speed: PlaybackSpeed) -> Result<(), AppError> {
    set_setting(pool, PLAYBACK_SPEED_KEY, &speed.value().to_string()).await
}

/// Returns the last opened book, ignoring malformed values
pub async fn get_last_opened_book(pool: &DbPool) -> Result<Option<BookId>, AppError> {
    let stored = get_setting(pool, LAST_OPENED_BOOK_KEY).await?;
    Ok(stored.and_then(|v| BookId::from_string(&v).ok()))
}

pub async fn set_last_opened_book(pool: &DbPool, book_id: BookId) -> Result<(), AppError> {
    set_setting(pool, LAST_OPENED_BOOK_KEY, &book_id.as_string()).await
}
