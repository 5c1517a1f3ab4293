//! Book and chapter domain models

use crate::types::{Timestamp, Validator};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Unique identifier for a book
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BookId(Uuid);

impl BookId {
    /// Creates a new random BookId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a BookId from a UUID string
    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }

    /// Returns the BookId as a string
    pub fn as_string(&self) -> String {
        self.0.to_string()
    }
}

impl Default for BookId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for BookId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a chapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChapterId(Uuid);

impl ChapterId {
    /// Creates a new random ChapterId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a ChapterId from a UUID string
    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }

    /// Returns the ChapterId as a string
    pub fn as_string(&self) -> String {
        self.0.to_string()
    }
}

impl Default for ChapterId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ChapterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An audiobook: a titled, ordered collection of chapter files
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Book {
    pub id: BookId,
    pub title: String,
    pub author: Option<String>,
    pub cover_path: Option<PathBuf>,
    /// Ordinal of the chapter last listened to
    pub last_chapter_index: u32,
    pub last_position_secs: f64,
    pub added_date: Timestamp,
    pub updated_at: Timestamp,
}

impl Book {
    /// Creates a new book with required fields
    pub fn new(title: impl Into<String>) -> Self {
        let now = Timestamp::now();
        Self {
            id: BookId::new(),
            title: title.into(),
            author: None,
            cover_path: None,
            last_chapter_index: 0,
            last_position_secs: 0.0,
            added_date: now,
            updated_at: now,
        }
    }

    /// Sets the author
    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }
}

impl Validator for Book {
    fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.title.trim().is_empty() {
            errors.push("Title cannot be empty".to_string());
        }

        if !self.last_position_secs.is_finite() || self.last_position_secs < 0.0 {
            errors.push("Last position must be a non-negative number".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// A chapter: one playable media file within a book
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    pub id: ChapterId,
    pub book_id: BookId,
    pub title: String,
    /// Sort key within the book; need not be contiguous
    pub ordinal: u32,
    pub duration_secs: f64,
    pub file_path: PathBuf,
    pub last_position_secs: f64,
}

impl Chapter {
    /// Creates a new chapter
    pub fn new(
        book_id: BookId,
        title: impl Into<String>,
        ordinal: u32,
        file_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            id: ChapterId::new(),
            book_id,
            title: title.into(),
            ordinal,
            duration_secs: 0.0,
            file_path: file_path.into(),
            last_position_secs: 0.0,
        }
    }

    /// Sets the known duration in seconds
    pub fn with_duration(mut self, duration_secs: f64) -> Self {
        self.duration_secs = duration_secs;
        self
    }
}

impl Validator for Chapter {
    fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.title.trim().is_empty() {
            errors.push("Chapter title cannot be empty".to_string());
        }

        if self.file_path.as_os_str().is_empty() {
            errors.push("Chapter file path cannot be empty".to_string());
        }

        if !self.duration_secs.is_finite() || self.duration_secs < 0.0 {
            errors.push("Duration must be a non-negative number".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
