//! Error type shared by the Taleplay crates

use std::fmt;
use thiserror::Error;

/// Main error type shared by the Taleplay crates
#[derive(Error, Debug)]
pub enum AppError {
    // ===== Database Errors =====
    /// Database operation failed
    #[error("Database error: {message}")]
    DatabaseError {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Database is corrupted and needs repair
    #[error("Database corrupted: {details}")]
    DatabaseCorrupted { details: String },

    /// Database migration failed
    #[error("Migration failed: {version} - {reason}")]
    MigrationFailed { version: String, reason: String },

    /// Record not found in database
    #[error("Record not found: {entity} with {identifier}")]
    RecordNotFound { entity: String, identifier: String },

    // ===== General Errors =====
    /// Invalid argument passed to an operation
    #[error("Invalid argument '{argument}': {reason}")]
    InvalidArgument { argument: String, reason: String },

    /// Unexpected internal failure
    #[error("Internal error: {message}")]
    InternalError { message: String },
}

impl AppError {
    /// Returns a message suitable for showing to the listener
    pub fn user_message(&self) -> String {
        match self {
            Self::DatabaseError { .. } => {
                "Could not access your library. Please try again.".to_string()
            }
            Self::DatabaseCorrupted { .. } => {
                "Your library database is damaged and needs to be repaired.".to_string()
            }
            Self::MigrationFailed { .. } => {
                "Your library could not be upgraded to this version.".to_string()
            }
            Self::RecordNotFound { entity, .. } => format!("The requested {} no longer exists.", entity),
            Self::InvalidArgument { argument, reason } => format!("{}: {}", argument, reason),
            Self::InternalError { .. } => "Something went wrong inside Taleplay.".to_string(),
        }
    }

    /// Creates a database error with source
    pub fn database<E: std::error::Error + Send + Sync + 'static>(
        message: impl Into<String>,
        source: E,
    ) -> Self {
        Self::DatabaseError {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a not-found error for a database entity
    pub fn not_found(entity: impl Into<String>, identifier: impl fmt::Display) -> Self {
        Self::RecordNotFound {
            entity: entity.into(),
            identifier: identifier.to_string(),
        }
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;
