use std::path::PathBuf;
use taleplay_core::AppError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    /// The chapter's media file does not exist
    #[error("Media not found: {}", path.display())]
    NotFound { path: PathBuf },

    /// A caller passed an argument outside its accepted range
    #[error("Invalid {argument}: {reason}")]
    Validation { argument: String, reason: String },

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Output error: {0}")]
    Output(String),

    #[error("Seek error: {0}")]
    Seek(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Persistence error: {0}")]
    Persistence(#[from] AppError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    pub(crate) fn validation(argument: &str, reason: impl Into<String>) -> Self {
        Self::Validation {
            argument: argument.to_string(),
            reason: reason.into(),
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
