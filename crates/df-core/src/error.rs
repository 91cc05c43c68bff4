//! Error types for DramaForge

use thiserror::Error;

/// Core error type
#[derive(Error, Debug)]
pub enum DfError {
    #[error("Audio not found: {0}")]
    AudioNotFound(String),

    #[error("Chapter not found: {0}")]
    ChapterNotFound(String),

    #[error("Line not found: {0}")]
    LineNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid parameter: {0}")]
    InvalidParam(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Store error: {0}")]
    Store(String),
}

impl From<serde_json::Error> for DfError {
    fn from(err: serde_json::Error) -> Self {
        DfError::Serialization(err.to_string())
    }
}

/// Result type alias
pub type DfResult<T> = Result<T, DfError>;
