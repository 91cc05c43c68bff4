//! Realignment errors

use df_core::DfError;
use df_file::FileError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RealignError {
    #[error("Master source not found: {0}")]
    SourceNotFound(String),

    #[error("Invalid markers: {0}")]
    InvalidMarkers(String),

    #[error("Invalid window: {0}")]
    InvalidWindow(String),

    #[error("Segment count mismatch: {expected} lines mapped, markers give {actual} segments")]
    SegmentCountMismatch { expected: usize, actual: usize },

    #[error("Line not found: {0}")]
    LineNotFound(String),

    #[error("File error: {0}")]
    File(#[from] FileError),

    #[error("Store error: {0}")]
    Store(#[from] DfError),
}

pub type RealignResult<T> = Result<T, RealignError>;
