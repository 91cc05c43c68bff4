//! Error types for export

use df_core::DfError;
use df_file::FileError;
use df_timeline::TimelineError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Nothing to export: the timeline has no clips")]
    EmptyTimeline,

    #[error("Timeline of {0:.1}s is too long for a WAV file")]
    TooLong(f64),

    #[error("Audio for clip '{clip_id}' unavailable: {reason}")]
    ClipAudio { clip_id: String, reason: String },

    #[error("Output directory {0:?} is not empty")]
    TargetNotEmpty(std::path::PathBuf),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("File error: {0}")]
    File(#[from] FileError),

    #[error("Timeline error: {0}")]
    Timeline(#[from] TimelineError),

    #[error("Project store error: {0}")]
    Store(#[from] DfError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ExportResult<T> = Result<T, ExportError>;
