//! Playback error types

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlaybackError {
    #[error("Audio output '{0}' is already in use")]
    OutputBusy(String),

    #[error("Audio output unavailable: {0}")]
    OutputUnavailable(String),

    #[error("Invalid playback configuration: {0}")]
    InvalidConfig(String),

    #[error("Driver error: {0}")]
    Driver(String),
}

pub type PlaybackResult<T> = Result<T, PlaybackError>;
