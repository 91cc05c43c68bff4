//! Timeline error types

use df_core::{ChapterId, DfError, LineId, SoundId};
use thiserror::Error;

/// Why a single line or pinned sound was left off the timeline
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FailureReason {
    #[error("audio not found: {0}")]
    MissingAudio(String),

    #[error("could not decode audio: {0}")]
    Decode(String),

    #[error("audio has no samples")]
    EmptyAudio,

    #[error("sound '{0}' is not in the library")]
    UnknownSound(SoundId),
}

impl From<DfError> for FailureReason {
    fn from(err: DfError) -> Self {
        match err {
            DfError::AudioNotFound(audio) => FailureReason::MissingAudio(audio),
            other => FailureReason::Decode(other.to_string()),
        }
    }
}

/// A line (or one of its pinned sounds) excluded from the build
#[derive(Debug, Clone, PartialEq)]
pub struct LineFailure {
    pub chapter_id: ChapterId,
    pub line_id: LineId,
    /// Set when the failure concerns a pinned sound rather than the line audio
    pub sound_id: Option<SoundId>,
    pub reason: FailureReason,
}

/// Errors that abort a whole build
///
/// Per-line problems never end up here; they are collected as [`LineFailure`].
#[derive(Error, Debug)]
pub enum TimelineError {
    #[error("Project store error: {0}")]
    Store(#[from] DfError),
}

pub type TimelineResult<T> = Result<T, TimelineError>;
