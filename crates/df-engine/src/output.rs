//! Audio output seam
//!
//! The scheduler starts and stops *sources*: one clip's PCM starting at an
//! instant of the output clock, optionally from an offset into the audio.

use std::sync::Arc;

use df_core::ClipId;
use df_file::AudioData;

use crate::{AudioClock, OutputSlot, PlaybackResult};

/// Identifies a started source
///
/// `generation` is the scheduler epoch the source was started in; it is
/// reported back with completions so stale ones can be told apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceHandle {
    pub id: u64,
    pub generation: u64,
}

#[derive(Debug, Clone)]
pub struct SourceRequest {
    pub clip_id: ClipId,
    pub audio: Arc<AudioData>,
    /// Output clock instant to start at (seconds)
    pub when: f64,
    /// Position inside the audio to start from (seconds)
    pub offset: f64,
    /// How much to play from `offset` (seconds)
    pub duration: f64,
    pub generation: u64,
}

pub trait AudioOutput: Send {
    /// Clock the `when` of requests refers to
    fn clock(&self) -> Arc<dyn AudioClock>;

    /// Ownership slot of the underlying device
    fn slot(&self) -> Arc<OutputSlot>;

    fn start_source(&mut self, request: SourceRequest) -> PlaybackResult<SourceHandle>;

    /// Stop a source now. A stopped source is never reported as finished.
    fn stop_source(&mut self, handle: SourceHandle);

    /// Sources that played to their end since the last call
    fn drain_finished(&mut self) -> Vec<SourceHandle>;
}
