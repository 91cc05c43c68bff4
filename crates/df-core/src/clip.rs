//! Timeline clips
//!
//! The output of timeline assembly: every span of audio with an absolute
//! start time. Playback and offline rendering both consume this list, so it
//! is the single source of truth for placement.

use serde::{Deserialize, Serialize};

use crate::{AudioRef, ChapterId, CharacterId, LineId, LineType, SoundId};

pub type ClipId = String;

/// Logical track a clip lives on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClipTrack {
    /// Sequential script lines (narration, dialogue, sfx lines)
    Line,
    /// Pinned sound effects
    Sfx,
    /// Pinned background music
    Bgm,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineClip {
    /// Stable id derived from the source line or pinned sound
    pub id: ClipId,
    pub track: ClipTrack,
    /// Absolute start on the timeline (seconds)
    pub start_time: f64,
    /// Length (seconds, > 0)
    pub duration: f64,
    pub audio: AudioRef,
    pub chapter_id: ChapterId,
    pub line_id: LineId,
    #[serde(default)]
    pub character_id: Option<CharacterId>,
    /// Type of the owning line (line track only)
    #[serde(default)]
    pub line_type: Option<LineType>,
    #[serde(default)]
    pub sound_type: Option<String>,
    /// Library sound (sfx/bgm tracks only)
    #[serde(default)]
    pub sound_id: Option<SoundId>,
    /// Library category (sfx/bgm tracks only)
    #[serde(default)]
    pub category: Option<String>,
    /// Display label: line text or pinned keyword
    #[serde(default)]
    pub label: String,
}

impl TimelineClip {
    #[inline]
    pub fn end_time(&self) -> f64 {
        self.start_time + self.duration
    }

    #[inline]
    pub fn is_line(&self) -> bool {
        self.track == ClipTrack::Line
    }

    /// Whether `[start, start + duration)` intersects `[from, to)`
    #[inline]
    pub fn intersects(&self, from: f64, to: f64) -> bool {
        self.start_time < to && self.end_time() > from
    }
}
