//! Timeline layout
//!
//! Walks chapters in project order and lines in chapter order, placing every
//! line that has usable audio one after another:
//!
//! ```text
//! | start pad | line 1 | gap(1→2) | line 2 | gap(2→3) | line 3 | end pad |
//!                 ▲ pinned sfx at index/len of line 1
//! ```
//!
//! Gaps are computed between *included* lines only. Lines without audio, or
//! whose audio fails to resolve, drop out before gaps are chosen.

use df_core::{
    AudioRef, Chapter, Character, CharacterIndex, ClipTrack, ExportScope, LineType, PinnedSound,
    ProjectStore, ScriptLine, SilenceSettings, SoundLibrary, SoundLibraryItem, TimelineClip,
};
use rayon::prelude::*;

use crate::{
    ClipDurationResolver, FailureReason, LineFailure, TimelineResult, end_padding, gap_seconds,
    start_padding,
};

// ═══════════════════════════════════════════════════════════════════════════════
// BUILD RESULT
// ═══════════════════════════════════════════════════════════════════════════════

/// Output of one layout pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimelineBuild {
    /// Each line clip followed by its pinned clips, lines in script order
    pub clips: Vec<TimelineClip>,
    /// End of the timeline including the trailing padding (seconds)
    pub total_duration: f64,
    /// Lines and pinned sounds left out, in script order
    pub failures: Vec<LineFailure>,
}

impl TimelineBuild {
    /// Clips on the sequential line track
    pub fn line_clips(&self) -> impl Iterator<Item = &TimelineClip> {
        self.clips.iter().filter(|c| c.is_line())
    }

    pub fn clips_on(&self, track: ClipTrack) -> impl Iterator<Item = &TimelineClip> {
        self.clips.iter().filter(move |c| c.track == track)
    }

    pub fn clip(&self, id: &str) -> Option<&TimelineClip> {
        self.clips.iter().find(|c| c.id == id)
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }
}

/// Id of the `n`th pinned sound on a line
pub fn pinned_clip_id(line_id: &str, n: usize) -> String {
    format!("{line_id}:pin{n}")
}

/// Fraction of the line duration at which a pinned sound starts
///
/// Character offset over text length. This is an approximation of where the
/// keyword is spoken, not a measured alignment.
pub fn pinned_position(pin: &PinnedSound, line: &ScriptLine) -> f64 {
    (pin.index as f64 / line.text_len().max(1) as f64).clamp(0.0, 1.0)
}

// ═══════════════════════════════════════════════════════════════════════════════
// BUILDER
// ═══════════════════════════════════════════════════════════════════════════════

/// A line with an audio reference, before resolution
struct Candidate<'a> {
    chapter: &'a Chapter,
    line: &'a ScriptLine,
    audio: &'a AudioRef,
    line_type: LineType,
    character: Option<&'a Character>,
}

/// A candidate after resolution
struct Resolved<'a> {
    candidate: Candidate<'a>,
    duration: Result<f64, FailureReason>,
    pins: Vec<Result<(SoundLibraryItem, f64), FailureReason>>,
}

pub struct TimelineBuilder<'a> {
    resolver: &'a ClipDurationResolver,
}

impl<'a> TimelineBuilder<'a> {
    pub fn new(resolver: &'a ClipDurationResolver) -> Self {
        Self { resolver }
    }

    /// Build from a project store, restricted to `scope`
    pub fn build_project(
        &self,
        store: &dyn ProjectStore,
        library: &dyn SoundLibrary,
        scope: &ExportScope,
    ) -> TimelineResult<TimelineBuild> {
        let chapters = scope.apply(store.chapters()?);
        let characters = store.characters()?;
        let settings = store.silence_settings()?;
        Ok(self.build(&chapters, &characters, &settings, library))
    }

    /// Lay out `chapters` on one timeline
    ///
    /// Never fails as a whole: unusable lines are reported in
    /// [`TimelineBuild::failures`]. Output is deterministic for unchanged input.
    pub fn build(
        &self,
        chapters: &[Chapter],
        characters: &[Character],
        settings: &SilenceSettings,
        library: &dyn SoundLibrary,
    ) -> TimelineBuild {
        let index = CharacterIndex::new(characters.iter().cloned());

        let candidates: Vec<Candidate<'_>> = chapters
            .iter()
            .flat_map(|chapter| chapter.lines.iter().map(move |line| (chapter, line)))
            .filter_map(|(chapter, line)| {
                let Some(audio) = line.audio.as_ref() else {
                    log::debug!("Line '{}' has no audio, skipped", line.id);
                    return None;
                };
                let character = index.for_line(line);
                Some(Candidate {
                    chapter,
                    line,
                    audio,
                    line_type: LineType::of(character),
                    character,
                })
            })
            .collect();

        // Collect keeps input order, so the result does not depend on scheduling
        let resolved: Vec<Resolved<'_>> = candidates
            .into_par_iter()
            .map(|candidate| self.resolve(candidate, library))
            .collect();

        let mut failures = Vec::new();
        let mut included = Vec::with_capacity(resolved.len());
        for item in resolved {
            match item.duration {
                Ok(duration) => included.push((item.candidate, duration, item.pins)),
                Err(reason) => {
                    log::warn!(
                        "Line '{}' excluded from timeline: {}",
                        item.candidate.line.id,
                        reason
                    );
                    failures.push(LineFailure {
                        chapter_id: item.candidate.chapter.id.clone(),
                        line_id: item.candidate.line.id.clone(),
                        sound_id: None,
                        reason,
                    });
                }
            }
        }

        let mut clips = Vec::new();
        let mut cursor = start_padding(settings);

        for (i, (candidate, duration, pins)) in included.iter().enumerate() {
            let line = candidate.line;
            let clip = TimelineClip {
                id: line.id.clone(),
                track: ClipTrack::Line,
                start_time: cursor,
                duration: *duration,
                audio: candidate.audio.clone(),
                chapter_id: candidate.chapter.id.clone(),
                line_id: line.id.clone(),
                character_id: candidate.character.map(|c| c.id.clone()),
                line_type: Some(candidate.line_type),
                sound_type: line.sound_type.clone(),
                sound_id: None,
                category: None,
                label: line.text.clone(),
            };

            let mut pinned = Vec::new();
            for (n, (pin, resolved)) in line.pinned_sounds.iter().zip(pins).enumerate() {
                match resolved {
                    Ok((item, sound_duration)) => {
                        pinned.push(pinned_clip(&clip, line, n, pin, item, *sound_duration));
                    }
                    Err(reason) => {
                        log::warn!(
                            "Pinned sound '{}' on line '{}' skipped: {}",
                            pin.sound_id,
                            line.id,
                            reason
                        );
                        failures.push(LineFailure {
                            chapter_id: candidate.chapter.id.clone(),
                            line_id: line.id.clone(),
                            sound_id: Some(pin.sound_id.clone()),
                            reason: reason.clone(),
                        });
                    }
                }
            }
            clips.push(clip);
            clips.extend(pinned);

            cursor += duration;

            let gap = match line.post_silence {
                Some(explicit) => explicit_gap(line, explicit),
                None => match included.get(i + 1) {
                    Some((next, _, _)) => gap_seconds(candidate.line_type, next.line_type, settings),
                    None => end_padding(settings),
                },
            };
            cursor += gap.max(0.0);
        }

        log::debug!(
            "Timeline built: {} clips, {:.3}s, {} failures",
            clips.len(),
            cursor,
            failures.len()
        );

        TimelineBuild {
            clips,
            total_duration: cursor,
            failures,
        }
    }

    fn resolve<'c>(&self, candidate: Candidate<'c>, library: &dyn SoundLibrary) -> Resolved<'c> {
        let duration = self.resolver.resolve_duration(candidate.audio);

        // Pinned sounds only matter when the line itself made it
        let pins = match duration {
            Ok(_) => candidate
                .line
                .pinned_sounds
                .iter()
                .map(|pin| -> Result<(SoundLibraryItem, f64), FailureReason> {
                    let item = library
                        .sound(&pin.sound_id)
                        .ok_or_else(|| FailureReason::UnknownSound(pin.sound_id.clone()))?;
                    let duration = self.resolver.resolve_sound_duration(&item)?;
                    Ok((item, duration))
                })
                .collect(),
            Err(_) => Vec::new(),
        };

        Resolved {
            candidate,
            duration,
            pins,
        }
    }
}

fn explicit_gap(line: &ScriptLine, seconds: f64) -> f64 {
    if seconds.is_finite() && seconds >= 0.0 {
        seconds
    } else {
        log::warn!(
            "Line '{}' has invalid post-silence {}, using 0",
            line.id,
            seconds
        );
        0.0
    }
}

fn pinned_clip(
    owner: &TimelineClip,
    line: &ScriptLine,
    n: usize,
    pin: &PinnedSound,
    item: &SoundLibraryItem,
    duration: f64,
) -> TimelineClip {
    TimelineClip {
        id: pinned_clip_id(&line.id, n),
        track: if pin.is_bgm() {
            ClipTrack::Bgm
        } else {
            ClipTrack::Sfx
        },
        start_time: owner.start_time + pinned_position(pin, line) * owner.duration,
        duration,
        audio: item.audio.clone(),
        chapter_id: owner.chapter_id.clone(),
        line_id: line.id.clone(),
        character_id: None,
        line_type: None,
        sound_type: None,
        sound_id: Some(item.id.clone()),
        category: Some(item.category.clone()),
        label: pin.keyword.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pinned_position_clamps() {
        let line = ScriptLine::new("l", "abcd");
        assert_eq!(pinned_position(&PinnedSound::new("x", 2, "s"), &line), 0.5);
        assert_eq!(pinned_position(&PinnedSound::new("x", 40, "s"), &line), 1.0);

        let empty = ScriptLine::new("l", "");
        assert_eq!(pinned_position(&PinnedSound::new("x", 0, "s"), &empty), 0.0);
    }

    #[test]
    fn test_pinned_position_counts_characters() {
        let line = ScriptLine::new("l", "旁白说话");
        assert_eq!(pinned_position(&PinnedSound::new("x", 1, "s"), &line), 0.25);
    }

    #[test]
    fn test_pinned_clip_id_is_stable() {
        assert_eq!(pinned_clip_id("line-7", 2), "line-7:pin2");
    }
}
