//! Segment stores
//!
//! The realignment engine reads a master source and its mapped lines, then
//! hands the whole reassignment to [`SegmentStore::commit`]. A commit either
//! lands completely (new segment audio, line references, markers) or leaves
//! the store untouched.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use df_core::{AudioBlobStore, AudioRef, Chapter, LineId, MemoryProject};
use df_file::{FileError, MasterSourceEntry, ProjectDirectory};
use parking_lot::RwLock;

use crate::{RealignError, RealignResult};

/// Folder (inside the audio store) that holds cut segments
pub const SEGMENT_DIR: &str = "segments";

/// WAV bytes for one cut segment
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedSegment {
    pub bytes: Vec<u8>,
    /// Segment length (seconds)
    pub duration: f64,
}

/// New audio for one line; `None` clears it
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentAssignment {
    pub line_id: LineId,
    pub segment: Option<EncodedSegment>,
}

/// Everything one resegmentation changes
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentCommit {
    pub source_id: String,
    /// Complete marker set persisted for the source
    pub markers: Vec<f64>,
    pub assignments: Vec<SegmentAssignment>,
}

/// Line audio after a commit, in assignment order
pub type CommittedAudio = Vec<(LineId, Option<AudioRef>)>;

pub trait SegmentStore: Send + Sync {
    fn source(&self, source_id: &str) -> RealignResult<MasterSourceEntry>;

    fn master_audio(&self, audio: &AudioRef) -> RealignResult<Arc<Vec<u8>>>;

    /// Apply the commit atomically
    fn commit(&self, commit: SegmentCommit) -> RealignResult<CommittedAudio>;
}

/// Reference name for a new segment
pub fn segment_name(source_id: &str, line_id: &str, stamp: u128) -> String {
    format!("{}/{}/{}-{}.wav", SEGMENT_DIR, slug(source_id), slug(line_id), stamp)
}

fn slug(id: &str) -> String {
    let slug: String = id
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if slug.is_empty() { "_".into() } else { slug }
}

fn commit_stamp() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0)
}

/// Point a line at new audio; returns the audio it had before
fn reassign_line(
    chapters: &mut [Chapter],
    line_id: &str,
    audio: Option<AudioRef>,
) -> RealignResult<Option<AudioRef>> {
    let line = chapters
        .iter_mut()
        .flat_map(|c| c.lines.iter_mut())
        .find(|l| l.id == line_id)
        .ok_or_else(|| RealignError::LineNotFound(line_id.to_string()))?;
    Ok(std::mem::replace(&mut line.audio, audio))
}

fn has_line(chapters: &[Chapter], line_id: &str) -> bool {
    chapters.iter().flat_map(|c| c.lines.iter()).any(|l| l.id == line_id)
}

// ═══════════════════════════════════════════════════════════════════════════════
// IN-MEMORY STORE
// ═══════════════════════════════════════════════════════════════════════════════

/// Project plus master sources, as held by [`MemorySegmentStore`]
#[derive(Debug, Clone, Default)]
pub struct MemorySegments {
    pub project: MemoryProject,
    pub sources: Vec<MasterSourceEntry>,
}

impl MemorySegments {
    fn source_mut(&mut self, id: &str) -> RealignResult<&mut MasterSourceEntry> {
        self.sources
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| RealignError::SourceNotFound(id.to_string()))
    }
}

#[derive(Debug, Default)]
pub struct MemorySegmentStore {
    state: RwLock<MemorySegments>,
}

impl MemorySegmentStore {
    pub fn new(project: MemoryProject, sources: Vec<MasterSourceEntry>) -> Self {
        Self {
            state: RwLock::new(MemorySegments { project, sources }),
        }
    }

    pub fn snapshot(&self) -> MemorySegments {
        self.state.read().clone()
    }
}

impl SegmentStore for MemorySegmentStore {
    fn source(&self, source_id: &str) -> RealignResult<MasterSourceEntry> {
        self.state
            .read()
            .sources
            .iter()
            .find(|s| s.id == source_id)
            .cloned()
            .ok_or_else(|| RealignError::SourceNotFound(source_id.to_string()))
    }

    fn master_audio(&self, audio: &AudioRef) -> RealignResult<Arc<Vec<u8>>> {
        Ok(self.state.read().project.audio_blob(audio)?)
    }

    fn commit(&self, commit: SegmentCommit) -> RealignResult<CommittedAudio> {
        let mut state = self.state.write();
        let mut draft = state.clone();
        let stamp = commit_stamp();

        let mut committed = Vec::with_capacity(commit.assignments.len());
        for assignment in commit.assignments {
            let audio = assignment.segment.map(|segment| {
                let name = segment_name(&commit.source_id, &assignment.line_id, stamp);
                draft.project.add_blob(name, segment.bytes)
            });
            reassign_line(&mut draft.project.chapters, &assignment.line_id, audio.clone())?;
            committed.push((assignment.line_id, audio));
        }
        draft.source_mut(&commit.source_id)?.markers = commit.markers;

        *state = draft;
        Ok(committed)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PROJECT DIRECTORY
// ═══════════════════════════════════════════════════════════════════════════════

impl SegmentStore for ProjectDirectory {
    fn source(&self, source_id: &str) -> RealignResult<MasterSourceEntry> {
        self.manifest()
            .source(source_id)
            .cloned()
            .ok_or_else(|| RealignError::SourceNotFound(source_id.to_string()))
    }

    fn master_audio(&self, audio: &AudioRef) -> RealignResult<Arc<Vec<u8>>> {
        Ok(self.audio_blob(audio)?)
    }

    /// Segment files are written first under fresh names, then the manifest
    /// is swapped in one update. On failure the new files are removed again;
    /// after success the segments they replaced are deleted.
    fn commit(&self, commit: SegmentCommit) -> RealignResult<CommittedAudio> {
        let manifest = self.manifest();
        if manifest.source(&commit.source_id).is_none() {
            return Err(RealignError::SourceNotFound(commit.source_id));
        }
        if let Some(missing) = commit
            .assignments
            .iter()
            .find(|a| !has_line(&manifest.chapters, &a.line_id))
        {
            return Err(RealignError::LineNotFound(missing.line_id.clone()));
        }

        let stamp = commit_stamp();
        let mut written: Vec<AudioRef> = Vec::new();
        let mut committed: CommittedAudio = Vec::with_capacity(commit.assignments.len());

        let result = (|| -> RealignResult<Vec<AudioRef>> {
            for assignment in &commit.assignments {
                let audio = match &assignment.segment {
                    Some(segment) => {
                        let name = segment_name(&commit.source_id, &assignment.line_id, stamp);
                        let audio = self.write_audio(&name, &segment.bytes)?;
                        written.push(audio.clone());
                        Some(audio)
                    }
                    None => None,
                };
                committed.push((assignment.line_id.clone(), audio));
            }

            let replaced = self.update(|draft| {
                let mut replaced = Vec::new();
                for (line_id, audio) in &committed {
                    let previous = reassign_line(&mut draft.chapters, line_id, audio.clone())
                        .map_err(|e| FileError::ProjectError(e.to_string()))?;
                    replaced.extend(previous);
                }
                let source = draft.source_mut(&commit.source_id).ok_or_else(|| {
                    FileError::ProjectError(format!("source '{}' disappeared", commit.source_id))
                })?;
                source.markers = commit.markers.clone();
                Ok(replaced)
            })?;
            Ok(replaced)
        })();

        match result {
            Ok(replaced) => {
                for audio in replaced {
                    if audio.as_str().starts_with(SEGMENT_DIR) && !written.contains(&audio) {
                        if let Err(e) = self.remove_audio(&audio) {
                            log::warn!("Could not remove replaced segment {}: {}", audio, e);
                        }
                    }
                }
                Ok(committed)
            }
            Err(e) => {
                for audio in &written {
                    if let Err(cleanup) = self.remove_audio(audio) {
                        log::warn!("Could not remove uncommitted segment {}: {}", audio, cleanup);
                    }
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use df_core::ScriptLine;

    fn segment(bytes: &[u8]) -> Option<EncodedSegment> {
        Some(EncodedSegment {
            bytes: bytes.to_vec(),
            duration: 1.0,
        })
    }

    fn memory_store() -> MemorySegmentStore {
        let mut project = MemoryProject::new();
        project.chapters = vec![Chapter::new("c", "C").with_lines(vec![
            ScriptLine::new("a", "A").with_audio("old-a.wav"),
            ScriptLine::new("b", "B"),
        ])];
        let master = project.add_blob("master.wav", vec![0; 4]);
        let source = MasterSourceEntry {
            id: "m".into(),
            audio: master,
            markers: vec![1.0],
            lines: Vec::new(),
        };
        MemorySegmentStore::new(project, vec![source])
    }

    #[test]
    fn test_segment_names_are_safe() {
        assert_eq!(segment_name("m 1", "../x", 7), "segments/m_1/___x-7.wav");
    }

    #[test]
    fn test_memory_commit_applies_everything() {
        let store = memory_store();
        let committed = store
            .commit(SegmentCommit {
                source_id: "m".into(),
                markers: vec![2.0],
                assignments: vec![
                    SegmentAssignment { line_id: "a".into(), segment: None },
                    SegmentAssignment { line_id: "b".into(), segment: segment(b"bb") },
                ],
            })
            .unwrap();

        let state = store.snapshot();
        let lines = &state.project.chapters[0].lines;
        assert_eq!(lines[0].audio, None);
        let b_audio = lines[1].audio.clone().unwrap();
        assert_eq!(committed[1], ("b".to_string(), Some(b_audio.clone())));
        assert_eq!(state.project.audio_blob(&b_audio).unwrap().as_slice(), b"bb");
        assert_eq!(state.sources[0].markers, vec![2.0]);
    }

    #[test]
    fn test_memory_commit_is_all_or_nothing() {
        let store = memory_store();
        let before = store.snapshot();

        let result = store.commit(SegmentCommit {
            source_id: "m".into(),
            markers: vec![2.0],
            assignments: vec![
                SegmentAssignment { line_id: "a".into(), segment: segment(b"aa") },
                SegmentAssignment { line_id: "ghost".into(), segment: segment(b"gg") },
            ],
        });

        assert!(matches!(result, Err(RealignError::LineNotFound(_))));
        let after = store.snapshot();
        assert_eq!(after.project.chapters, before.project.chapters);
        assert_eq!(after.project.blobs.len(), before.project.blobs.len());
        assert_eq!(after.sources, before.sources);
    }
}
