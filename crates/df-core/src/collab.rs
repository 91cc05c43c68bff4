//! Collaborator interfaces
//!
//! The script store, the audio blob store and the sound library are owned by
//! the surrounding application. The timeline, the scheduler and the exporters
//! only see them through these traits.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{AudioRef, Chapter, Character, DfError, DfResult, SilenceSettings, SoundId};

/// Read access to the project's script data
pub trait ProjectStore {
    /// Chapters in project order, lines in chapter order
    fn chapters(&self) -> DfResult<Vec<Chapter>>;

    fn characters(&self) -> DfResult<Vec<Character>>;

    fn silence_settings(&self) -> DfResult<SilenceSettings>;
}

/// Read access to encoded audio blobs
pub trait AudioBlobStore: Send + Sync {
    fn audio_blob(&self, audio: &AudioRef) -> DfResult<Arc<Vec<u8>>>;
}

/// A sound effect or music bed in the project's sound library
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoundLibraryItem {
    pub id: SoundId,
    pub name: String,
    #[serde(default)]
    pub category: String,
    /// Known duration in seconds, if the library already measured it
    #[serde(default)]
    pub duration_hint: Option<f64>,
    pub audio: AudioRef,
}

pub trait SoundLibrary: Send + Sync {
    fn sound(&self, id: &str) -> Option<SoundLibraryItem>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// IN-MEMORY STORE
// ═══════════════════════════════════════════════════════════════════════════════

/// Project held entirely in memory
///
/// Used by tests and by callers that already have everything loaded.
#[derive(Debug, Clone, Default)]
pub struct MemoryProject {
    pub chapters: Vec<Chapter>,
    pub characters: Vec<Character>,
    pub silence: SilenceSettings,
    pub blobs: HashMap<AudioRef, Arc<Vec<u8>>>,
    pub sounds: HashMap<SoundId, SoundLibraryItem>,
}

impl MemoryProject {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_blob(&mut self, audio: impl Into<String>, bytes: Vec<u8>) -> AudioRef {
        let audio = AudioRef::new(audio);
        self.blobs.insert(audio.clone(), Arc::new(bytes));
        audio
    }

    pub fn add_sound(&mut self, item: SoundLibraryItem) {
        self.sounds.insert(item.id.clone(), item);
    }
}

impl ProjectStore for MemoryProject {
    fn chapters(&self) -> DfResult<Vec<Chapter>> {
        Ok(self.chapters.clone())
    }

    fn characters(&self) -> DfResult<Vec<Character>> {
        Ok(self.characters.clone())
    }

    fn silence_settings(&self) -> DfResult<SilenceSettings> {
        Ok(self.silence.clone())
    }
}

impl AudioBlobStore for MemoryProject {
    fn audio_blob(&self, audio: &AudioRef) -> DfResult<Arc<Vec<u8>>> {
        self.blobs
            .get(audio)
            .cloned()
            .ok_or_else(|| DfError::AudioNotFound(audio.to_string()))
    }
}

impl SoundLibrary for MemoryProject {
    fn sound(&self, id: &str) -> Option<SoundLibraryItem> {
        self.sounds.get(id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_project_blob_lookup() {
        let mut project = MemoryProject::new();
        let audio = project.add_blob("a1", vec![1, 2, 3]);

        assert_eq!(project.audio_blob(&audio).unwrap().as_slice(), &[1, 2, 3]);
        assert!(matches!(
            project.audio_blob(&AudioRef::new("missing")),
            Err(DfError::AudioNotFound(_))
        ));
    }
}
