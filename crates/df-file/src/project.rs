//! Project directory
//!
//! On-disk layout:
//!
//! ```text
//! <root>/
//!   project.dfproj   JSON manifest (script, characters, silence, library, sources)
//!   audio/           audio blobs, referenced by path relative to this folder
//! ```
//!
//! The manifest is replaced atomically (write to a temp file, then rename),
//! so a crash never leaves a half-written project behind.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use df_core::{
    AudioBlobStore, AudioRef, Chapter, Character, DfResult, LineId, ProjectStore,
    SilenceSettings, SoundLibrary, SoundLibraryItem,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::{FileError, FileResult};

// ═══════════════════════════════════════════════════════════════════════════════
// PATH VALIDATION (SECURITY)
// ═══════════════════════════════════════════════════════════════════════════════

/// Maximum length for audio references (prevents DoS via huge strings)
const MAX_PATH_LENGTH: usize = 4096;

/// Maximum manifest size
const MAX_PROJECT_SIZE: usize = 50 * 1024 * 1024;

/// Validate that an audio reference stays inside the project's audio folder
///
/// Rejects null bytes, absolute paths, `..` components and oversized strings.
fn validate_audio_ref(audio: &str) -> FileResult<&str> {
    if audio.is_empty() {
        return Err(FileError::ProjectError("Empty audio reference".to_string()));
    }

    if audio.contains('\0') {
        return Err(FileError::ProjectError(
            "Invalid path: contains null bytes".to_string(),
        ));
    }

    if audio.len() > MAX_PATH_LENGTH {
        return Err(FileError::ProjectError(format!(
            "Path exceeds maximum length of {} bytes",
            MAX_PATH_LENGTH
        )));
    }

    let path = Path::new(audio);
    if path.is_absolute() {
        return Err(FileError::ProjectError(
            "Absolute paths not allowed for audio - use paths relative to the audio folder"
                .to_string(),
        ));
    }

    for component in path.components() {
        match component {
            std::path::Component::Normal(s) => {
                if s.to_str().is_some_and(|s| s.starts_with("..")) {
                    return Err(FileError::ProjectError("Path traversal detected".to_string()));
                }
            }
            std::path::Component::CurDir => {}
            _ => {
                return Err(FileError::ProjectError(format!(
                    "Path traversal detected in audio reference '{}'",
                    audio
                )));
            }
        }
    }

    Ok(audio)
}

fn validate_project(project: &ProjectFile) -> FileResult<()> {
    let line_refs = project
        .chapters
        .iter()
        .flat_map(|c| c.lines.iter())
        .filter_map(|l| l.audio.as_ref());
    let sound_refs = project.sounds.iter().map(|s| &s.audio);
    let source_refs = project.sources.iter().map(|s| &s.audio);

    for audio in line_refs.chain(sound_refs).chain(source_refs) {
        validate_audio_ref(audio.as_str())?;
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════════
// PROJECT FILE FORMAT
// ═══════════════════════════════════════════════════════════════════════════════

/// Project file version
pub const PROJECT_VERSION: u32 = 1;

/// Project file header
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectHeader {
    /// Format version
    pub version: u32,
    /// Application name
    pub app_name: String,
    /// Application version
    pub app_version: String,
    /// Last modification (unix seconds)
    pub modified_at: u64,
}

impl Default for ProjectHeader {
    fn default() -> Self {
        Self {
            version: PROJECT_VERSION,
            app_name: "DramaForge".to_string(),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            modified_at: 0,
        }
    }
}

/// A script line cut from a master recording
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappedLineEntry {
    pub line_id: LineId,
    /// Line has no take in this recording and is left without audio
    #[serde(default)]
    pub skip: bool,
}

/// A long-form recording split into per-line segments at marker positions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasterSourceEntry {
    pub id: String,
    pub audio: AudioRef,
    /// Split points in seconds, ascending
    #[serde(default)]
    pub markers: Vec<f64>,
    /// Lines mapped to this recording, in recording order
    #[serde(default)]
    pub lines: Vec<MappedLineEntry>,
}

/// Complete project manifest
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectFile {
    #[serde(default)]
    pub header: ProjectHeader,
    pub name: String,
    #[serde(default)]
    pub chapters: Vec<Chapter>,
    #[serde(default)]
    pub characters: Vec<Character>,
    #[serde(default)]
    pub silence: SilenceSettings,
    #[serde(default)]
    pub sounds: Vec<SoundLibraryItem>,
    #[serde(default)]
    pub sources: Vec<MasterSourceEntry>,
}

impl ProjectFile {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn source(&self, id: &str) -> Option<&MasterSourceEntry> {
        self.sources.iter().find(|s| s.id == id)
    }

    pub fn source_mut(&mut self, id: &str) -> Option<&mut MasterSourceEntry> {
        self.sources.iter_mut().find(|s| s.id == id)
    }

    /// Parse and validate a manifest
    pub fn from_json(content: &str) -> FileResult<Self> {
        if content.len() > MAX_PROJECT_SIZE {
            return Err(FileError::ProjectError(format!(
                "Project file exceeds maximum size of {} MB",
                MAX_PROJECT_SIZE / (1024 * 1024)
            )));
        }

        let project: ProjectFile = serde_json::from_str(content)?;

        if project.header.version > PROJECT_VERSION {
            return Err(FileError::ProjectError(format!(
                "Project version {} is newer than supported version {}",
                project.header.version, PROJECT_VERSION
            )));
        }

        validate_project(&project)?;
        Ok(project)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PROJECT DIRECTORY
// ═══════════════════════════════════════════════════════════════════════════════

/// A project stored as a manifest plus an audio folder
pub struct ProjectDirectory {
    root: PathBuf,
    manifest: RwLock<ProjectFile>,
}

impl ProjectDirectory {
    pub const MANIFEST_NAME: &'static str = "project.dfproj";
    pub const AUDIO_DIR: &'static str = "audio";

    /// Create a new, empty project directory
    pub fn create<P: AsRef<Path>>(root: P, name: &str) -> FileResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join(Self::AUDIO_DIR))?;

        let dir = Self {
            root,
            manifest: RwLock::new(ProjectFile::new(name)),
        };
        dir.update(|_| Ok(()))?;
        Ok(dir)
    }

    /// Open an existing project directory
    pub fn open<P: AsRef<Path>>(root: P) -> FileResult<Self> {
        let root = root.as_ref().to_path_buf();
        let manifest_path = root.join(Self::MANIFEST_NAME);
        let content = fs::read_to_string(&manifest_path)
            .map_err(|_| FileError::NotFound(manifest_path.display().to_string()))?;
        let manifest = ProjectFile::from_json(&content)?;

        log::info!(
            "Opened project '{}' ({} chapters, {} sources)",
            manifest.name,
            manifest.chapters.len(),
            manifest.sources.len()
        );

        Ok(Self {
            root,
            manifest: RwLock::new(manifest),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Snapshot of the manifest
    pub fn manifest(&self) -> ProjectFile {
        self.manifest.read().clone()
    }

    /// Absolute path of an audio reference (validated)
    pub fn audio_path(&self, audio: &AudioRef) -> FileResult<PathBuf> {
        let rel = validate_audio_ref(audio.as_str())?;
        Ok(self.root.join(Self::AUDIO_DIR).join(rel))
    }

    /// Store a blob in the audio folder and return its reference
    pub fn write_audio(&self, name: &str, bytes: &[u8]) -> FileResult<AudioRef> {
        let audio = AudioRef::new(name);
        let path = self.audio_path(&audio)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        write_atomically(&path, bytes)?;
        Ok(audio)
    }

    /// Delete a blob from the audio folder (missing files are ignored)
    pub fn remove_audio(&self, audio: &AudioRef) -> FileResult<()> {
        let path = self.audio_path(audio)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Apply a change to the manifest and persist it
    ///
    /// The closure works on a copy; nothing becomes visible, in memory or on
    /// disk, unless it returns `Ok` and the manifest is written successfully.
    pub fn update<T, F>(&self, change: F) -> FileResult<T>
    where
        F: FnOnce(&mut ProjectFile) -> FileResult<T>,
    {
        let mut manifest = self.manifest.write();
        let mut draft = manifest.clone();
        let result = change(&mut draft)?;

        validate_project(&draft)?;
        draft.header.modified_at = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        let json = serde_json::to_string_pretty(&draft)?;
        write_atomically(&self.root.join(Self::MANIFEST_NAME), json.as_bytes())?;

        *manifest = draft;
        Ok(result)
    }
}

fn write_atomically(path: &Path, bytes: &[u8]) -> FileResult<()> {
    let tmp = path.with_extension("tmp");
    if let Err(e) = fs::write(&tmp, bytes).and_then(|_| fs::rename(&tmp, path)) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}

impl ProjectStore for ProjectDirectory {
    fn chapters(&self) -> DfResult<Vec<Chapter>> {
        Ok(self.manifest.read().chapters.clone())
    }

    fn characters(&self) -> DfResult<Vec<Character>> {
        Ok(self.manifest.read().characters.clone())
    }

    fn silence_settings(&self) -> DfResult<SilenceSettings> {
        Ok(self.manifest.read().silence.clone())
    }
}

impl AudioBlobStore for ProjectDirectory {
    fn audio_blob(&self, audio: &AudioRef) -> DfResult<Arc<Vec<u8>>> {
        let path = self.audio_path(audio)?;
        let bytes = fs::read(&path).map_err(|_| FileError::NotFound(path.display().to_string()))?;
        Ok(Arc::new(bytes))
    }
}

impl SoundLibrary for ProjectDirectory {
    fn sound(&self, id: &str) -> Option<SoundLibraryItem> {
        self.manifest.read().sounds.iter().find(|s| s.id == id).cloned()
    }
}
