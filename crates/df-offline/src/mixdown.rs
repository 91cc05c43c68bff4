//! Mixed audio export
//!
//! `export_mixed_audio` builds the timeline for a scope, renders it and
//! encodes one WAV carrying a `cue ` chunk (one entry per line clip) and a
//! `LIST/adtl` chunk with sequential labels.

use std::fs;
use std::path::{Path, PathBuf};

use df_core::{ExportScope, ProjectStore, SoundLibrary, StudioConfig};
use df_file::{CuePoint, WavLayout, encode_wav_with_cues};
use df_timeline::{ClipDurationResolver, LineFailure, TimelineBuild, TimelineBuilder};

use crate::{ExportError, ExportResult, OfflineMixRenderer, SkippedClip};

/// Everything an export reads from
#[derive(Clone, Copy)]
pub struct ExportInput<'a> {
    pub store: &'a dyn ProjectStore,
    pub library: &'a dyn SoundLibrary,
    pub resolver: &'a ClipDurationResolver,
    pub config: &'a StudioConfig,
}

impl<'a> ExportInput<'a> {
    /// Build the timeline for `scope`, refusing an empty one
    pub fn build_timeline(&self, scope: &ExportScope) -> ExportResult<TimelineBuild> {
        let build = TimelineBuilder::new(self.resolver).build_project(self.store, self.library, scope)?;
        if build.is_empty() {
            return Err(ExportError::EmptyTimeline);
        }
        Ok(build)
    }

    pub fn renderer(&self) -> OfflineMixRenderer<'a> {
        OfflineMixRenderer::new(
            self.resolver,
            self.config.audio.sample_rate,
            self.config.audio.channels as usize,
        )
        .with_cue_label_prefix(self.config.export.cue_label_prefix.clone())
    }
}

/// Encoded WAV plus what went into it
#[derive(Debug, Clone)]
pub struct MixedAudioExport {
    pub wav: Vec<u8>,
    pub cue_points: Vec<CuePoint>,
    pub total_duration: f64,
    /// Lines left off the timeline
    pub failures: Vec<LineFailure>,
    /// Clips that were on the timeline but could not be loaded
    pub skipped: Vec<SkippedClip>,
}

pub fn export_mixed_audio(
    input: &ExportInput<'_>,
    scope: &ExportScope,
) -> ExportResult<MixedAudioExport> {
    let build = input.build_timeline(scope)?;
    let mix = input.renderer().render(&build.clips, build.total_duration)?;

    let layout = WavLayout {
        sample_rate: mix.sample_rate,
        channels: mix.channels as u16,
        bit_depth: input.config.audio.bit_depth,
    };
    let wav = encode_wav_with_cues(&mix.samples, layout, &mix.cue_points)?;

    log::info!(
        "Mixed export: {:.2}s, {} clips, {} cues, {:.2} MB",
        build.total_duration,
        build.clips.len(),
        mix.cue_points.len(),
        wav.len() as f64 / 1024.0 / 1024.0
    );

    Ok(MixedAudioExport {
        wav,
        cue_points: mix.cue_points,
        total_duration: build.total_duration,
        failures: build.failures,
        skipped: mix.skipped,
    })
}

/// Export to `path`, atomically
///
/// The file is written next to the target with a `.part` suffix and renamed
/// once complete; on any error the partial file is removed.
pub fn export_mixed_audio_to_path(
    input: &ExportInput<'_>,
    scope: &ExportScope,
    path: &Path,
) -> ExportResult<MixedAudioExport> {
    let export = export_mixed_audio(input, scope)?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let part = PartFile::new(path);
    fs::write(part.path(), &export.wav)?;
    part.commit(path)?;

    Ok(export)
}

/// Temporary output removed on drop unless committed
pub(crate) struct PartFile {
    path: PathBuf,
    committed: bool,
}

impl PartFile {
    pub(crate) fn new(target: &Path) -> Self {
        let mut name = target.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".part");
        Self {
            path: target.with_file_name(name),
            committed: false,
        }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn commit(mut self, target: &Path) -> ExportResult<()> {
        fs::rename(&self.path, target)?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for PartFile {
    fn drop(&mut self) {
        if !self.committed && self.path.exists() {
            if let Err(e) = fs::remove_file(&self.path) {
                log::warn!("Could not remove partial export {:?}: {}", self.path, e);
            }
        }
    }
}

/// Temporary directory next to a target, removed on drop unless committed
pub(crate) struct PartDir {
    path: PathBuf,
    committed: bool,
}

impl PartDir {
    /// Fresh `<target>.part`, clearing one left by an interrupted run
    pub(crate) fn create(target: &Path) -> ExportResult<Self> {
        let mut name = target.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".part");
        let path = target.with_file_name(name);
        if path.exists() {
            fs::remove_dir_all(&path)?;
        }
        fs::create_dir_all(&path)?;
        Ok(Self {
            path,
            committed: false,
        })
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// Move the staged tree to `target`, which must be absent or empty
    pub(crate) fn commit(mut self, target: &Path) -> ExportResult<()> {
        if target.exists() {
            fs::remove_dir(target)?;
        }
        fs::rename(&self.path, target)?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for PartDir {
    fn drop(&mut self) {
        if !self.committed && self.path.exists() {
            if let Err(e) = fs::remove_dir_all(&self.path) {
                log::warn!("Could not remove partial export {:?}: {}", self.path, e);
            }
        }
    }
}
