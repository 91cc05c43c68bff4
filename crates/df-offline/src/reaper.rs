//! Reaper project export
//!
//! Groups clips onto named tracks and writes a `.rpp` project plus the media
//! it references:
//!
//! | Track              | Clips                                   |
//! |--------------------|-----------------------------------------|
//! | Narration          | narration lines                         |
//! | Dialogue [...]     | dialogue lines, by sound type and scene |
//! | SFX Lines          | lines spoken by the sfx character       |
//! | SFX - <category>   | pinned sound effects                    |
//! | BGM - <category>   | pinned background music                 |
//!
//! Each line track references one concatenated WAV; items point into it with
//! `SOFFS`. Library sounds are written once and shared by every item using
//! them. BGM beds can repeat until the next BGM clip (or the end).

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use df_core::{BitDepth, ChapterId, ClipTrack, ExportScope, LineType, SamplePosition, TimelineClip};
use df_file::{AudioData, encode_wav};
use df_timeline::TimelineBuild;

use crate::mixdown::PartDir;
use crate::{ExportError, ExportInput, ExportResult, OfflineMixRenderer};

// ═══════════════════════════════════════════════════════════════════════════════
// TRACK GROUPING
// ═══════════════════════════════════════════════════════════════════════════════

/// Which output track a clip lands on (ordering = track order)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TrackGroup {
    Narration,
    Dialogue {
        sound_type: Option<String>,
        scene: Option<String>,
    },
    SfxLines,
    Sfx(String),
    Bgm(String),
}

impl TrackGroup {
    /// `scene_of` maps a chapter to its scene name when dialogue is split by scene
    pub fn of(clip: &TimelineClip, scene_of: &dyn Fn(&ChapterId) -> Option<String>) -> Self {
        match clip.track {
            ClipTrack::Sfx => Self::Sfx(clip.category.clone().unwrap_or_default()),
            ClipTrack::Bgm => Self::Bgm(clip.category.clone().unwrap_or_default()),
            ClipTrack::Line => match clip.line_type.unwrap_or(LineType::Narration) {
                LineType::Narration => Self::Narration,
                LineType::Sfx => Self::SfxLines,
                LineType::Dialogue => Self::Dialogue {
                    sound_type: clip.sound_type.clone().filter(|t| !t.trim().is_empty()),
                    scene: scene_of(&clip.chapter_id),
                },
            },
        }
    }

    pub fn is_line_track(&self) -> bool {
        matches!(self, Self::Narration | Self::Dialogue { .. } | Self::SfxLines)
    }

    pub fn name(&self) -> String {
        let with_category = |kind: &str, category: &str| {
            if category.trim().is_empty() {
                kind.to_string()
            } else {
                format!("{kind} - {category}")
            }
        };
        match self {
            Self::Narration => "Narration".into(),
            Self::Dialogue { sound_type, scene } => {
                let mut name = "Dialogue".to_string();
                if let Some(scene) = scene {
                    name.push_str(" - ");
                    name.push_str(scene);
                }
                if let Some(sound_type) = sound_type {
                    name.push_str(&format!(" ({sound_type})"));
                }
                name
            }
            Self::SfxLines => "SFX Lines".into(),
            Self::Sfx(category) => with_category("SFX", category),
            Self::Bgm(category) => with_category("BGM", category),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// LAYOUT
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
pub struct ProjectItem {
    pub position: f64,
    pub length: f64,
    /// Offset into the source file (seconds)
    pub source_offset: f64,
    pub name: String,
    /// Media path relative to the project file
    pub file: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProjectTrack {
    pub name: String,
    pub items: Vec<ProjectItem>,
}

/// A file inside an export bundle
#[derive(Debug, Clone, PartialEq)]
pub struct BundleFile {
    /// Path relative to the bundle root
    pub path: String,
    pub bytes: Vec<u8>,
}

/// Project file plus the media it references
#[derive(Debug, Clone)]
pub struct ExportBundle {
    pub project_file: BundleFile,
    pub media: Vec<BundleFile>,
    pub tracks: Vec<ProjectTrack>,
}

impl ExportBundle {
    pub fn files(&self) -> impl Iterator<Item = &BundleFile> {
        std::iter::once(&self.project_file).chain(self.media.iter())
    }

    /// Write the bundle as directory `dir`; returns the written paths
    ///
    /// Files are staged in a sibling `.part` directory that replaces `dir` in
    /// one rename, so a failed write leaves nothing behind. `dir` must be
    /// absent or empty.
    pub fn write_to_dir(&self, dir: &Path) -> ExportResult<Vec<PathBuf>> {
        if dir.exists() && fs::read_dir(dir)?.next().is_some() {
            return Err(ExportError::TargetNotEmpty(dir.to_path_buf()));
        }
        if let Some(parent) = dir.parent() {
            fs::create_dir_all(parent)?;
        }

        let staging = PartDir::create(dir)?;
        for file in self.files() {
            let staged = staging.path().join(&file.path);
            if let Some(parent) = staged.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&staged, &file.bytes)?;
        }
        staging.commit(dir)?;

        let written: Vec<PathBuf> = self.files().map(|file| dir.join(&file.path)).collect();
        log::info!("Wrote project bundle ({} files) to {:?}", written.len(), dir);
        Ok(written)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// EXPORT
// ═══════════════════════════════════════════════════════════════════════════════

/// Build the multi-track project for `scope`
pub fn export_project(
    input: &ExportInput<'_>,
    scope: &ExportScope,
    name: &str,
) -> ExportResult<ExportBundle> {
    let build = input.build_timeline(scope)?;

    let split_by_scene = input.config.export.split_dialogue_by_scene;
    let scenes: HashMap<ChapterId, String> = if split_by_scene {
        input
            .store
            .chapters()?
            .into_iter()
            .map(|c| {
                let title = if c.title.trim().is_empty() {
                    c.id.clone()
                } else {
                    c.title.clone()
                };
                (c.id, title)
            })
            .collect()
    } else {
        HashMap::new()
    };
    let scene_of = |id: &ChapterId| -> Option<String> {
        if split_by_scene {
            Some(scenes.get(id).cloned().unwrap_or_else(|| id.clone()))
        } else {
            None
        }
    };

    let exporter = ReaperExporter {
        renderer: input.renderer(),
        sample_rate: input.config.audio.sample_rate,
        loop_bgm: input.config.export.loop_bgm_until_next,
        bit_depth: input.config.audio.bit_depth,
    };
    exporter.export(&build, name, &scene_of)
}

struct ReaperExporter<'a> {
    renderer: OfflineMixRenderer<'a>,
    sample_rate: u32,
    loop_bgm: bool,
    bit_depth: BitDepth,
}

impl ReaperExporter<'_> {
    fn export(
        &self,
        build: &TimelineBuild,
        name: &str,
        scene_of: &dyn Fn(&ChapterId) -> Option<String>,
    ) -> ExportResult<ExportBundle> {
        let mut groups: BTreeMap<TrackGroup, Vec<&TimelineClip>> = BTreeMap::new();
        for clip in build.clips.iter().filter(|c| c.duration > 0.0) {
            groups.entry(TrackGroup::of(clip, scene_of)).or_default().push(clip);
        }

        // BGM repeats until the next BGM clip on any BGM track
        let mut bgm_starts: Vec<f64> = build
            .clips_on(ClipTrack::Bgm)
            .map(|c| c.start_time)
            .collect();
        bgm_starts.sort_by(f64::total_cmp);

        let mut media = Vec::new();
        let mut sound_files: HashMap<String, (String, f64)> = HashMap::new();
        let mut tracks = Vec::new();

        for (index, (group, clips)) in groups.iter().enumerate() {
            let track_name = group.name();
            let items = if group.is_line_track() {
                let file = format!("media/{:02}_{}.wav", index + 1, slug(&track_name));
                self.line_track(clips, file, &mut media)?
            } else {
                let mut items = Vec::new();
                for clip in clips {
                    let key = clip.sound_id.clone().unwrap_or_else(|| clip.audio.to_string());
                    let (file, sound_length) = match sound_files.get(&key) {
                        Some(entry) => entry.clone(),
                        None => {
                            let Some(pcm) = self.sound_audio(clip) else {
                                continue;
                            };
                            let file = format!("media/sounds/{:02}_{}.wav", sound_files.len() + 1, slug(&key));
                            let length = pcm.duration();
                            media.push(BundleFile {
                                path: file.clone(),
                                bytes: encode_wav(&pcm, self.bit_depth)?,
                            });
                            sound_files.insert(key, (file.clone(), length));
                            (file, length)
                        }
                    };

                    let span_end = if matches!(group, TrackGroup::Bgm(_)) && self.loop_bgm {
                        Some(next_start_after(&bgm_starts, clip.start_time).unwrap_or(build.total_duration))
                    } else {
                        None
                    };
                    items.extend(sound_items(clip, &file, sound_length, span_end, build.total_duration));
                }
                items
            };

            tracks.push(ProjectTrack {
                name: track_name,
                items,
            });
        }

        let project = render_rpp(&tracks, self.sample_rate, build.total_duration);
        let project_file = BundleFile {
            path: format!("{}.rpp", slug(name)),
            bytes: project.into_bytes(),
        };

        log::info!(
            "Project export '{}': {} tracks, {} media files",
            name,
            tracks.len(),
            media.len()
        );

        Ok(ExportBundle {
            project_file,
            media,
            tracks,
        })
    }

    /// Concatenate the track's clips into one file, one item per clip
    fn line_track(
        &self,
        clips: &[&TimelineClip],
        file: String,
        media: &mut Vec<BundleFile>,
    ) -> ExportResult<Vec<ProjectItem>> {
        let channels = self.renderer.channels();
        let mut joined: Vec<Vec<f32>> = vec![Vec::new(); channels];
        let mut items = Vec::new();

        for clip in clips {
            let pcm = match self.renderer.clip_audio(clip) {
                Ok(pcm) => pcm,
                Err(e) => {
                    log::warn!("Skipping item for clip '{}': {}", clip.id, e);
                    continue;
                }
            };
            let written = joined.first().map_or(0, Vec::len);
            let offset = SamplePosition(written as u64).to_seconds(self.sample_rate);
            for (ch, samples) in joined.iter_mut().enumerate() {
                samples.extend((0..pcm.num_frames()).map(|f| pcm.sample_for_output(f, ch, channels)));
            }
            items.push(ProjectItem {
                position: clip.start_time,
                length: pcm.duration().min(clip.duration),
                source_offset: offset,
                name: clip.label.clone(),
                file: file.clone(),
            });
        }

        if !items.is_empty() {
            let audio = AudioData {
                channels: joined,
                sample_rate: self.sample_rate,
            };
            media.push(BundleFile {
                path: file,
                bytes: encode_wav(&audio, self.bit_depth)?,
            });
        }
        Ok(items)
    }

    /// Whole sound, not trimmed to the clip, so looped items can share it
    fn sound_audio(&self, clip: &TimelineClip) -> Option<Arc<AudioData>> {
        match self.renderer.source_audio(clip) {
            Ok(pcm) => Some(pcm),
            Err(e) => {
                log::warn!("Skipping item for clip '{}': {}", clip.id, e);
                None
            }
        }
    }
}

fn next_start_after(sorted_starts: &[f64], start: f64) -> Option<f64> {
    sorted_starts.iter().copied().find(|&s| s > start)
}

/// Items for one library sound clip; repeats the sound up to `span_end` if given
fn sound_items(
    clip: &TimelineClip,
    file: &str,
    sound_length: f64,
    span_end: Option<f64>,
    total_duration: f64,
) -> Vec<ProjectItem> {
    let item = |position: f64, length: f64| ProjectItem {
        position,
        length,
        source_offset: 0.0,
        name: clip.label.clone(),
        file: file.to_string(),
    };

    let end = match span_end {
        Some(end) if sound_length > 0.0 => end.min(total_duration),
        _ => return vec![item(clip.start_time, clip.duration.min(sound_length))],
    };

    let mut items = Vec::new();
    let mut position = clip.start_time;
    while end - position > df_core::TIME_EPSILON {
        items.push(item(position, sound_length.min(end - position)));
        position += sound_length;
    }
    items
}

// ═══════════════════════════════════════════════════════════════════════════════
// RPP TEXT
// ═══════════════════════════════════════════════════════════════════════════════

struct RppWriter {
    out: String,
    depth: usize,
}

impl RppWriter {
    fn line(&mut self, text: &str) {
        for _ in 0..self.depth {
            self.out.push_str("  ");
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn open(&mut self, tag: &str) {
        self.line(&format!("<{tag}"));
        self.depth += 1;
    }

    fn close(&mut self) {
        self.depth = self.depth.saturating_sub(1);
        self.line(">");
    }
}

fn quoted(text: &str) -> String {
    let clean: String = text
        .chars()
        .map(|c| match c {
            '"' => '\'',
            '\n' | '\r' => ' ',
            c => c,
        })
        .collect();
    format!("\"{clean}\"")
}

pub fn render_rpp(tracks: &[ProjectTrack], sample_rate: u32, total_duration: f64) -> String {
    let mut rpp = RppWriter {
        out: String::new(),
        depth: 0,
    };

    rpp.open("REAPER_PROJECT 0.1 \"6.0\" 0");
    rpp.line(&format!("SAMPLERATE {sample_rate} 0 0"));
    rpp.line("LOOP 0");
    rpp.line(&format!("SELECTION 0 {total_duration:.10}"));

    for track in tracks {
        rpp.open("TRACK");
        rpp.line(&format!("NAME {}", quoted(&track.name)));
        for item in &track.items {
            rpp.open("ITEM");
            rpp.line(&format!("POSITION {:.10}", item.position));
            rpp.line(&format!("LENGTH {:.10}", item.length));
            rpp.line(&format!("SOFFS {:.10}", item.source_offset));
            rpp.line(&format!("NAME {}", quoted(&item.name)));
            rpp.open("SOURCE WAVE");
            rpp.line(&format!("FILE {}", quoted(&item.file)));
            rpp.close();
            rpp.close();
        }
        rpp.close();
    }

    rpp.close();
    rpp.out
}

/// File-name-safe version of a track or sound name
fn slug(name: &str) -> String {
    let mut out = String::new();
    for c in name.chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() {
            out.push(c);
        } else if !out.ends_with('_') {
            out.push('_');
        }
    }
    let out = out.trim_matches('_').to_string();
    if out.is_empty() { "untitled".into() } else { out }
}
