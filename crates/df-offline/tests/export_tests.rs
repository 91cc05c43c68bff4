//! Offline Export Integration Tests
//!
//! Tests for:
//! - Mixed WAV export with cue points at line clip starts
//! - Atomic export to a path
//! - Scheduled playback through the software mixer matching the offline render
//! - Reaper project bundles (track grouping, shared sound media, BGM loops)
//! - Bundle directory written in one step

use std::sync::Arc;

use df_core::{
    BitDepth, Chapter, Character, ClipTrack, ExportScope, LineType, MemoryProject, PinnedSound,
    ScriptLine, SilenceSettings, SoundLibraryItem, StudioConfig,
};
use df_engine::{MixerOutput, OutputSlot, PlaybackScheduler};
use df_file::{AudioData, decode_audio, encode_wav, read_cue_points};
use df_offline::{
    BundleFile, ExportError, ExportInput, TrackGroup, export_mixed_audio,
    export_mixed_audio_to_path, export_project,
};
use df_timeline::ClipDurationResolver;

// ═══════════════════════════════════════════════════════════════════════════════
// HELPERS
// ═══════════════════════════════════════════════════════════════════════════════

const SOURCE_RATE: u32 = 8000;
const OUTPUT_RATE: u32 = 16000;

fn wav(seconds: f64, level: f32) -> Vec<u8> {
    let frames = (seconds * SOURCE_RATE as f64).round() as usize;
    let samples = (0..frames).map(|i| level * ((i % 50) as f32 / 50.0 - 0.5)).collect();
    encode_wav(&AudioData::mono(samples, SOURCE_RATE), BitDepth::Int16).unwrap()
}

fn line(project: &mut MemoryProject, id: &str, character: &str, seconds: f64) -> ScriptLine {
    project.add_blob(format!("{id}.wav"), wav(seconds, 0.4));
    ScriptLine::new(id, format!("text of {id}"))
        .with_character(character)
        .with_audio(format!("{id}.wav"))
}

fn sound(project: &mut MemoryProject, id: &str, category: &str, seconds: f64) {
    let audio = project.add_blob(format!("sound-{id}.wav"), wav(seconds, 0.2));
    project.add_sound(SoundLibraryItem {
        id: id.into(),
        name: id.into(),
        category: category.into(),
        duration_hint: None,
        audio,
    });
}

/// Narration with a BGM bed, two dialogue lines sharing a door effect, one sfx line
fn drama_project() -> MemoryProject {
    let mut project = MemoryProject::new();
    project.characters = vec![
        Character::new("nar", "Narrator"),
        Character::new("alice", "Alice"),
        Character::new("fx", "[SFX]"),
    ];
    project.silence = SilenceSettings::empty(0.2, 0.3)
        .with_gap(LineType::Narration, LineType::Dialogue, 0.25)
        .with_gap(LineType::Dialogue, LineType::Dialogue, 0.15);

    sound(&mut project, "rain", "weather", 0.4);
    sound(&mut project, "door", "foley", 0.25);

    let n1 = line(&mut project, "n1", "nar", 0.5).with_pinned_sound(PinnedSound::new("<rain>", 0, "rain"));
    let d1 = line(&mut project, "d1", "alice", 0.5).with_pinned_sound(PinnedSound::new("door", 3, "door"));
    let d2 = line(&mut project, "d2", "alice", 0.5)
        .with_sound_type("OS")
        .with_pinned_sound(PinnedSound::new("door", 5, "door"));
    let s1 = line(&mut project, "s1", "fx", 0.25);

    project.chapters = vec![
        Chapter::new("c1", "Opening").with_lines(vec![n1, d1]),
        Chapter::new("c2", "Hallway").with_lines(vec![d2, s1]),
    ];
    project
}

fn config() -> StudioConfig {
    let mut config = StudioConfig::default();
    config.audio.sample_rate = OUTPUT_RATE;
    config.audio.channels = 2;
    config
}

fn input<'a>(
    project: &'a MemoryProject,
    resolver: &'a ClipDurationResolver,
    config: &'a StudioConfig,
) -> ExportInput<'a> {
    ExportInput {
        store: project,
        library: project,
        resolver,
        config,
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// MIXED AUDIO
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_cue_points_land_on_line_starts() {
    let project = Arc::new(drama_project());
    let resolver = ClipDurationResolver::new(project.clone());
    let config = config();
    let input = input(&project, &resolver, &config);

    let build = input.build_timeline(&ExportScope::All).unwrap();
    let export = export_mixed_audio(&input, &ExportScope::All).unwrap();
    let cues = read_cue_points(&export.wav).unwrap();

    let expected: Vec<u32> = build
        .line_clips()
        .map(|c| (c.start_time * OUTPUT_RATE as f64).round() as u32)
        .collect();
    let offsets: Vec<u32> = cues.iter().map(|c| c.sample_offset).collect();
    assert_eq!(offsets, expected);

    let labels: Vec<&str> = cues.iter().map(|c| c.label.as_str()).collect();
    assert_eq!(labels, vec!["1", "2", "3", "4"]);
    assert_eq!(cues, export.cue_points);

    let decoded = decode_audio(&export.wav).unwrap();
    assert_eq!(decoded.sample_rate, OUTPUT_RATE);
    assert_eq!(decoded.num_channels(), 2);
    assert_eq!(
        decoded.num_frames(),
        (build.total_duration * OUTPUT_RATE as f64).round() as usize
    );
}

#[test]
fn test_cue_labels_use_prefix() {
    let project = Arc::new(drama_project());
    let resolver = ClipDurationResolver::new(project.clone());
    let mut config = config();
    config.export.cue_label_prefix = "Line ".into();

    let export = export_mixed_audio(&input(&project, &resolver, &config), &ExportScope::All).unwrap();
    assert_eq!(export.cue_points[0].label, "Line 1");
}

#[test]
fn test_empty_scope_is_an_error() {
    let project = Arc::new(drama_project());
    let resolver = ClipDurationResolver::new(project.clone());
    let config = config();
    let input = input(&project, &resolver, &config);

    let result = export_mixed_audio(&input, &ExportScope::Chapters(vec!["nope".into()]));
    assert!(matches!(result, Err(ExportError::EmptyTimeline)));
}

#[test]
fn test_export_to_path_leaves_no_part_file() {
    let project = Arc::new(drama_project());
    let resolver = ClipDurationResolver::new(project.clone());
    let config = config();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out/drama.wav");

    let export = export_mixed_audio_to_path(
        &input(&project, &resolver, &config),
        &ExportScope::Chapters(vec!["c2".into()]),
        &path,
    )
    .unwrap();

    assert_eq!(std::fs::read(&path).unwrap(), export.wav);
    assert!(!dir.path().join("out/drama.wav.part").exists());
    assert_eq!(export.cue_points.len(), 2);
}

#[test]
fn test_failed_export_writes_nothing() {
    let project = Arc::new(drama_project());
    let resolver = ClipDurationResolver::new(project.clone());
    let config = config();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("drama.wav");

    let result = export_mixed_audio_to_path(
        &input(&project, &resolver, &config),
        &ExportScope::Chapters(Vec::new()),
        &path,
    );
    assert!(result.is_err());
    assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
}

// ═══════════════════════════════════════════════════════════════════════════════
// LIVE VS OFFLINE
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_scheduled_playback_matches_offline_render() {
    const BLOCK: usize = 256;

    let project = Arc::new(drama_project());
    let resolver = Arc::new(ClipDurationResolver::new(project.clone()));
    let config = config();
    let input = input(&project, &resolver, &config);

    let build = input.build_timeline(&ExportScope::All).unwrap();
    assert_eq!(build.clips_on(ClipTrack::Sfx).count(), 2);
    let offline = input.renderer().render(&build.clips, build.total_duration).unwrap();

    let mixer = MixerOutput::with_slot(OUTPUT_RATE, 2, OutputSlot::new("export-test"));
    let mut scheduler = PlaybackScheduler::new(
        &build,
        Arc::clone(&resolver),
        Box::new(mixer.clone()),
        &config.playback,
    )
    .unwrap();
    scheduler.start(0.0).unwrap();

    let wanted = offline.samples.len();
    let mut live: Vec<f32> = Vec::with_capacity(wanted + BLOCK * 2);
    while live.len() < wanted {
        live.extend(mixer.render_frames(BLOCK));
        scheduler.tick();
    }

    for (i, (offline, live)) in offline.samples.iter().zip(&live).enumerate() {
        assert!(
            (offline - *live as f64).abs() < 1e-6,
            "sample {i}: offline {offline} vs live {live}"
        );
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// REAPER PROJECT
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_project_tracks_by_type() {
    let project = Arc::new(drama_project());
    let resolver = ClipDurationResolver::new(project.clone());
    let config = config();

    let bundle = export_project(&input(&project, &resolver, &config), &ExportScope::All, "My Drama").unwrap();
    let names: Vec<&str> = bundle.tracks.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "Narration",
            "Dialogue",
            "Dialogue (OS)",
            "SFX Lines",
            "SFX - foley",
            "BGM - weather"
        ]
    );
    assert_eq!(bundle.project_file.path, "my_drama.rpp");

    let text = String::from_utf8(bundle.project_file.bytes.clone()).unwrap();
    assert!(text.contains("NAME \"Dialogue (OS)\""));
    assert!(text.contains("SAMPLERATE 16000 0 0"));
}

#[test]
fn test_dialogue_split_by_scene() {
    let project = Arc::new(drama_project());
    let resolver = ClipDurationResolver::new(project.clone());
    let mut config = config();
    config.export.split_dialogue_by_scene = true;

    let bundle = export_project(&input(&project, &resolver, &config), &ExportScope::All, "drama").unwrap();
    let names: Vec<&str> = bundle.tracks.iter().map(|t| t.name.as_str()).collect();
    assert!(names.contains(&"Dialogue - Opening"));
    assert!(names.contains(&"Dialogue - Hallway (OS)"));
}

#[test]
fn test_line_items_point_into_concatenated_media() {
    let project = Arc::new(drama_project());
    let resolver = ClipDurationResolver::new(project.clone());
    let config = config();

    let bundle = export_project(&input(&project, &resolver, &config), &ExportScope::All, "drama").unwrap();
    let build = input(&project, &resolver, &config)
        .build_timeline(&ExportScope::All)
        .unwrap();

    let narration = &bundle.tracks[0];
    assert_eq!(narration.items.len(), 1);
    let item = &narration.items[0];
    assert_eq!(item.source_offset, 0.0);
    assert_eq!(item.position, build.clip("n1").unwrap().start_time);

    let media = bundle
        .media
        .iter()
        .find(|m| m.path == item.file)
        .unwrap();
    let decoded = decode_audio(&media.bytes).unwrap();
    assert_eq!(decoded.sample_rate, OUTPUT_RATE);
    assert_eq!(decoded.num_frames(), (0.5 * OUTPUT_RATE as f64) as usize);
}

#[test]
fn test_sound_media_written_once() {
    let project = Arc::new(drama_project());
    let resolver = ClipDurationResolver::new(project.clone());
    let config = config();

    let bundle = export_project(&input(&project, &resolver, &config), &ExportScope::All, "drama").unwrap();

    let sfx = bundle.tracks.iter().find(|t| t.name == "SFX - foley").unwrap();
    assert_eq!(sfx.items.len(), 2);
    assert_eq!(sfx.items[0].file, sfx.items[1].file);

    let sound_files = bundle
        .media
        .iter()
        .filter(|m| m.path.starts_with("media/sounds/"))
        .count();
    assert_eq!(sound_files, 2);
}

#[test]
fn test_bgm_loops_to_end_when_enabled() {
    let project = Arc::new(drama_project());
    let resolver = ClipDurationResolver::new(project.clone());
    let mut config = config();

    let bundle = export_project(&input(&project, &resolver, &config), &ExportScope::All, "drama").unwrap();
    let build = input(&project, &resolver, &config)
        .build_timeline(&ExportScope::All)
        .unwrap();
    let bgm = bundle.tracks.iter().find(|t| t.name == "BGM - weather").unwrap();
    let last = bgm.items.last().unwrap();
    assert!(bgm.items.len() > 1);
    assert!((last.position + last.length - build.total_duration).abs() < 1e-6);

    config.export.loop_bgm_until_next = false;
    let bundle = export_project(&input(&project, &resolver, &config), &ExportScope::All, "drama").unwrap();
    let bgm = bundle.tracks.iter().find(|t| t.name == "BGM - weather").unwrap();
    assert_eq!(bgm.items.len(), 1);
}

#[test]
fn test_bundle_written_to_dir() {
    let project = Arc::new(drama_project());
    let resolver = ClipDurationResolver::new(project.clone());
    let config = config();
    let dir = tempfile::tempdir().unwrap();

    let bundle = export_project(&input(&project, &resolver, &config), &ExportScope::All, "drama").unwrap();
    let written = bundle.write_to_dir(dir.path()).unwrap();

    assert_eq!(written.len(), 1 + bundle.media.len());
    assert!(dir.path().join("drama.rpp").exists());
    for file in &bundle.media {
        assert_eq!(std::fs::read(dir.path().join(&file.path)).unwrap(), file.bytes);
    }
}

#[test]
fn test_failed_bundle_write_leaves_nothing() {
    let project = Arc::new(drama_project());
    let resolver = ClipDurationResolver::new(project.clone());
    let config = config();
    let tmp = tempfile::tempdir().unwrap();
    let out = tmp.path().join("bundle");

    let mut bundle = export_project(&input(&project, &resolver, &config), &ExportScope::All, "drama").unwrap();
    // A media file nested under another file cannot be created
    let first = bundle.media[0].path.clone();
    bundle.media.push(BundleFile {
        path: format!("{first}/broken.wav"),
        bytes: vec![0; 4],
    });

    assert!(bundle.write_to_dir(&out).is_err());
    assert!(!out.exists());
    assert!(!tmp.path().join("bundle.part").exists());
}

#[test]
fn test_bundle_refuses_non_empty_dir() {
    let project = Arc::new(drama_project());
    let resolver = ClipDurationResolver::new(project.clone());
    let config = config();
    let tmp = tempfile::tempdir().unwrap();
    std::fs::write(tmp.path().join("notes.txt"), b"keep").unwrap();

    let bundle = export_project(&input(&project, &resolver, &config), &ExportScope::All, "drama").unwrap();

    assert!(matches!(
        bundle.write_to_dir(tmp.path()),
        Err(ExportError::TargetNotEmpty(_))
    ));
    assert_eq!(std::fs::read(tmp.path().join("notes.txt")).unwrap(), b"keep");
    assert!(!tmp.path().join("drama.rpp").exists());
}

#[test]
fn test_track_group_of_sfx_line() {
    let project = Arc::new(drama_project());
    let resolver = ClipDurationResolver::new(project.clone());
    let config = config();
    let build = input(&project, &resolver, &config)
        .build_timeline(&ExportScope::All)
        .unwrap();

    let s1 = build.clip("s1").unwrap();
    assert_eq!(TrackGroup::of(s1, &|_: &String| None), TrackGroup::SfxLines);
}
