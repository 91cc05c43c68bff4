//! PlaybackScheduler Integration Tests
//!
//! Tests for:
//! - Lookahead scheduling (each clip started exactly once)
//! - Mid-clip start offsets and anchor-derived start instants
//! - Stop / seek resynchronization and epoch-guarded completions
//! - Auto-stop at the end of the timeline
//! - Per-clip failure resilience
//! - Output lease exclusivity
//! - Driver thread ticking and readout publishing

use std::sync::Arc;
use std::time::Duration;

use approx::assert_relative_eq;
use df_core::{
    AudioRef, BitDepth, ClipTrack, LineType, MemoryProject, PlaybackConfig, TimelineClip,
};
use df_engine::{
    AudioClock, AudioOutput, ManualClock, OutputSlot, PlaybackError, PlaybackEvent,
    PlaybackResult, PlaybackScheduler, SchedulerDriver, SchedulerState, SourceHandle,
    SourceRequest,
};
use df_file::{AudioData, encode_wav};
use df_timeline::{ClipDurationResolver, TimelineBuild};
use parking_lot::Mutex;

// ═══════════════════════════════════════════════════════════════════════════════
// HELPERS
// ═══════════════════════════════════════════════════════════════════════════════

const RATE: u32 = 1000;

#[derive(Default)]
struct OutputLog {
    started: Vec<(SourceHandle, SourceRequest)>,
    stopped: Vec<SourceHandle>,
    finished: Vec<SourceHandle>,
}

/// Output that records requests; completions are injected by the test
struct FakeOutput {
    clock: Arc<ManualClock>,
    slot: Arc<OutputSlot>,
    log: Arc<Mutex<OutputLog>>,
    next_id: u64,
}

impl AudioOutput for FakeOutput {
    fn clock(&self) -> Arc<dyn AudioClock> {
        self.clock.clone()
    }

    fn slot(&self) -> Arc<OutputSlot> {
        Arc::clone(&self.slot)
    }

    fn start_source(&mut self, request: SourceRequest) -> PlaybackResult<SourceHandle> {
        self.next_id += 1;
        let handle = SourceHandle {
            id: self.next_id,
            generation: request.generation,
        };
        self.log.lock().started.push((handle, request));
        Ok(handle)
    }

    fn stop_source(&mut self, handle: SourceHandle) {
        self.log.lock().stopped.push(handle);
    }

    fn drain_finished(&mut self) -> Vec<SourceHandle> {
        std::mem::take(&mut self.log.lock().finished)
    }
}

struct Harness {
    scheduler: PlaybackScheduler,
    clock: Arc<ManualClock>,
    log: Arc<Mutex<OutputLog>>,
    events: Arc<Mutex<Vec<PlaybackEvent>>>,
}

impl Harness {
    fn started_ids(&self) -> Vec<String> {
        self.log
            .lock()
            .started
            .iter()
            .map(|(_, r)| r.clip_id.clone())
            .collect()
    }

    fn request(&self, clip_id: &str) -> SourceRequest {
        self.log
            .lock()
            .started
            .iter()
            .rev()
            .find(|(_, r)| r.clip_id == clip_id)
            .map(|(_, r)| r.clone())
            .unwrap()
    }

    fn handle(&self, clip_id: &str) -> SourceHandle {
        self.log
            .lock()
            .started
            .iter()
            .rev()
            .find(|(_, r)| r.clip_id == clip_id)
            .map(|(h, _)| *h)
            .unwrap()
    }

    fn events(&self) -> Vec<PlaybackEvent> {
        self.events.lock().clone()
    }

    fn advance_and_tick(&mut self, seconds: f64) {
        self.clock.advance(seconds);
        self.scheduler.tick();
    }
}

fn wav(seconds: f64) -> Vec<u8> {
    let frames = (seconds * RATE as f64).round() as usize;
    encode_wav(&AudioData::mono(vec![0.2; frames], RATE), BitDepth::Int16).unwrap()
}

fn clip(id: &str, start: f64, duration: f64) -> TimelineClip {
    TimelineClip {
        id: id.into(),
        track: ClipTrack::Line,
        start_time: start,
        duration,
        audio: AudioRef::new(format!("{id}.wav")),
        chapter_id: "ch".into(),
        line_id: id.into(),
        character_id: None,
        line_type: Some(LineType::Narration),
        sound_type: None,
        sound_id: None,
        category: None,
        label: String::new(),
    }
}

/// a@0.0 (1.0s), b@1.2 (0.5s), c@3.0 (1.0s); ends at 4.5
fn timeline(project: &mut MemoryProject) -> TimelineBuild {
    let clips = vec![clip("a", 0.0, 1.0), clip("b", 1.2, 0.5), clip("c", 3.0, 1.0)];
    for c in &clips {
        project.add_blob(c.audio.as_str(), wav(c.duration));
    }
    TimelineBuild {
        clips,
        total_duration: 4.5,
        failures: Vec::new(),
    }
}

fn config() -> PlaybackConfig {
    PlaybackConfig {
        tick_interval_ms: 100,
        lookahead_ms: 300,
    }
}

fn harness_with(
    project: MemoryProject,
    build: &TimelineBuild,
    clock_start: f64,
    slot: Arc<OutputSlot>,
) -> Harness {
    let clock = Arc::new(ManualClock::starting_at(clock_start));
    let log = Arc::new(Mutex::new(OutputLog::default()));
    let output = FakeOutput {
        clock: clock.clone(),
        slot,
        log: log.clone(),
        next_id: 0,
    };
    let resolver = Arc::new(ClipDurationResolver::new(Arc::new(project)));
    let mut scheduler =
        PlaybackScheduler::new(build, resolver, Box::new(output), &config()).unwrap();

    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    scheduler.set_status_callback(Box::new(move |e| sink.lock().push(e.clone())));

    Harness {
        scheduler,
        clock,
        log,
        events,
    }
}

fn harness(clock_start: f64) -> Harness {
    let mut project = MemoryProject::new();
    let build = timeline(&mut project);
    harness_with(project, &build, clock_start, OutputSlot::new("fake"))
}

// ═══════════════════════════════════════════════════════════════════════════════
// LOOKAHEAD SCHEDULING
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_start_schedules_only_lookahead_window() {
    let mut h = harness(5.0);
    h.scheduler.start(0.0).unwrap();

    assert_eq!(h.scheduler.state(), SchedulerState::Scheduling);
    assert_eq!(h.started_ids(), ["a"]);
    let a = h.request("a");
    assert_relative_eq!(a.when, 5.0);
    assert_eq!(a.offset, 0.0);
    assert_relative_eq!(a.duration, 1.0);
}

#[test]
fn test_each_clip_scheduled_once_at_anchor_instant() {
    let mut h = harness(5.0);
    h.scheduler.start(0.0).unwrap();

    h.advance_and_tick(0.1);
    assert_eq!(h.started_ids(), ["a"]);

    // Late, irregular ticks still land b exactly at 5.0 + 1.2
    h.advance_and_tick(0.837);
    h.advance_and_tick(0.05);
    h.advance_and_tick(0.1);
    assert_eq!(h.started_ids(), ["a", "b"]);
    assert_relative_eq!(h.request("b").when, 6.2, epsilon = 1e-9);
    assert_eq!(h.request("b").offset, 0.0);

    h.advance_and_tick(0.1);
    h.advance_and_tick(0.1);
    assert_eq!(h.started_ids(), ["a", "b"]);
}

#[test]
fn test_start_mid_clip_uses_offset() {
    let mut h = harness(2.0);
    h.scheduler.start(0.4).unwrap();

    let a = h.request("a");
    assert_relative_eq!(a.when, 2.0, epsilon = 1e-9);
    assert_relative_eq!(a.offset, 0.4, epsilon = 1e-9);
    assert_relative_eq!(a.duration, 0.6, epsilon = 1e-9);
}

#[test]
fn test_clip_in_lookahead_gap_not_started_early() {
    let mut h = harness(0.0);
    h.scheduler.start(1.7).unwrap();
    // b ended at 1.7, c starts at 3.0
    assert!(h.started_ids().is_empty());
}

// ═══════════════════════════════════════════════════════════════════════════════
// STOP / SEEK
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_stop_releases_sources_and_parks_playhead() {
    let mut h = harness(0.0);
    h.scheduler.start(0.0).unwrap();
    h.advance_and_tick(1.0);
    let a = h.handle("a");
    let b = h.handle("b");

    h.clock.advance(0.25);
    h.scheduler.stop();

    assert_eq!(h.scheduler.state(), SchedulerState::Stopped);
    let stopped = h.log.lock().stopped.clone();
    assert!(stopped.contains(&a));
    assert!(stopped.contains(&b));
    assert!(h.scheduler.active_clips().is_empty());
    assert_relative_eq!(h.scheduler.readout().current_time(), 1.25, epsilon = 1e-9);

    // Clock keeps running, readout stays parked
    h.clock.advance(3.0);
    assert_relative_eq!(h.scheduler.readout().current_time(), 1.25, epsilon = 1e-9);
    assert!(matches!(h.events().last(), Some(PlaybackEvent::Stopped { .. })));
}

#[test]
fn test_stop_when_stopped_is_noop() {
    let mut h = harness(0.0);
    h.scheduler.stop();
    h.scheduler.stop();
    assert!(h.events().is_empty());
}

#[test]
fn test_restart_reschedules_and_ignores_stale_completion() {
    let mut h = harness(0.0);
    h.scheduler.start(0.0).unwrap();
    let old = h.handle("a");
    h.scheduler.stop();

    h.scheduler.start(0.0).unwrap();
    let new = h.handle("a");
    assert_ne!(old, new);
    assert_eq!(h.started_ids(), ["a", "a"]);

    // The first run's source reports completion late
    h.log.lock().finished.push(old);
    h.advance_and_tick(0.05);

    assert_eq!(h.scheduler.active_clips(), ["a"]);
    assert!(
        !h.events()
            .iter()
            .any(|e| matches!(e, PlaybackEvent::ClipFinished { .. }))
    );
}

#[test]
fn test_natural_completion_removes_active_source() {
    let mut h = harness(0.0);
    h.scheduler.start(0.0).unwrap();
    let a = h.handle("a");

    h.clock.advance(1.0);
    h.log.lock().finished.push(a);
    h.scheduler.tick();

    assert!(!h.scheduler.active_clips().contains(&"a".to_string()));
    assert!(h.events().contains(&PlaybackEvent::ClipFinished {
        clip_id: "a".into()
    }));
}

#[test]
fn test_seek_while_playing_restarts_at_new_position() {
    let mut h = harness(0.0);
    h.scheduler.start(0.0).unwrap();
    let a = h.handle("a");
    h.clock.advance(0.2);

    h.scheduler.seek(3.0).unwrap();

    assert_eq!(h.scheduler.state(), SchedulerState::Scheduling);
    assert!(h.log.lock().stopped.contains(&a));
    assert_eq!(h.started_ids(), ["a", "c"]);
    let c = h.request("c");
    assert_relative_eq!(c.when, 0.2, epsilon = 1e-9);
    assert_eq!(c.offset, 0.0);
    assert_relative_eq!(h.scheduler.current_time(), 3.0, epsilon = 1e-9);
    assert!(h.events().contains(&PlaybackEvent::Seeked { to: 3.0 }));
}

#[test]
fn test_seek_while_stopped_only_moves_playhead() {
    let mut h = harness(0.0);
    h.scheduler.seek(2.0).unwrap();

    assert_eq!(h.scheduler.state(), SchedulerState::Stopped);
    assert!(h.started_ids().is_empty());
    assert_eq!(h.scheduler.readout().current_time(), 2.0);

    h.scheduler.seek(100.0).unwrap();
    assert_eq!(h.scheduler.current_time(), 4.5);
}

// ═══════════════════════════════════════════════════════════════════════════════
// END OF TIMELINE / FAILURES
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_auto_stop_at_end() {
    let mut h = harness(0.0);
    h.scheduler.start(4.0).unwrap();
    h.advance_and_tick(0.6);

    assert_eq!(h.scheduler.state(), SchedulerState::Stopped);
    assert_eq!(h.scheduler.readout().current_time(), 4.5);
    assert_eq!(h.events().last(), Some(&PlaybackEvent::Ended));
}

#[test]
fn test_undecodable_clip_dropped_playback_continues() {
    let mut project = MemoryProject::new();
    let mut build = timeline(&mut project);
    build.clips[0].audio = AudioRef::new("missing.wav");
    let mut h = harness_with(project, &build, 0.0, OutputSlot::new("fake"));

    h.scheduler.start(0.0).unwrap();
    h.advance_and_tick(1.0);

    assert_eq!(h.started_ids(), ["b"]);
    assert_eq!(h.scheduler.state(), SchedulerState::Scheduling);
    assert!(h.events().iter().any(|e| matches!(
        e,
        PlaybackEvent::ClipDropped { clip_id, .. } if clip_id == "a"
    )));
}

#[test]
fn test_zero_duration_clips_never_scheduled() {
    let mut project = MemoryProject::new();
    let mut build = timeline(&mut project);
    build.clips.push(clip("z", 0.1, 0.0));
    let mut h = harness_with(project, &build, 0.0, OutputSlot::new("fake"));

    h.scheduler.start(0.0).unwrap();
    assert_eq!(h.started_ids(), ["a"]);
}

// ═══════════════════════════════════════════════════════════════════════════════
// READOUT
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_readout_follows_clock_without_drift() {
    let mut h = harness(0.0);
    h.scheduler.start(0.5).unwrap();
    let readout = h.scheduler.readout();

    for _ in 0..1000 {
        h.clock.advance(0.001);
    }
    assert_relative_eq!(readout.current_time(), 1.5, epsilon = 1e-9);
    assert_relative_eq!(readout.publish(), 1.5, epsilon = 1e-9);
}

// ═══════════════════════════════════════════════════════════════════════════════
// OUTPUT LEASE / CONFIG
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_only_one_scheduler_holds_output() {
    let slot = OutputSlot::new("shared");
    let mut p1 = MemoryProject::new();
    let b1 = timeline(&mut p1);
    let mut p2 = MemoryProject::new();
    let b2 = timeline(&mut p2);
    let mut first = harness_with(p1, &b1, 0.0, slot.clone());
    let mut second = harness_with(p2, &b2, 0.0, slot.clone());

    first.scheduler.start(0.0).unwrap();
    let err = second.scheduler.start(0.0).unwrap_err();
    assert_eq!(err, PlaybackError::OutputBusy("shared".into()));
    assert_eq!(second.scheduler.state(), SchedulerState::Stopped);
    assert!(matches!(
        second.events().last(),
        Some(PlaybackEvent::OutputUnavailable { .. })
    ));

    first.scheduler.stop();
    assert!(!slot.is_leased());
    second.scheduler.start(0.0).unwrap();
    assert!(slot.is_leased());
}

#[test]
fn test_tick_must_be_shorter_than_lookahead() {
    let mut project = MemoryProject::new();
    let build = timeline(&mut project);
    let output = FakeOutput {
        clock: Arc::new(ManualClock::new()),
        slot: OutputSlot::new("fake"),
        log: Arc::new(Mutex::new(OutputLog::default())),
        next_id: 0,
    };
    let resolver = Arc::new(ClipDurationResolver::new(Arc::new(project)));
    let config = PlaybackConfig {
        tick_interval_ms: 300,
        lookahead_ms: 300,
    };

    let result = PlaybackScheduler::new(&build, resolver, Box::new(output), &config);
    assert!(matches!(result, Err(PlaybackError::InvalidConfig(_))));
}

// ═══════════════════════════════════════════════════════════════════════════════
// DRIVER
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_driver_ticks_and_publishes() {
    let mut h = harness(0.0);
    h.scheduler.start(0.0).unwrap();
    let readout = h.scheduler.readout();
    let rx = readout.subscribe();
    h.clock.advance(1.0);

    let log = h.log.clone();
    let scheduler = Arc::new(Mutex::new(h.scheduler));
    let driver = SchedulerDriver::spawn(scheduler.clone(), Duration::from_millis(2)).unwrap();
    std::thread::sleep(Duration::from_millis(100));
    driver.shutdown();

    let started: Vec<_> = log.lock().started.iter().map(|(_, r)| r.clip_id.clone()).collect();
    assert_eq!(started, ["a", "b"]);
    let published = rx.try_recv().unwrap();
    assert_relative_eq!(published, 1.0, epsilon = 1e-9);

    // No ticks after shutdown
    let count = log.lock().started.len();
    std::thread::sleep(Duration::from_millis(20));
    assert_eq!(log.lock().started.len(), count);
    assert_eq!(scheduler.lock().state(), SchedulerState::Scheduling);
}
