//! Lookahead playback scheduler
//!
//! State machine:
//!
//! ```text
//! Stopped ──start──▶ Scheduling ──stop / end──▶ Stopped
//!                     │    ▲
//!                     └seek┘   (Seeking while the restart happens)
//! ```
//!
//! Every tick computes the timeline position from the anchor, then starts
//! each clip intersecting `[now, now + lookahead)` exactly once. Source
//! start instants come from the anchor as well, so tick jitter never shows
//! up in the audio.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use df_core::{ClipId, PlaybackConfig, TimelineClip};
use df_timeline::{ClipDurationResolver, TimelineBuild};

use crate::{
    Anchor, AudioClock, AudioOutput, OutputLease, PlaybackError, PlaybackResult, PlayheadReadout,
    SourceHandle, SourceRequest,
};

// ═══════════════════════════════════════════════════════════════════════════════
// STATE / EVENTS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Stopped,
    Scheduling,
    /// Transient, while a seek restarts playback
    Seeking,
}

/// Status reported to the transport UI
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
    Started { at: f64 },
    Stopped { at: f64 },
    Seeked { to: f64 },
    /// Reached the end of the timeline and stopped
    Ended,
    ClipStarted { clip_id: ClipId, when: f64, offset: f64 },
    ClipFinished { clip_id: ClipId },
    /// Clip could not be played; playback continues without it
    ClipDropped { clip_id: ClipId, reason: String },
    /// Playback could not start
    OutputUnavailable { reason: String },
}

pub type StatusCallback = Box<dyn Fn(&PlaybackEvent) + Send + Sync>;

// ═══════════════════════════════════════════════════════════════════════════════
// SCHEDULER
// ═══════════════════════════════════════════════════════════════════════════════

pub struct PlaybackScheduler {
    clips: Vec<TimelineClip>,
    total_duration: f64,

    resolver: Arc<ClipDurationResolver>,
    output: Box<dyn AudioOutput>,
    clock: Arc<dyn AudioClock>,
    readout: Arc<PlayheadReadout>,

    tick_interval: f64,
    lookahead: f64,

    state: SchedulerState,
    anchor: Option<Anchor>,
    /// Playhead while stopped
    position: f64,
    /// Bumped on every start and stop; completions from older epochs are ignored
    epoch: u64,
    scheduled: HashSet<ClipId>,
    active: HashMap<SourceHandle, ClipId>,
    lease: Option<OutputLease>,

    on_status: Option<StatusCallback>,
}

impl PlaybackScheduler {
    pub fn new(
        timeline: &TimelineBuild,
        resolver: Arc<ClipDurationResolver>,
        output: Box<dyn AudioOutput>,
        config: &PlaybackConfig,
    ) -> PlaybackResult<Self> {
        let tick_interval = config.tick_interval_secs();
        let lookahead = config.lookahead_secs();
        if !(tick_interval > 0.0 && tick_interval < lookahead) {
            return Err(PlaybackError::InvalidConfig(format!(
                "tick interval ({} ms) must be positive and shorter than lookahead ({} ms)",
                config.tick_interval_ms, config.lookahead_ms
            )));
        }

        let clock = output.clock();
        let readout = Arc::new(PlayheadReadout::new(Arc::clone(&clock), 0.0));

        let mut scheduler = Self {
            clips: Vec::new(),
            total_duration: 0.0,
            resolver,
            output,
            clock,
            readout,
            tick_interval,
            lookahead,
            state: SchedulerState::Stopped,
            anchor: None,
            position: 0.0,
            epoch: 0,
            scheduled: HashSet::new(),
            active: HashMap::new(),
            lease: None,
            on_status: None,
        };
        scheduler.load_timeline(timeline);
        Ok(scheduler)
    }

    /// Replace the timeline (after a rebuild). Stops playback if running.
    pub fn load_timeline(&mut self, timeline: &TimelineBuild) {
        self.stop();
        self.clips = timeline
            .clips
            .iter()
            .filter(|c| c.duration > 0.0)
            .cloned()
            .collect();
        self.total_duration = timeline.total_duration.max(0.0);
        self.position = self.position.min(self.total_duration);
        self.readout.set_total_duration(self.total_duration);
        self.readout.park_at(self.position);
    }

    pub fn set_status_callback(&mut self, callback: StatusCallback) {
        self.on_status = Some(callback);
    }

    pub fn readout(&self) -> Arc<PlayheadReadout> {
        Arc::clone(&self.readout)
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state != SchedulerState::Stopped
    }

    pub fn total_duration(&self) -> f64 {
        self.total_duration
    }

    /// Tick cadence of the driver (seconds)
    pub fn tick_interval(&self) -> f64 {
        self.tick_interval
    }

    pub fn lookahead(&self) -> f64 {
        self.lookahead
    }

    /// Timeline position derived from the anchor (or the parked position)
    pub fn current_time(&self) -> f64 {
        match self.anchor {
            Some(anchor) => anchor.timeline_time(self.clock.now()),
            None => self.position,
        }
    }

    /// Clips started in the current run and not yet finished
    pub fn active_clips(&self) -> Vec<ClipId> {
        let mut clips: Vec<_> = self.active.values().cloned().collect();
        clips.sort();
        clips
    }

    // ─── Transport ─────────────────────────────────────────────────────────────

    /// Start playing from `at` (seconds on the timeline)
    ///
    /// Restarts from `at` when already playing. Fails if the output is held by
    /// another scheduler.
    pub fn start(&mut self, at: f64) -> PlaybackResult<()> {
        if self.is_playing() {
            self.halt();
        }
        let at = self.clamp_time(at);

        if self.lease.is_none() {
            match self.output.slot().try_lease() {
                Ok(lease) => self.lease = Some(lease),
                Err(e) => {
                    log::error!("Cannot start playback: {}", e);
                    self.emit(PlaybackEvent::OutputUnavailable {
                        reason: e.to_string(),
                    });
                    return Err(e);
                }
            }
        }

        let anchor = Anchor {
            clock_at_start: self.clock.now(),
            timeline_at_start: at,
        };
        self.epoch += 1;
        self.anchor = Some(anchor);
        self.position = at;
        self.state = SchedulerState::Scheduling;
        self.readout.run_from(anchor);

        log::debug!("Playback started at {:.3}s (epoch {})", at, self.epoch);
        self.emit(PlaybackEvent::Started { at });

        self.tick();
        Ok(())
    }

    /// Stop playback and release every source. Safe to call at any time.
    pub fn stop(&mut self) {
        if !self.is_playing() {
            return;
        }
        let at = self.halt();
        self.lease = None;
        log::debug!("Playback stopped at {:.3}s", at);
        self.emit(PlaybackEvent::Stopped { at });
    }

    /// Jump to `to`; keeps playing if playing
    pub fn seek(&mut self, to: f64) -> PlaybackResult<()> {
        let to = self.clamp_time(to);
        if !self.is_playing() {
            self.position = to;
            self.readout.park_at(to);
            self.emit(PlaybackEvent::Seeked { to });
            return Ok(());
        }

        self.state = SchedulerState::Seeking;
        self.halt();
        self.emit(PlaybackEvent::Seeked { to });
        log::debug!("Seek to {:.3}s", to);
        self.start(to)
    }

    /// One scheduling pass; called by the driver every tick interval
    pub fn tick(&mut self) {
        let Some(anchor) = self.anchor else {
            return;
        };

        for handle in self.output.drain_finished() {
            if handle.generation != self.epoch {
                log::trace!("Ignoring completion from epoch {}", handle.generation);
                continue;
            }
            if let Some(clip_id) = self.active.remove(&handle) {
                self.emit(PlaybackEvent::ClipFinished { clip_id });
            }
        }

        let now = self.clock.now();
        let current = anchor.timeline_time(now);

        if current >= self.total_duration {
            self.finish();
            return;
        }

        let window_end = current + self.lookahead;
        let due: Vec<usize> = self
            .clips
            .iter()
            .enumerate()
            .filter(|(_, c)| !self.scheduled.contains(&c.id) && c.intersects(current, window_end))
            .map(|(i, _)| i)
            .collect();

        for index in due {
            self.schedule_clip(index, anchor, current);
        }
    }

    // ─── Internals ─────────────────────────────────────────────────────────────

    fn schedule_clip(&mut self, index: usize, anchor: Anchor, current: f64) {
        let clip = &self.clips[index];
        let clip_id = clip.id.clone();
        // Once per run, even if it fails
        self.scheduled.insert(clip_id.clone());

        let (when, offset) = if clip.start_time >= current {
            (anchor.clock_time(clip.start_time), 0.0)
        } else {
            (anchor.clock_time(current), current - clip.start_time)
        };
        let duration = clip.duration - offset;
        let audio_ref = clip.audio.clone();

        let audio = match self.resolver.load_pcm(&audio_ref) {
            Ok(audio) => audio,
            Err(reason) => {
                log::warn!("Dropping clip '{}': {}", clip_id, reason);
                self.emit(PlaybackEvent::ClipDropped {
                    clip_id,
                    reason: reason.to_string(),
                });
                return;
            }
        };

        let request = SourceRequest {
            clip_id: clip_id.clone(),
            audio,
            when,
            offset,
            duration,
            generation: self.epoch,
        };

        match self.output.start_source(request) {
            Ok(handle) => {
                self.active.insert(handle, clip_id.clone());
                self.emit(PlaybackEvent::ClipStarted {
                    clip_id,
                    when,
                    offset,
                });
            }
            Err(e) => {
                log::warn!("Output refused clip '{}': {}", clip_id, e);
                self.emit(PlaybackEvent::ClipDropped {
                    clip_id,
                    reason: e.to_string(),
                });
            }
        }
    }

    /// Reached the end: stop and park at the end
    fn finish(&mut self) {
        self.halt();
        self.position = self.total_duration;
        self.readout.park_at(self.total_duration);
        self.lease = None;
        log::info!("Playback reached end ({:.3}s)", self.total_duration);
        self.emit(PlaybackEvent::Ended);
    }

    /// Stop all sources and detach the anchor; keeps the lease
    fn halt(&mut self) -> f64 {
        let at = self.clamp_time(self.current_time());

        for handle in std::mem::take(&mut self.active).into_keys() {
            self.output.stop_source(handle);
        }
        self.scheduled.clear();
        self.anchor = None;
        self.epoch += 1;
        self.position = at;
        self.state = SchedulerState::Stopped;
        self.readout.park_at(at);
        at
    }

    fn clamp_time(&self, time: f64) -> f64 {
        if time.is_finite() {
            time.clamp(0.0, self.total_duration)
        } else {
            0.0
        }
    }

    fn emit(&self, event: PlaybackEvent) {
        if let Some(callback) = &self.on_status {
            callback(&event);
        }
    }
}

impl Drop for PlaybackScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}
