//! Playhead readout
//!
//! The displayed time is always recomputed from the start anchor and the
//! live clock. Nothing is accumulated between frames, so the readout cannot
//! drift from what the output is actually playing.

use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender, TrySendError};
use parking_lot::{Mutex, RwLock};

use crate::AudioClock;

/// Capacity of each subscriber queue; slow readers lose frames, not time
const SUBSCRIBER_QUEUE: usize = 64;

/// Clock instant and timeline position at which playback (re)started
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Anchor {
    pub clock_at_start: f64,
    pub timeline_at_start: f64,
}

impl Anchor {
    #[inline]
    pub fn timeline_time(&self, now: f64) -> f64 {
        self.timeline_at_start + (now - self.clock_at_start)
    }

    /// Clock instant at which `timeline_time` is reached
    #[inline]
    pub fn clock_time(&self, timeline_time: f64) -> f64 {
        self.clock_at_start + (timeline_time - self.timeline_at_start)
    }
}

struct ReadoutState {
    anchor: Option<Anchor>,
    /// Position while stopped
    position: f64,
    total_duration: f64,
}

pub struct PlayheadReadout {
    clock: Arc<dyn AudioClock>,
    state: RwLock<ReadoutState>,
    subscribers: Mutex<Vec<Sender<f64>>>,
}

impl PlayheadReadout {
    pub fn new(clock: Arc<dyn AudioClock>, total_duration: f64) -> Self {
        Self {
            clock,
            state: RwLock::new(ReadoutState {
                anchor: None,
                position: 0.0,
                total_duration: total_duration.max(0.0),
            }),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Current playhead, clamped to `[0, total_duration]`
    pub fn current_time(&self) -> f64 {
        let state = self.state.read();
        let time = match state.anchor {
            Some(anchor) => anchor.timeline_time(self.clock.now()),
            None => state.position,
        };
        time.clamp(0.0, state.total_duration)
    }

    pub fn is_running(&self) -> bool {
        self.state.read().anchor.is_some()
    }

    pub fn total_duration(&self) -> f64 {
        self.state.read().total_duration
    }

    pub fn subscribe(&self) -> Receiver<f64> {
        let (tx, rx) = crossbeam_channel::bounded(SUBSCRIBER_QUEUE);
        self.subscribers.lock().push(tx);
        rx
    }

    /// Send the current time to every subscriber (one UI frame)
    pub fn publish(&self) -> f64 {
        let time = self.current_time();
        self.subscribers.lock().retain(|tx| match tx.try_send(time) {
            Ok(()) | Err(TrySendError::Full(_)) => true,
            Err(TrySendError::Disconnected(_)) => false,
        });
        time
    }

    pub(crate) fn run_from(&self, anchor: Anchor) {
        self.state.write().anchor = Some(anchor);
    }

    pub(crate) fn park_at(&self, position: f64) {
        let mut state = self.state.write();
        state.anchor = None;
        state.position = position.clamp(0.0, state.total_duration);
    }

    pub(crate) fn set_total_duration(&self, total_duration: f64) {
        let mut state = self.state.write();
        state.total_duration = total_duration.max(0.0);
        state.position = state.position.min(state.total_duration);
    }
}
