//! Scheduler driver thread
//!
//! Runs the two playback loops on one background thread:
//! - the scheduling tick, at the scheduler's tick interval
//! - the playhead readout, once per UI frame
//!
//! Shutdown is a message on a channel; [`SchedulerDriver::shutdown`] (and
//! drop) wait for the thread to exit, so no tick runs afterwards.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{RecvTimeoutError, Sender};
use parking_lot::Mutex;

use crate::{PlaybackError, PlaybackResult, PlaybackScheduler};

/// Default readout cadence (~60 fps)
pub const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_millis(16);

pub struct SchedulerDriver {
    stop_tx: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl SchedulerDriver {
    pub fn spawn(
        scheduler: Arc<Mutex<PlaybackScheduler>>,
        frame_interval: Duration,
    ) -> PlaybackResult<Self> {
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
        let (tick_every, readout) = {
            let scheduler = scheduler.lock();
            (
                Duration::from_secs_f64(scheduler.tick_interval()),
                scheduler.readout(),
            )
        };
        let frame_interval = frame_interval.max(Duration::from_millis(1));

        let handle = std::thread::Builder::new()
            .name("df-scheduler".into())
            .spawn(move || {
                let mut next_tick = Instant::now();
                loop {
                    let now = Instant::now();
                    if now >= next_tick {
                        scheduler.lock().tick();
                        next_tick = now + tick_every;
                    }
                    readout.publish();

                    let wait = frame_interval.min(next_tick.saturating_duration_since(Instant::now()));
                    match stop_rx.recv_timeout(wait) {
                        Err(RecvTimeoutError::Timeout) => continue,
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                log::debug!("Scheduler driver exited");
            })
            .map_err(|e| PlaybackError::Driver(e.to_string()))?;

        Ok(Self {
            stop_tx,
            handle: Some(handle),
        })
    }

    /// Stop the loops and wait for the thread
    pub fn shutdown(mut self) {
        self.join();
    }

    fn join(&mut self) {
        let _ = self.stop_tx.try_send(());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("Scheduler driver thread panicked");
            }
        }
    }
}

impl Drop for SchedulerDriver {
    fn drop(&mut self) {
        self.join();
    }
}
