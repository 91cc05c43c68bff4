//! Device output
//!
//! Plays a [`MixerOutput`] through the default audio device. The cpal stream
//! lives on its own thread (streams are not `Send` on every host); its
//! callback pulls blocks from the mixer, so the mixer clock advances with the
//! device and the scheduler runs in lock-step with real audio time.

use std::sync::Arc;
use std::thread::JoinHandle;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::Sender;

use crate::{
    AudioClock, AudioOutput, MixerOutput, OutputSlot, PlaybackError, PlaybackResult, SourceHandle,
    SourceRequest,
};

pub struct DeviceOutput {
    mixer: MixerOutput,
    stop_tx: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl DeviceOutput {
    /// Open the default output device at its default format
    pub fn open_default() -> PlaybackResult<Self> {
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<PlaybackResult<MixerOutput>>(1);
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);

        let handle = std::thread::Builder::new()
            .name("df-device".into())
            .spawn(move || {
                let stream = match build_stream() {
                    Ok((stream, mixer)) => {
                        let _ = ready_tx.send(Ok(mixer));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                // Runs until a stop message or the sender is dropped
                let _ = stop_rx.recv();
                drop(stream);
                log::info!("Device stream stopped");
            })
            .map_err(|e| PlaybackError::Driver(e.to_string()))?;

        let opened = ready_rx
            .recv()
            .map_err(|_| PlaybackError::OutputUnavailable("device thread exited".into()));
        let mixer = match opened.and_then(|result| result) {
            Ok(mixer) => mixer,
            Err(e) => {
                let _ = handle.join();
                return Err(e);
            }
        };

        Ok(Self {
            mixer,
            stop_tx,
            handle: Some(handle),
        })
    }

    /// Mixer fed to the device
    pub fn mixer(&self) -> &MixerOutput {
        &self.mixer
    }
}

fn build_stream() -> PlaybackResult<(cpal::Stream, MixerOutput)> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| PlaybackError::OutputUnavailable("no default output device".into()))?;
    let config = device
        .default_output_config()
        .map_err(|e| PlaybackError::OutputUnavailable(format!("no output config: {}", e)))?;

    let sample_rate = config.sample_rate().0;
    let channels = config.channels() as usize;
    log::info!("Starting device stream: {} Hz, {} channels", sample_rate, channels);

    let mixer = MixerOutput::new(sample_rate, channels);
    let source = mixer.clone();
    let stream = device
        .build_output_stream(
            &config.into(),
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| source.render(data),
            |err| log::error!("Device stream error: {}", err),
            None,
        )
        .map_err(|e| PlaybackError::OutputUnavailable(format!("failed to build stream: {}", e)))?;
    stream
        .play()
        .map_err(|e| PlaybackError::OutputUnavailable(format!("failed to start stream: {}", e)))?;

    Ok((stream, mixer))
}

impl AudioOutput for DeviceOutput {
    fn clock(&self) -> Arc<dyn AudioClock> {
        self.mixer.clock()
    }

    fn slot(&self) -> Arc<OutputSlot> {
        self.mixer.slot()
    }

    fn start_source(&mut self, request: SourceRequest) -> PlaybackResult<SourceHandle> {
        self.mixer.start_source(request)
    }

    fn stop_source(&mut self, handle: SourceHandle) {
        self.mixer.stop_source(handle);
    }

    fn drain_finished(&mut self) -> Vec<SourceHandle> {
        self.mixer.drain_finished()
    }
}

impl Drop for DeviceOutput {
    fn drop(&mut self) {
        let _ = self.stop_tx.try_send(());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("Device stream thread panicked");
            }
        }
    }
}
