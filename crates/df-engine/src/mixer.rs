//! Software output graph
//!
//! An in-process [`AudioOutput`] that mixes started sources into interleaved
//! blocks on demand. A host audio callback (or a test) pulls blocks with
//! [`MixerOutput::render`]; the mixer's clock is the number of frames pulled.
//! With the `device` feature, `DeviceOutput` runs that callback on the
//! default cpal device. Without a pulling callback the clock stands still.
//!
//! Sources are conformed to the mixer format with [`AudioData::conform`] and
//! placed at `round(when * sample_rate)`, the same rule the offline renderer
//! uses, so a scheduled run and an export produce the same samples.

use std::sync::Arc;

use df_core::{ClipId, SamplePosition};
use df_file::AudioData;
use parking_lot::Mutex;

use crate::{AudioClock, AudioOutput, OutputSlot, PlaybackResult, SourceHandle, SourceRequest};

struct Voice {
    handle: SourceHandle,
    clip_id: ClipId,
    audio: Arc<AudioData>,
    /// Output frame of the first sample
    start_frame: u64,
    /// First source frame played
    offset_frame: usize,
    /// Frames to play
    length: usize,
}

impl Voice {
    fn end_frame(&self) -> u64 {
        self.start_frame + self.length as u64
    }
}

struct MixerState {
    frames_rendered: u64,
    voices: Vec<Voice>,
    finished: Vec<SourceHandle>,
    next_id: u64,
}

/// Cloneable handle to one software mixer
#[derive(Clone)]
pub struct MixerOutput {
    sample_rate: u32,
    channels: usize,
    state: Arc<Mutex<MixerState>>,
    clock: Arc<MixerClock>,
    slot: Arc<OutputSlot>,
}

/// Frames rendered so far, in seconds
pub struct MixerClock {
    sample_rate: u32,
    state: Arc<Mutex<MixerState>>,
}

impl AudioClock for MixerClock {
    fn now(&self) -> f64 {
        SamplePosition(self.state.lock().frames_rendered).to_seconds(self.sample_rate)
    }
}

impl MixerOutput {
    /// Mixer bound to the process-wide output slot
    pub fn new(sample_rate: u32, channels: usize) -> Self {
        Self::with_slot(sample_rate, channels, OutputSlot::process_default())
    }

    pub fn with_slot(sample_rate: u32, channels: usize, slot: Arc<OutputSlot>) -> Self {
        let state = Arc::new(Mutex::new(MixerState {
            frames_rendered: 0,
            voices: Vec::new(),
            finished: Vec::new(),
            next_id: 1,
        }));
        Self {
            sample_rate: sample_rate.max(1),
            channels: channels.max(1),
            clock: Arc::new(MixerClock {
                sample_rate: sample_rate.max(1),
                state: Arc::clone(&state),
            }),
            state,
            slot,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn frames_rendered(&self) -> u64 {
        self.state.lock().frames_rendered
    }

    pub fn active_voices(&self) -> usize {
        self.state.lock().voices.len()
    }

    /// Clip ids currently sounding or waiting to start
    pub fn active_clips(&self) -> Vec<ClipId> {
        self.state.lock().voices.iter().map(|v| v.clip_id.clone()).collect()
    }

    /// Mix the next block into `out` (interleaved, overwritten)
    ///
    /// `out.len()` should be a multiple of the channel count; a trailing
    /// partial frame is zeroed and not counted.
    pub fn render(&self, out: &mut [f32]) {
        out.fill(0.0);
        let frames = out.len() / self.channels;
        let mut state = self.state.lock();
        let block_start = state.frames_rendered;
        let block_end = block_start + frames as u64;

        for voice in &state.voices {
            let from = voice.start_frame.max(block_start);
            let to = voice.end_frame().min(block_end);
            if from >= to {
                continue;
            }
            for frame in from..to {
                let src = voice.offset_frame + (frame - voice.start_frame) as usize;
                let dst = (frame - block_start) as usize * self.channels;
                for ch in 0..self.channels {
                    out[dst + ch] += voice.audio.sample_for_output(src, ch, self.channels);
                }
            }
        }

        state.frames_rendered = block_end;

        let (done, playing): (Vec<Voice>, Vec<Voice>) = std::mem::take(&mut state.voices)
            .into_iter()
            .partition(|v| v.end_frame() <= block_end);
        state.voices = playing;
        state.finished.extend(done.into_iter().map(|v| v.handle));
    }

    /// Render `frames` frames into a new interleaved buffer
    pub fn render_frames(&self, frames: usize) -> Vec<f32> {
        let mut block = vec![0.0; frames * self.channels];
        self.render(&mut block);
        block
    }
}

impl AudioOutput for MixerOutput {
    fn clock(&self) -> Arc<dyn AudioClock> {
        self.clock.clone()
    }

    fn slot(&self) -> Arc<OutputSlot> {
        Arc::clone(&self.slot)
    }

    fn start_source(&mut self, request: SourceRequest) -> PlaybackResult<SourceHandle> {
        let audio = if request.audio.sample_rate == self.sample_rate
            && request.audio.num_channels() == self.channels
        {
            request.audio
        } else {
            Arc::new(request.audio.conform(self.sample_rate, self.channels))
        };

        let offset_frame = SamplePosition::from_seconds(request.offset, self.sample_rate).0 as usize;
        let available = audio.num_frames().saturating_sub(offset_frame);
        let length = (SamplePosition::from_seconds(request.duration, self.sample_rate).0 as usize)
            .min(available);

        let mut state = self.state.lock();
        let handle = SourceHandle {
            id: state.next_id,
            generation: request.generation,
        };
        state.next_id += 1;

        // Late requests start immediately
        let start_frame = SamplePosition::from_seconds(request.when, self.sample_rate)
            .0
            .max(state.frames_rendered);

        if length == 0 {
            state.finished.push(handle);
        } else {
            state.voices.push(Voice {
                handle,
                clip_id: request.clip_id,
                audio,
                start_frame,
                offset_frame,
                length,
            });
        }
        Ok(handle)
    }

    fn stop_source(&mut self, handle: SourceHandle) {
        let mut state = self.state.lock();
        state.voices.retain(|v| v.handle != handle);
        state.finished.retain(|h| *h != handle);
    }

    fn drain_finished(&mut self) -> Vec<SourceHandle> {
        std::mem::take(&mut self.state.lock().finished)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mixer() -> MixerOutput {
        MixerOutput::with_slot(10, 1, OutputSlot::new("mixer-test"))
    }

    fn request(samples: Vec<f32>, when: f64, offset: f64, duration: f64) -> SourceRequest {
        SourceRequest {
            clip_id: "c".into(),
            audio: Arc::new(AudioData::mono(samples, 10)),
            when,
            offset,
            duration,
            generation: 7,
        }
    }

    #[test]
    fn test_places_source_at_rounded_frame() {
        let mut mixer = mixer();
        mixer.start_source(request(vec![1.0, 2.0], 0.26, 0.0, 0.2)).unwrap();

        let out = mixer.render_frames(6);
        assert_eq!(out, vec![0.0, 0.0, 0.0, 1.0, 2.0, 0.0]);
    }

    #[test]
    fn test_offset_and_duration() {
        let mut mixer = mixer();
        mixer
            .start_source(request(vec![1.0, 2.0, 3.0, 4.0], 0.0, 0.1, 0.2))
            .unwrap();
        assert_eq!(mixer.render_frames(4), vec![2.0, 3.0, 0.0, 0.0]);
    }

    #[test]
    fn test_voice_spanning_blocks_reports_finish() {
        let mut mixer = mixer();
        let handle = mixer
            .start_source(request(vec![1.0, 1.0, 1.0], 0.1, 0.0, 0.3))
            .unwrap();
        assert_eq!(handle.generation, 7);

        assert_eq!(mixer.render_frames(2), vec![0.0, 1.0]);
        assert!(mixer.drain_finished().is_empty());
        assert_eq!(mixer.render_frames(3), vec![1.0, 1.0, 0.0]);
        assert_eq!(mixer.drain_finished(), vec![handle]);
        assert_eq!(mixer.active_voices(), 0);
    }

    #[test]
    fn test_stopped_source_never_finishes() {
        let mut mixer = mixer();
        let handle = mixer.start_source(request(vec![1.0], 0.0, 0.0, 0.1)).unwrap();
        mixer.stop_source(handle);
        assert_eq!(mixer.render_frames(3), vec![0.0; 3]);
        assert!(mixer.drain_finished().is_empty());
    }

    #[test]
    fn test_clock_follows_rendered_frames() {
        let mixer = mixer();
        let clock = mixer.clock();
        assert_eq!(clock.now(), 0.0);
        mixer.render_frames(5);
        assert!((clock.now() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_late_source_starts_immediately() {
        let mut mixer = mixer();
        mixer.render_frames(4);
        mixer.start_source(request(vec![5.0], 0.1, 0.0, 0.1)).unwrap();
        assert_eq!(mixer.render_frames(2), vec![5.0, 0.0]);
    }

    #[test]
    fn test_mono_source_fills_stereo_output() {
        let mut mixer = MixerOutput::with_slot(10, 2, OutputSlot::new("stereo"));
        mixer.start_source(request(vec![0.5], 0.0, 0.0, 0.1)).unwrap();
        assert_eq!(mixer.render_frames(1), vec![0.5, 0.5]);
    }
}
