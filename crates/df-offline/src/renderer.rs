//! Offline mix renderer
//!
//! Places every clip's PCM at exactly `round(start_time * sample_rate)` in one
//! interleaved buffer, silence elsewhere. Audio that runs past the end of the
//! timeline is cut, as it is when live playback stops at the end.

use std::sync::Arc;

use df_core::{ClipId, SamplePosition, TimelineClip, frames_for_duration};
use df_file::{AudioData, CuePoint};
use df_timeline::ClipDurationResolver;

use crate::{ExportError, ExportResult};

/// A clip that could not be loaded at render time
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedClip {
    pub clip_id: ClipId,
    pub reason: String,
}

/// Result of one offline render
#[derive(Debug, Clone)]
pub struct RenderedMix {
    /// Interleaved samples
    pub samples: Vec<f64>,
    pub sample_rate: u32,
    pub channels: usize,
    /// One per line clip, in clip order
    pub cue_points: Vec<CuePoint>,
    pub skipped: Vec<SkippedClip>,
}

impl RenderedMix {
    pub fn num_frames(&self) -> usize {
        self.samples.len() / self.channels.max(1)
    }

    pub fn duration(&self) -> f64 {
        self.num_frames() as f64 / self.sample_rate as f64
    }
}

pub struct OfflineMixRenderer<'a> {
    resolver: &'a ClipDurationResolver,
    sample_rate: u32,
    channels: usize,
    cue_label_prefix: String,
}

impl<'a> OfflineMixRenderer<'a> {
    pub fn new(resolver: &'a ClipDurationResolver, sample_rate: u32, channels: usize) -> Self {
        Self {
            resolver,
            sample_rate,
            channels,
            cue_label_prefix: String::new(),
        }
    }

    /// Cue labels become `<prefix>1`, `<prefix>2`, ...
    pub fn with_cue_label_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.cue_label_prefix = prefix.into();
        self
    }

    pub fn render(&self, clips: &[TimelineClip], total_duration: f64) -> ExportResult<RenderedMix> {
        if self.sample_rate == 0 || self.channels == 0 {
            return Err(ExportError::InvalidConfig(format!(
                "cannot render {} Hz / {} channels",
                self.sample_rate, self.channels
            )));
        }

        let total_frames = frames_for_duration(total_duration, self.sample_rate);
        if u32::try_from(total_frames).is_err() {
            return Err(ExportError::TooLong(total_duration));
        }

        let channels = self.channels;
        let mut samples = vec![0.0f64; total_frames * channels];
        let mut cue_points = Vec::new();
        let mut skipped = Vec::new();

        for clip in clips {
            let start = SamplePosition::from_seconds(clip.start_time, self.sample_rate).0 as usize;

            if clip.is_line() {
                let id = cue_points.len() as u32 + 1;
                cue_points.push(CuePoint {
                    id,
                    // Bounded by total_frames, checked above
                    sample_offset: start.min(total_frames) as u32,
                    label: format!("{}{}", self.cue_label_prefix, id),
                });
            }

            if clip.duration <= 0.0 || start >= total_frames {
                continue;
            }

            let pcm = match self.resolver.load_pcm(&clip.audio) {
                Ok(pcm) => self.conform(pcm),
                Err(reason) => {
                    log::warn!("Clip '{}' left silent in mixdown: {}", clip.id, reason);
                    skipped.push(SkippedClip {
                        clip_id: clip.id.clone(),
                        reason: reason.to_string(),
                    });
                    continue;
                }
            };

            let length = pcm
                .num_frames()
                .min(frames_for_duration(clip.duration, self.sample_rate))
                .min(total_frames - start);

            for i in 0..length {
                let dst = (start + i) * channels;
                for ch in 0..channels {
                    samples[dst + ch] += pcm.sample_for_output(i, ch, channels) as f64;
                }
            }
        }

        log::debug!(
            "Rendered {} clips into {} frames ({} cues, {} skipped)",
            clips.len(),
            total_frames,
            cue_points.len(),
            skipped.len()
        );

        Ok(RenderedMix {
            samples,
            sample_rate: self.sample_rate,
            channels,
            cue_points,
            skipped,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Full source audio of a clip in the output format
    pub fn source_audio(&self, clip: &TimelineClip) -> ExportResult<Arc<AudioData>> {
        let pcm = self
            .resolver
            .load_pcm(&clip.audio)
            .map_err(|reason| ExportError::ClipAudio {
                clip_id: clip.id.clone(),
                reason: reason.to_string(),
            })?;
        Ok(self.conform(pcm))
    }

    /// PCM of one clip in the output format, trimmed to the clip duration
    pub fn clip_audio(&self, clip: &TimelineClip) -> ExportResult<Arc<AudioData>> {
        let pcm = self.source_audio(clip)?;
        let frames = frames_for_duration(clip.duration, self.sample_rate);
        if pcm.num_frames() > frames {
            Ok(Arc::new(pcm.slice_frames(0, frames)))
        } else {
            Ok(pcm)
        }
    }

    fn conform(&self, pcm: Arc<AudioData>) -> Arc<AudioData> {
        if pcm.sample_rate == self.sample_rate && pcm.num_channels() == self.channels {
            pcm
        } else {
            Arc::new(pcm.conform(self.sample_rate, self.channels))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use df_core::{AudioBlobStore, AudioRef, BitDepth, ClipTrack, MemoryProject};
    use df_file::encode_wav;

    fn clip(id: &str, track: ClipTrack, start: f64, duration: f64) -> TimelineClip {
        TimelineClip {
            id: id.into(),
            track,
            start_time: start,
            duration,
            audio: AudioRef::new(format!("{id}.wav")),
            chapter_id: "c".into(),
            line_id: id.into(),
            character_id: None,
            line_type: None,
            sound_type: None,
            sound_id: None,
            category: None,
            label: String::new(),
        }
    }

    fn resolver(blobs: &[(&str, Vec<f32>)]) -> ClipDurationResolver {
        let mut project = MemoryProject::new();
        for (id, samples) in blobs {
            let wav = encode_wav(&AudioData::mono(samples.clone(), 10), BitDepth::Float32).unwrap();
            project.add_blob(format!("{id}.wav"), wav);
        }
        let store: Arc<dyn AudioBlobStore> = Arc::new(project);
        ClipDurationResolver::new(store)
    }

    #[test]
    fn test_places_at_rounded_frames_and_cuts_at_end() {
        let resolver = resolver(&[("a", vec![1.0, 1.0]), ("b", vec![0.5; 5])]);
        let clips = [
            clip("a", ClipTrack::Line, 0.14, 0.2),
            clip("b", ClipTrack::Sfx, 0.26, 0.5),
        ];
        let mix = OfflineMixRenderer::new(&resolver, 10, 1)
            .render(&clips, 0.5)
            .unwrap();

        assert_eq!(mix.samples, vec![0.0, 1.0, 1.0, 0.5, 0.5]);
        assert_eq!(mix.cue_points.len(), 1);
        assert_eq!(mix.cue_points[0].sample_offset, 1);
        assert_eq!(mix.cue_points[0].label, "1");
    }

    #[test]
    fn test_clip_duration_limits_samples() {
        let resolver = resolver(&[("a", vec![1.0; 4])]);
        let clips = [clip("a", ClipTrack::Line, 0.0, 0.2)];
        let mix = OfflineMixRenderer::new(&resolver, 10, 1)
            .render(&clips, 0.4)
            .unwrap();
        assert_eq!(mix.samples, vec![1.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_missing_audio_skipped_but_cued() {
        let resolver = resolver(&[]);
        let clips = [clip("gone", ClipTrack::Line, 0.1, 0.1)];
        let mix = OfflineMixRenderer::new(&resolver, 10, 2)
            .with_cue_label_prefix("L")
            .render(&clips, 0.3)
            .unwrap();

        assert_eq!(mix.samples, vec![0.0; 6]);
        assert_eq!(mix.skipped.len(), 1);
        assert_eq!(mix.cue_points[0].label, "L1");
    }

    #[test]
    fn test_stereo_output_from_mono_source() {
        let resolver = resolver(&[("a", vec![0.25])]);
        let clips = [clip("a", ClipTrack::Line, 0.0, 0.1)];
        let mix = OfflineMixRenderer::new(&resolver, 10, 2)
            .render(&clips, 0.2)
            .unwrap();
        assert_eq!(mix.samples, vec![0.25, 0.25, 0.0, 0.0]);
        assert_eq!(mix.num_frames(), 2);
    }
}
