//! Clip duration resolution
//!
//! Layout only needs durations, so the resolver probes container metadata
//! first and decodes only when the probe fails. Full PCM is loaded on demand
//! for playback and export through the shared [`AudioCache`].

use std::collections::HashMap;
use std::sync::Arc;

use df_core::{AudioBlobStore, AudioRef, SoundLibraryItem};
use df_file::{AudioData, decode_audio, probe_duration};
use parking_lot::RwLock;

use crate::{AudioCache, FailureReason};

pub struct ClipDurationResolver {
    blobs: Arc<dyn AudioBlobStore>,
    cache: Arc<AudioCache>,
    /// Durations already measured, by audio reference
    durations: RwLock<HashMap<AudioRef, f64>>,
}

impl ClipDurationResolver {
    pub fn new(blobs: Arc<dyn AudioBlobStore>) -> Self {
        Self::with_cache(blobs, Arc::new(AudioCache::new()))
    }

    pub fn with_cache(blobs: Arc<dyn AudioBlobStore>, cache: Arc<AudioCache>) -> Self {
        Self {
            blobs,
            cache,
            durations: RwLock::new(HashMap::new()),
        }
    }

    pub fn cache(&self) -> &Arc<AudioCache> {
        &self.cache
    }

    /// Duration of a blob in seconds
    ///
    /// Fails when the blob is missing, undecodable, or has no samples.
    pub fn resolve_duration(&self, audio: &AudioRef) -> Result<f64, FailureReason> {
        if let Some(&duration) = self.durations.read().get(audio) {
            return Ok(duration);
        }

        let duration = match self.cache.get(audio) {
            Some(pcm) => pcm.duration(),
            None => {
                let bytes = self.blobs.audio_blob(audio)?;
                match probe_duration(&bytes) {
                    Ok(duration) => duration,
                    Err(e) => {
                        log::debug!("Probe failed for '{}' ({}), decoding", audio, e);
                        self.decode_into_cache(audio, &bytes)?.duration()
                    }
                }
            }
        };

        if !(duration.is_finite() && duration > 0.0) {
            return Err(FailureReason::EmptyAudio);
        }

        self.durations.write().insert(audio.clone(), duration);
        Ok(duration)
    }

    /// Duration of a library sound, trusting a positive duration hint
    pub fn resolve_sound_duration(&self, item: &SoundLibraryItem) -> Result<f64, FailureReason> {
        match item.duration_hint {
            Some(hint) if hint.is_finite() && hint > 0.0 => Ok(hint),
            _ => self.resolve_duration(&item.audio),
        }
    }

    /// Decoded PCM for playback or mixing
    pub fn load_pcm(&self, audio: &AudioRef) -> Result<Arc<AudioData>, FailureReason> {
        if let Some(pcm) = self.cache.get(audio) {
            return Ok(pcm);
        }
        let bytes = self.blobs.audio_blob(audio)?;
        self.decode_into_cache(audio, &bytes)
    }

    /// Forget everything known about a blob
    pub fn invalidate(&self, audio: &AudioRef) {
        self.durations.write().remove(audio);
        self.cache.invalidate(audio);
    }

    fn decode_into_cache(
        &self,
        audio: &AudioRef,
        bytes: &[u8],
    ) -> Result<Arc<AudioData>, FailureReason> {
        self.cache.get_or_load(audio, || {
            let pcm = decode_audio(bytes).map_err(|e| FailureReason::Decode(e.to_string()))?;
            if pcm.num_frames() == 0 {
                return Err(FailureReason::EmptyAudio);
            }
            Ok(pcm)
        })
    }
}
