//! Audio blob decoding and encoding
//!
//! Blobs arrive as opaque bytes from the audio store. WAV goes through hound,
//! everything else through symphonia's probe.

use std::io::Cursor;

use df_core::BitDepth;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CODEC_TYPE_NULL, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::{FileError, FileResult};

// ═══════════════════════════════════════════════════════════════════════════════
// AUDIO DATA CONTAINER
// ═══════════════════════════════════════════════════════════════════════════════

/// Decoded PCM (deinterleaved, one Vec per channel, normalized -1.0..1.0)
#[derive(Debug, Clone, PartialEq)]
pub struct AudioData {
    pub channels: Vec<Vec<f32>>,
    pub sample_rate: u32,
}

impl AudioData {
    /// Silent buffer
    pub fn new(num_channels: usize, num_frames: usize, sample_rate: u32) -> Self {
        Self {
            channels: vec![vec![0.0; num_frames]; num_channels],
            sample_rate,
        }
    }

    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            channels: vec![samples],
            sample_rate,
        }
    }

    /// Create from interleaved samples
    pub fn from_interleaved(samples: &[f32], num_channels: usize, sample_rate: u32) -> Self {
        let num_channels = num_channels.max(1);
        let num_frames = samples.len() / num_channels;
        let mut channels = vec![Vec::with_capacity(num_frames); num_channels];

        for chunk in samples.chunks_exact(num_channels) {
            for (ch, &sample) in chunk.iter().enumerate() {
                channels[ch].push(sample);
            }
        }

        Self {
            channels,
            sample_rate,
        }
    }

    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    pub fn num_frames(&self) -> usize {
        self.channels.first().map(|c| c.len()).unwrap_or(0)
    }

    /// Duration in seconds
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.num_frames() as f64 / self.sample_rate as f64
    }

    /// Approximate heap size, used for cache accounting
    pub fn size_bytes(&self) -> usize {
        self.num_channels() * self.num_frames() * std::mem::size_of::<f32>()
    }

    /// Copy of frames `[start, end)`, clamped to the buffer
    pub fn slice_frames(&self, start: usize, end: usize) -> Self {
        let frames = self.num_frames();
        let start = start.min(frames);
        let end = end.clamp(start, frames);
        Self {
            channels: self.channels.iter().map(|c| c[start..end].to_vec()).collect(),
            sample_rate: self.sample_rate,
        }
    }

    /// Sample for output channel `out_ch` of an `out_channels`-wide layout
    ///
    /// Mono sources feed every output channel, a mono output averages all
    /// source channels, and output channels beyond the source stay silent.
    #[inline]
    pub fn sample_for_output(&self, frame: usize, out_ch: usize, out_channels: usize) -> f32 {
        let src_channels = self.num_channels();
        if src_channels == 0 {
            return 0.0;
        }
        if src_channels == 1 {
            return self.channels[0][frame];
        }
        if out_channels == 1 {
            let sum: f32 = self.channels.iter().map(|c| c[frame]).sum();
            return sum / src_channels as f32;
        }
        self.channels.get(out_ch).map(|c| c[frame]).unwrap_or(0.0)
    }

    /// Conform to the output format (sample rate and channel layout)
    ///
    /// Both the live mixer and the offline renderer place audio through this
    /// function, so they produce identical samples for the same clip.
    pub fn conform(&self, sample_rate: u32, channels: usize) -> Self {
        let channels = channels.max(1);
        let resampled;
        let source = if self.sample_rate == sample_rate || self.sample_rate == 0 {
            self
        } else {
            resampled = self.resample_linear(sample_rate);
            &resampled
        };

        let frames = source.num_frames();
        let mut out = Self::new(channels, frames, sample_rate);
        for (ch, out_ch) in out.channels.iter_mut().enumerate() {
            for (frame, sample) in out_ch.iter_mut().enumerate() {
                *sample = source.sample_for_output(frame, ch, channels);
            }
        }
        out
    }

    /// Linear-interpolation sample rate conversion
    pub fn resample_linear(&self, target_rate: u32) -> Self {
        if self.sample_rate == target_rate || self.sample_rate == 0 || target_rate == 0 {
            return Self {
                channels: self.channels.clone(),
                sample_rate: if target_rate == 0 { self.sample_rate } else { target_rate },
            };
        }

        let in_frames = self.num_frames();
        let ratio = self.sample_rate as f64 / target_rate as f64;
        let out_frames = (in_frames as f64 / ratio).round() as usize;

        let channels = self
            .channels
            .iter()
            .map(|input| {
                (0..out_frames)
                    .map(|i| {
                        let pos = i as f64 * ratio;
                        let idx = pos as usize;
                        let frac = (pos - idx as f64) as f32;
                        let a = input.get(idx).copied().unwrap_or(0.0);
                        let b = input.get(idx + 1).copied().unwrap_or(a);
                        a + (b - a) * frac
                    })
                    .collect()
            })
            .collect();

        Self {
            channels,
            sample_rate: target_rate,
        }
    }

    /// Interleaved copy
    pub fn to_interleaved(&self) -> Vec<f32> {
        let frames = self.num_frames();
        let mut interleaved = Vec::with_capacity(frames * self.num_channels());
        for i in 0..frames {
            for ch in &self.channels {
                interleaved.push(ch[i]);
            }
        }
        interleaved
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// FORMAT DETECTION
// ═══════════════════════════════════════════════════════════════════════════════

/// RIFF/WAVE magic check
pub fn is_wav(bytes: &[u8]) -> bool {
    bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WAVE"
}

// ═══════════════════════════════════════════════════════════════════════════════
// DECODING
// ═══════════════════════════════════════════════════════════════════════════════

/// Decode a complete blob to PCM
pub fn decode_audio(bytes: &[u8]) -> FileResult<AudioData> {
    if is_wav(bytes) {
        match decode_wav(bytes) {
            Ok(data) => return Ok(data),
            Err(e) => log::debug!("hound rejected WAV blob ({}), trying symphonia", e),
        }
    }
    decode_with_symphonia(bytes)
}

fn decode_wav(bytes: &[u8]) -> FileResult<AudioData> {
    let reader = hound::WavReader::new(bytes)?;
    let spec = reader.spec();
    let num_channels = spec.channels.max(1) as usize;

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<Result<Vec<f32>, hound::Error>>()?,
        hound::SampleFormat::Int => {
            let max_value = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max_value))
                .collect::<Result<Vec<f32>, hound::Error>>()?
        }
    };

    Ok(AudioData::from_interleaved(&samples, num_channels, spec.sample_rate))
}

fn probe(bytes: &[u8]) -> FileResult<symphonia::core::probe::ProbeResult> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes.to_vec())), Default::default());
    symphonia::default::get_probe()
        .format(
            &Hint::new(),
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| FileError::UnsupportedFormat(e.to_string()))
}

fn decode_with_symphonia(bytes: &[u8]) -> FileResult<AudioData> {
    let mut format = probe(bytes)?.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| FileError::InvalidFile("No audio track found".to_string()))?;

    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);
    let mut num_channels = track.codec_params.channels.map(|c| c.count()).unwrap_or(0);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| FileError::DecodeError(e.to_string()))?;

    let mut interleaved: Vec<f32> = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(FileError::DecodeError(e.to_string())),
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                sample_rate = spec.rate;
                num_channels = spec.channels.count();

                let buf = sample_buf.get_or_insert_with(|| {
                    SampleBuffer::<f32>::new(decoded.capacity() as u64, spec)
                });
                if buf.capacity() < decoded.capacity() * num_channels {
                    *buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                }
                buf.copy_interleaved_ref(decoded);
                interleaved.extend_from_slice(buf.samples());
            }
            // Corrupt packets are skipped
            Err(SymphoniaError::DecodeError(_)) => continue,
            Err(e) => return Err(FileError::DecodeError(e.to_string())),
        }
    }

    if sample_rate == 0 || num_channels == 0 {
        return Err(FileError::DecodeError("stream has no decodable audio".into()));
    }

    Ok(AudioData::from_interleaved(&interleaved, num_channels, sample_rate))
}

/// Read the duration from container metadata without decoding samples
pub fn probe_duration(bytes: &[u8]) -> FileResult<f64> {
    if is_wav(bytes) {
        if let Ok(reader) = hound::WavReader::new(bytes) {
            let spec = reader.spec();
            if spec.sample_rate > 0 {
                return Ok(reader.duration() as f64 / spec.sample_rate as f64);
            }
        }
    }

    let probed = probe(bytes)?;
    let track = probed
        .format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| FileError::InvalidFile("No audio track found".to_string()))?;

    match (track.codec_params.n_frames, track.codec_params.sample_rate) {
        (Some(frames), Some(rate)) if rate > 0 => Ok(frames as f64 / rate as f64),
        _ => Err(FileError::DecodeError(
            "duration not present in container metadata".into(),
        )),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ENCODING
// ═══════════════════════════════════════════════════════════════════════════════

/// Encode PCM to an in-memory WAV file using hound
pub fn encode_wav(data: &AudioData, bit_depth: BitDepth) -> FileResult<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: data.num_channels().max(1) as u16,
        sample_rate: data.sample_rate,
        bits_per_sample: bit_depth.bits(),
        sample_format: if bit_depth.is_float() {
            hound::SampleFormat::Float
        } else {
            hound::SampleFormat::Int
        },
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        for i in 0..data.num_frames() {
            for ch in &data.channels {
                let sample = ch[i];
                match bit_depth {
                    BitDepth::Float32 => writer.write_sample(sample)?,
                    BitDepth::Int16 => writer.write_sample(quantize_i16(sample as f64))?,
                    BitDepth::Int24 => writer.write_sample(quantize_i24(sample as f64))?,
                }
            }
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

#[inline]
pub(crate) fn quantize_i16(sample: f64) -> i16 {
    (sample.clamp(-1.0, 1.0) * 32767.0).round() as i16
}

#[inline]
pub(crate) fn quantize_i24(sample: f64) -> i32 {
    (sample.clamp(-1.0, 1.0) * 8388607.0).round() as i32
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// One-channel sine at 440 Hz
    pub(crate) fn sine(frames: usize, sample_rate: u32) -> AudioData {
        let samples = (0..frames)
            .map(|i| (i as f32 * 440.0 * 2.0 * std::f32::consts::PI / sample_rate as f32).sin() * 0.5)
            .collect();
        AudioData::mono(samples, sample_rate)
    }

    #[test]
    fn test_interleave_deinterleave() {
        let interleaved = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let data = AudioData::from_interleaved(&interleaved, 2, 48000);

        assert_eq!(data.num_channels(), 2);
        assert_eq!(data.num_frames(), 3);
        assert_eq!(data.channels[0], vec![1.0, 3.0, 5.0]);
        assert_eq!(data.to_interleaved(), interleaved);
    }

    #[test]
    fn test_wav_encode_decode_and_probe() {
        let data = sine(24000, 48000);
        let bytes = encode_wav(&data, BitDepth::Int16).unwrap();

        assert!(is_wav(&bytes));
        assert!((probe_duration(&bytes).unwrap() - 0.5).abs() < 1e-9);

        let decoded = decode_audio(&bytes).unwrap();
        assert_eq!(decoded.sample_rate, 48000);
        assert_eq!(decoded.num_frames(), 24000);
        for (a, b) in decoded.channels[0].iter().zip(&data.channels[0]) {
            assert!((a - b).abs() < 1e-4);
        }
    }

    #[test]
    fn test_float_wav_is_lossless() {
        let data = AudioData::from_interleaved(&[0.25, -0.5, 0.125, 1.0], 2, 22050);
        let bytes = encode_wav(&data, BitDepth::Float32).unwrap();
        assert_eq!(decode_audio(&bytes).unwrap(), data);
    }

    #[test]
    fn test_garbage_fails_to_decode_and_probe() {
        let bytes = b"definitely not audio".to_vec();
        assert!(decode_audio(&bytes).is_err());
        assert!(probe_duration(&bytes).is_err());
    }

    #[test]
    fn test_slice_frames_clamps() {
        let data = AudioData::mono((0..10).map(|i| i as f32).collect(), 10);
        assert_eq!(data.slice_frames(3, 6).channels[0], vec![3.0, 4.0, 5.0]);
        assert_eq!(data.slice_frames(8, 100).num_frames(), 2);
        assert_eq!(data.slice_frames(20, 30).num_frames(), 0);
    }

    #[test]
    fn test_conform_mono_to_stereo() {
        let data = AudioData::mono(vec![0.1, 0.2], 48000);
        let out = data.conform(48000, 2);
        assert_eq!(out.channels, vec![vec![0.1, 0.2], vec![0.1, 0.2]]);
    }

    #[test]
    fn test_conform_stereo_to_mono_averages() {
        let data = AudioData::from_interleaved(&[1.0, 0.0, 0.0, 1.0], 2, 48000);
        let out = data.conform(48000, 1);
        assert_eq!(out.channels, vec![vec![0.5, 0.5]]);
    }

    #[test]
    fn test_resample_length_and_values() {
        let data = AudioData::mono(vec![0.0, 1.0, 2.0, 3.0], 24000);
        let out = data.resample_linear(48000);
        assert_eq!(out.sample_rate, 48000);
        assert_eq!(out.num_frames(), 8);
        assert!((out.channels[0][1] - 0.5).abs() < 1e-6);
        assert!((out.channels[0][2] - 1.0).abs() < 1e-6);
    }
}
