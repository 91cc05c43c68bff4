//! WAV files with embedded cue points
//!
//! Layout written by [`write_wav_with_cues`]:
//!
//! ```text
//! RIFF <size> WAVE
//!   fmt  (16 bytes, PCM or IEEE float)
//!   data (interleaved samples)
//!   cue  (count + 24-byte entries, one per cue)
//!   LIST adtl
//!     labl (cue id + NUL-terminated label), one per cue
//! ```
//!
//! hound stops reading at the end of `data`, so files stay readable by any
//! WAV decoder; [`read_cue_points`] walks the chunk list to recover the cues.

use std::collections::HashMap;
use std::io::Write;

use df_core::BitDepth;

use crate::audio_file::{quantize_i16, quantize_i24};
use crate::{FileError, FileResult};

const WAVE_FORMAT_PCM: u16 = 1;
const WAVE_FORMAT_IEEE_FLOAT: u16 = 3;
const CUE_ENTRY_SIZE: u32 = 24;

/// A sample-accurate marker inside a WAV file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CuePoint {
    /// Cue identifier (1-based, sequential)
    pub id: u32,
    /// Offset from the start of `data`, in sample frames
    pub sample_offset: u32,
    pub label: String,
}

/// Format of the PCM written into the `data` chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavLayout {
    pub sample_rate: u32,
    pub channels: u16,
    pub bit_depth: BitDepth,
}

impl WavLayout {
    fn block_align(&self) -> u16 {
        self.channels * self.bit_depth.bytes_per_sample()
    }
}

fn labl_size(label: &str) -> u32 {
    // cue id + text + NUL
    4 + label.len() as u32 + 1
}

#[inline]
fn padded(size: u32) -> u32 {
    size + (size & 1)
}

/// Write interleaved samples plus cue points as a WAV stream
pub fn write_wav_with_cues<W: Write>(
    writer: &mut W,
    samples: &[f64],
    layout: WavLayout,
    cues: &[CuePoint],
) -> FileResult<()> {
    if layout.channels == 0 || layout.sample_rate == 0 {
        return Err(FileError::EncodeError(
            "WAV layout needs at least one channel and a sample rate".into(),
        ));
    }

    let bytes_per_sample = layout.bit_depth.bytes_per_sample() as u64;
    let data_size = samples.len() as u64 * bytes_per_sample;

    let cue_chunk_size = 4 + CUE_ENTRY_SIZE as u64 * cues.len() as u64;
    let list_chunk_size: u64 = 4 + cues
        .iter()
        .map(|c| 8 + padded(labl_size(&c.label)) as u64)
        .sum::<u64>();
    let cue_section = if cues.is_empty() {
        0
    } else {
        8 + cue_chunk_size + 8 + list_chunk_size
    };

    let riff_size = 4 + (8 + 16) + (8 + data_size + (data_size & 1)) + cue_section;
    if riff_size > u32::MAX as u64 {
        return Err(FileError::EncodeError(format!(
            "export too large for a WAV container ({} bytes)",
            riff_size
        )));
    }

    let format_tag = if layout.bit_depth.is_float() {
        WAVE_FORMAT_IEEE_FLOAT
    } else {
        WAVE_FORMAT_PCM
    };
    let block_align = layout.block_align();
    let byte_rate = layout.sample_rate * block_align as u32;

    // RIFF header
    writer.write_all(b"RIFF")?;
    writer.write_all(&(riff_size as u32).to_le_bytes())?;
    writer.write_all(b"WAVE")?;

    // fmt chunk
    writer.write_all(b"fmt ")?;
    writer.write_all(&16u32.to_le_bytes())?;
    writer.write_all(&format_tag.to_le_bytes())?;
    writer.write_all(&layout.channels.to_le_bytes())?;
    writer.write_all(&layout.sample_rate.to_le_bytes())?;
    writer.write_all(&byte_rate.to_le_bytes())?;
    writer.write_all(&block_align.to_le_bytes())?;
    writer.write_all(&layout.bit_depth.bits().to_le_bytes())?;

    // data chunk
    writer.write_all(b"data")?;
    writer.write_all(&(data_size as u32).to_le_bytes())?;
    for &sample in samples {
        match layout.bit_depth {
            BitDepth::Int16 => writer.write_all(&quantize_i16(sample).to_le_bytes())?,
            BitDepth::Int24 => writer.write_all(&quantize_i24(sample).to_le_bytes()[0..3])?,
            BitDepth::Float32 => writer.write_all(&(sample as f32).to_le_bytes())?,
        }
    }
    if data_size & 1 == 1 {
        writer.write_all(&[0])?;
    }

    if !cues.is_empty() {
        // cue chunk
        writer.write_all(b"cue ")?;
        writer.write_all(&(cue_chunk_size as u32).to_le_bytes())?;
        writer.write_all(&(cues.len() as u32).to_le_bytes())?;
        for cue in cues {
            writer.write_all(&cue.id.to_le_bytes())?;
            writer.write_all(&cue.sample_offset.to_le_bytes())?; // play order position
            writer.write_all(b"data")?;
            writer.write_all(&0u32.to_le_bytes())?; // chunk start
            writer.write_all(&0u32.to_le_bytes())?; // block start
            writer.write_all(&cue.sample_offset.to_le_bytes())?;
        }

        // LIST/adtl with one labl per cue
        writer.write_all(b"LIST")?;
        writer.write_all(&(list_chunk_size as u32).to_le_bytes())?;
        writer.write_all(b"adtl")?;
        for cue in cues {
            let size = labl_size(&cue.label);
            writer.write_all(b"labl")?;
            writer.write_all(&size.to_le_bytes())?;
            writer.write_all(&cue.id.to_le_bytes())?;
            writer.write_all(cue.label.as_bytes())?;
            writer.write_all(&[0])?;
            if size & 1 == 1 {
                writer.write_all(&[0])?;
            }
        }
    }

    writer.flush()?;
    Ok(())
}

/// Convenience wrapper returning the encoded file
pub fn encode_wav_with_cues(
    samples: &[f64],
    layout: WavLayout,
    cues: &[CuePoint],
) -> FileResult<Vec<u8>> {
    let mut out = Vec::with_capacity(samples.len() * layout.bit_depth.bytes_per_sample() as usize + 1024);
    write_wav_with_cues(&mut out, samples, layout, cues)?;
    Ok(out)
}

fn read_u32(bytes: &[u8], at: usize) -> FileResult<u32> {
    bytes
        .get(at..at + 4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or_else(|| FileError::InvalidFile(format!("truncated chunk at byte {}", at)))
}

/// Cue points of a WAV file, in the order they are stored
pub fn read_cue_points(bytes: &[u8]) -> FileResult<Vec<CuePoint>> {
    if !crate::is_wav(bytes) {
        return Err(FileError::InvalidFile("not a RIFF/WAVE file".into()));
    }

    let mut offsets: Vec<(u32, u32)> = Vec::new();
    let mut labels: HashMap<u32, String> = HashMap::new();

    let mut pos = 12;
    while pos + 8 <= bytes.len() {
        let id = &bytes[pos..pos + 4];
        let size = read_u32(bytes, pos + 4)? as usize;
        let body_start = pos + 8;
        let body_end = body_start
            .checked_add(size)
            .filter(|end| *end <= bytes.len())
            .ok_or_else(|| FileError::InvalidFile("chunk runs past end of file".into()))?;
        let body = &bytes[body_start..body_end];

        match id {
            b"cue " => {
                let count = read_u32(body, 0)? as usize;
                for i in 0..count {
                    let entry = 4 + i * CUE_ENTRY_SIZE as usize;
                    let cue_id = read_u32(body, entry)?;
                    let sample_offset = read_u32(body, entry + 20)?;
                    offsets.push((cue_id, sample_offset));
                }
            }
            b"LIST" if body.len() >= 4 && &body[0..4] == b"adtl" => {
                let mut sub = 4;
                while sub + 8 <= body.len() {
                    let sub_size = read_u32(body, sub + 4)? as usize;
                    let sub_body = body
                        .get(sub + 8..sub + 8 + sub_size)
                        .ok_or_else(|| FileError::InvalidFile("truncated adtl entry".into()))?;
                    if &body[sub..sub + 4] == b"labl" && sub_body.len() >= 4 {
                        let cue_id = read_u32(sub_body, 0)?;
                        let text = &sub_body[4..];
                        let text = text.split(|b| *b == 0).next().unwrap_or_default();
                        labels.insert(cue_id, String::from_utf8_lossy(text).into_owned());
                    }
                    sub += 8 + sub_size + (sub_size & 1);
                }
            }
            _ => {}
        }

        pos = body_end + (size & 1);
    }

    Ok(offsets
        .into_iter()
        .map(|(id, sample_offset)| CuePoint {
            id,
            sample_offset,
            label: labels.remove(&id).unwrap_or_default(),
        })
        .collect())
}
