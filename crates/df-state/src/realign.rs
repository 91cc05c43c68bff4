//! Realignment engine
//!
//! ```text
//! master:   |--- a ---|--- b ---|-- (skip c) --|--- d ---|
//! markers:            3.0       7.0
//! ```
//!
//! Non-skipped mapped lines take the segments between consecutive markers in
//! recording order; skipped lines are cleared. A windowed recalibration only
//! touches the listed lines and only the markers inside the window's span.
//! The listed lines must be one contiguous run, and the window must start and
//! end on the edges of the segments those lines currently own, so the source
//! keeps one segment per non-skipped line after the merge.

use std::collections::HashSet;
use std::sync::Arc;

use df_core::{AudioRef, BitDepth, LineId, SamplePosition};
use df_file::{
    AudioData, FileError, MappedLineEntry, MasterSourceEntry, decode_audio, encode_wav,
};

use crate::{
    EncodedSegment, MARKER_EPSILON, RealignError, RealignResult, SegmentAssignment, SegmentCommit,
    SegmentStore, merge_window_markers, normalize_markers, segment_bounds,
};

/// A local recalibration: the listed lines, cut from `start..end` of the recording
#[derive(Debug, Clone, PartialEq)]
pub struct RealignWindow {
    pub line_ids: Vec<LineId>,
    pub start: f64,
    pub end: f64,
}

/// Planned or committed audio of one line
#[derive(Debug, Clone, PartialEq)]
pub struct LineSegment {
    pub line_id: LineId,
    /// Span of the recording (seconds); `None` for a skipped line
    pub span: Option<(f64, f64)>,
    /// Stored segment, once committed
    pub audio: Option<AudioRef>,
}

/// Outcome of a committed resegmentation
#[derive(Debug, Clone, PartialEq)]
pub struct Reassignment {
    pub source_id: String,
    /// Marker set now persisted for the source
    pub markers: Vec<f64>,
    /// Affected lines in recording order
    pub lines: Vec<LineSegment>,
}

impl Reassignment {
    /// Number of segments written
    pub fn segment_count(&self) -> usize {
        self.lines.iter().filter(|l| l.span.is_some()).count()
    }
}

struct Plan {
    master: AudioData,
    markers: Vec<f64>,
    persisted: Vec<f64>,
    lines: Vec<LineSegment>,
}

pub struct RealignmentEngine {
    store: Arc<dyn SegmentStore>,
    bit_depth: BitDepth,
}

impl RealignmentEngine {
    pub fn new(store: Arc<dyn SegmentStore>) -> Self {
        Self {
            store,
            bit_depth: BitDepth::Int16,
        }
    }

    /// Sample format of written segments
    pub fn with_bit_depth(mut self, bit_depth: BitDepth) -> Self {
        self.bit_depth = bit_depth;
        self
    }

    /// Validate and compute the new segment spans without storing anything
    pub fn preview(
        &self,
        source_id: &str,
        markers: &[f64],
        window: Option<&RealignWindow>,
    ) -> RealignResult<Vec<LineSegment>> {
        Ok(self.plan(source_id, markers, window)?.lines)
    }

    /// Re-slice a master recording and reassign its segments in one commit
    pub fn resegment(
        &self,
        source_id: &str,
        markers: &[f64],
        window: Option<&RealignWindow>,
    ) -> RealignResult<Reassignment> {
        let plan = self.plan(source_id, markers, window)?;

        let mut assignments = Vec::with_capacity(plan.lines.len());
        for line in &plan.lines {
            let segment = match line.span {
                Some((start, end)) => Some(self.encode_segment(&plan.master, start, end)?),
                None => None,
            };
            assignments.push(SegmentAssignment {
                line_id: line.line_id.clone(),
                segment,
            });
        }

        let committed = self.store.commit(SegmentCommit {
            source_id: source_id.to_string(),
            markers: plan.persisted.clone(),
            assignments,
        })?;

        let lines = plan
            .lines
            .into_iter()
            .zip(committed)
            .map(|(line, (_, audio))| LineSegment { audio, ..line })
            .collect::<Vec<_>>();

        log::info!(
            "Resegmented source '{}': {} markers, {} lines reassigned",
            source_id,
            plan.markers.len(),
            lines.len()
        );

        Ok(Reassignment {
            source_id: source_id.to_string(),
            markers: plan.persisted,
            lines,
        })
    }

    fn plan(
        &self,
        source_id: &str,
        markers: &[f64],
        window: Option<&RealignWindow>,
    ) -> RealignResult<Plan> {
        let source = self.store.source(source_id)?;
        let bytes = self.store.master_audio(&source.audio)?;
        let master = decode_audio(&bytes)?;
        let duration = master.duration();
        if duration <= 0.0 {
            return Err(RealignError::File(FileError::InvalidFile(format!(
                "master recording '{}' is empty",
                source.audio
            ))));
        }

        let (lines, start, end) = match window {
            Some(window) => {
                let (first, lines) = window_lines(&source.lines, window)?;
                let (start, end) = window_edges(&source, first, &lines, window, duration)?;
                (lines, start, end)
            }
            None => (source.lines.clone(), 0.0, duration),
        };
        if !(start.is_finite() && end.is_finite() && 0.0 <= start && start < end && end <= duration) {
            return Err(RealignError::InvalidWindow(format!(
                "span {:.6}s..{:.6}s does not fit a {:.6}s recording",
                start, end, duration
            )));
        }

        let markers = normalize_markers(markers, start, end).inspect_err(|e| {
            log::warn!("Rejected markers for source '{}': {}", source_id, e);
        })?;

        let expected = lines.iter().filter(|l| !l.skip).count();
        let actual = markers.len() + 1;
        if expected != actual {
            log::warn!(
                "Resegment of '{}' refused: {} lines, {} segments",
                source_id,
                expected,
                actual
            );
            return Err(RealignError::SegmentCountMismatch { expected, actual });
        }

        let mut spans = segment_bounds(&markers, start, end).into_iter();
        let lines = lines
            .into_iter()
            .map(|line| LineSegment {
                span: if line.skip { None } else { spans.next() },
                line_id: line.line_id,
                audio: None,
            })
            .collect();

        let persisted = match window {
            Some(_) => merge_window_markers(&source.markers, start, end, &markers),
            None => markers.clone(),
        };

        Ok(Plan {
            master,
            markers,
            persisted,
            lines,
        })
    }

    fn encode_segment(&self, master: &AudioData, start: f64, end: f64) -> RealignResult<EncodedSegment> {
        let rate = master.sample_rate;
        let frames = master.num_frames();
        let from = (SamplePosition::from_seconds(start, rate).0 as usize).min(frames);
        let to = (SamplePosition::from_seconds(end, rate).0 as usize).clamp(from, frames);

        let slice = master.slice_frames(from, to);
        Ok(EncodedSegment {
            bytes: encode_wav(&slice, self.bit_depth)?,
            duration: slice.duration(),
        })
    }
}

/// Mapped lines named by the window, in recording order, with the index of the first
fn window_lines(
    mapped: &[MappedLineEntry],
    window: &RealignWindow,
) -> RealignResult<(usize, Vec<MappedLineEntry>)> {
    if window.line_ids.is_empty() {
        return Err(RealignError::InvalidWindow("no lines in window".into()));
    }

    let wanted: HashSet<&str> = window.line_ids.iter().map(String::as_str).collect();
    if let Some(unknown) = wanted.iter().find(|id| !mapped.iter().any(|l| l.line_id == **id)) {
        return Err(RealignError::InvalidWindow(format!(
            "line '{}' is not mapped to this source",
            unknown
        )));
    }

    let positions: Vec<usize> = mapped
        .iter()
        .enumerate()
        .filter(|(_, l)| wanted.contains(l.line_id.as_str()))
        .map(|(i, _)| i)
        .collect();
    let (first, last) = match (positions.first(), positions.last()) {
        (Some(&first), Some(&last)) => (first, last),
        _ => return Err(RealignError::InvalidWindow("no lines in window".into())),
    };
    if last - first + 1 != positions.len() {
        return Err(RealignError::InvalidWindow(format!(
            "lines '{}'..'{}' are not contiguous in the recording",
            mapped[first].line_id, mapped[last].line_id
        )));
    }

    Ok((first, mapped[first..=last].to_vec()))
}

/// Snap the window span to the persisted segment edges of its lines
///
/// The run starting at mapped index `first` owns segments `i..i + k`, where `i`
/// counts the non-skipped lines before it and `k` those inside it. The window
/// must start on edge `i` and end on edge `i + k`.
fn window_edges(
    source: &MasterSourceEntry,
    first: usize,
    run: &[MappedLineEntry],
    window: &RealignWindow,
    duration: f64,
) -> RealignResult<(f64, f64)> {
    let voiced = source.lines.iter().filter(|l| !l.skip).count();
    if source.markers.len() + 1 != voiced {
        return Err(RealignError::InvalidWindow(format!(
            "source has {} markers for {} lines; resegment the whole recording first",
            source.markers.len(),
            voiced
        )));
    }

    let owned = run.iter().filter(|l| !l.skip).count();
    if owned == 0 {
        return Err(RealignError::InvalidWindow("window holds only skipped lines".into()));
    }

    let before = source.lines[..first].iter().filter(|l| !l.skip).count();
    let edges: Vec<f64> = std::iter::once(0.0)
        .chain(source.markers.iter().copied())
        .chain(std::iter::once(duration))
        .collect();
    let (start, end) = (edges[before], edges[before + owned]);

    if (window.start - start).abs() > MARKER_EPSILON || (window.end - end).abs() > MARKER_EPSILON {
        return Err(RealignError::InvalidWindow(format!(
            "span {:.6}s..{:.6}s does not match the segment edges {:.6}s..{:.6}s of its lines",
            window.start, window.end, start, end
        )));
    }
    Ok((start, end))
}
