//! Lap segmentation.
//!
//! A recording is one flat run of samples. The lap-index channel says which
//! lap each sample belongs to; segmentation turns each distinct lap value into
//! a [`LapSegment`] holding that lap's slice of every channel.
//!
//! Lap `0` is the out-lap and is never emitted. Values that cannot be lap
//! numbers, and laps whose samples are interrupted by another lap, are skipped
//! and reported as [`GarageError::MalformedLap`] without stopping the rest.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::Range;
use tracing::{debug, trace, warn};

use crate::config::SegmentationConfig;
use crate::{ChannelTable, GarageError, LapTime};

/// Where a segment's lap time came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LapTimeSource {
    /// The simulator's official last-lap time, read at the start of the next lap.
    Official,
    /// Last minus first session-time sample within the lap.
    SessionTime,
    /// No usable time channel; the lap time is zero.
    Unavailable,
}

/// One lap's contiguous slice of the recording.
#[derive(Debug, Clone, PartialEq)]
pub struct LapSegment {
    pub lap_number: u32,
    /// First sample index (inclusive).
    pub start: usize,
    /// One past the last sample index.
    pub end: usize,
    pub lap_time: LapTime,
    /// `lap_time` before rounding to ten-thousandths.
    pub duration_secs: f64,
    pub time_source: LapTimeSource,
    /// Every channel restricted to `start..end`.
    pub channels: ChannelTable,
    /// Produced without a lap channel: the whole recording as lap 1.
    pub is_fallback: bool,
}

impl LapSegment {
    pub fn sample_range(&self) -> Range<usize> {
        self.start..self.end
    }

    pub fn sample_count(&self) -> usize {
        self.end - self.start
    }
}

/// Segments of one recording plus the laps that had to be skipped.
#[derive(Debug, Default)]
pub struct Segmentation {
    pub segments: Vec<LapSegment>,
    /// One [`GarageError::MalformedLap`] per skipped lap.
    pub skipped: Vec<GarageError>,
}

impl Segmentation {
    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }
}

#[derive(Debug)]
struct LapSpan {
    first: usize,
    last: usize,
    samples: usize,
}

/// Split `table` into laps.
pub fn segment_laps(table: &ChannelTable, config: &SegmentationConfig) -> Segmentation {
    if table.is_empty() {
        debug!("Recording has no samples, no laps to segment");
        return Segmentation::default();
    }

    let Some(lap_index) = table.get(&config.lap_channel) else {
        warn!(
            channel = %config.lap_channel,
            "Lap channel not found, creating single lap with all data"
        );
        return Segmentation {
            segments: vec![fallback_segment(table, config)],
            skipped: Vec::new(),
        };
    };

    // Spans in order of first occurrence; malformed values keyed by their text.
    let mut order: Vec<u32> = Vec::new();
    let mut spans: BTreeMap<u32, LapSpan> = BTreeMap::new();
    let mut malformed: Vec<String> = Vec::new();

    for (index, &value) in lap_index.iter().enumerate() {
        match lap_number(value) {
            Some(lap) => {
                let span = spans.entry(lap).or_insert_with(|| {
                    order.push(lap);
                    LapSpan { first: index, last: index, samples: 0 }
                });
                span.last = index;
                span.samples += 1;
            }
            None => {
                let text = value.to_string();
                if !malformed.contains(&text) {
                    malformed.push(text);
                }
            }
        }
    }

    let mut segmentation = Segmentation::default();
    for text in malformed {
        warn!(lap = %text, "Skipping samples with a malformed lap index");
        segmentation
            .skipped
            .push(GarageError::malformed_lap(&text, "lap index is not a non-negative integer"));
    }

    for lap in order {
        if lap == 0 {
            trace!("Skipping out-lap");
            continue;
        }
        let Some(span) = spans.get(&lap) else { continue };
        let length = span.last - span.first + 1;
        if span.samples != length {
            warn!(lap, first = span.first, last = span.last, "Skipping non-contiguous lap");
            segmentation.skipped.push(GarageError::malformed_lap(
                lap,
                format!(
                    "samples {}..={} contain {} samples of other laps",
                    span.first,
                    span.last,
                    length - span.samples
                ),
            ));
            continue;
        }

        let range = span.first..span.last + 1;
        let (duration_secs, time_source) = lap_duration(table, &range, config);
        let lap_time = LapTime::from_secs_f64(duration_secs).unwrap_or(LapTime::ZERO);
        debug!(lap, start = range.start, end = range.end, %lap_time, ?time_source, "Segmented lap");
        segmentation.segments.push(LapSegment {
            lap_number: lap,
            start: range.start,
            end: range.end,
            lap_time,
            duration_secs,
            time_source,
            channels: table.slice(range),
            is_fallback: false,
        });
    }

    segmentation
}

/// The whole recording as lap 1, timed by session time when it is recorded.
fn fallback_segment(table: &ChannelTable, config: &SegmentationConfig) -> LapSegment {
    let (duration_secs, time_source) = table
        .get(&config.session_time_channel)
        .and_then(session_time_delta)
        .map_or((0.0, LapTimeSource::Unavailable), |secs| (secs, LapTimeSource::SessionTime));
    LapSegment {
        lap_number: 1,
        start: 0,
        end: table.sample_count(),
        lap_time: LapTime::from_secs_f64(duration_secs).unwrap_or(LapTime::ZERO),
        duration_secs,
        time_source,
        channels: table.clone(),
        is_fallback: true,
    }
}

/// A lap-index value as a lap number, or `None` for NaN, negative and
/// fractional values.
pub(crate) fn lap_number(value: f64) -> Option<u32> {
    (value.is_finite() && value >= 0.0 && value.fract() == 0.0 && value <= u32::MAX as f64)
        .then_some(value as u32)
}

/// Last minus first finite session-time value. `None` with fewer than two
/// finite values or a negative difference.
pub(crate) fn session_time_delta(times: &[f64]) -> Option<f64> {
    let mut finite = times.iter().copied().filter(|t| t.is_finite());
    let first = finite.next()?;
    let last = finite.last()?;
    Some(last - first).filter(|delta| *delta >= 0.0)
}

/// Official time at the first sample after the lap, else the session-time delta.
fn lap_duration(
    table: &ChannelTable,
    range: &Range<usize>,
    config: &SegmentationConfig,
) -> (f64, LapTimeSource) {
    let official = config
        .official_lap_time_channel
        .as_ref()
        .and_then(|id| table.value_at(id, range.end))
        .filter(|t| t.is_finite() && *t > 0.0);
    if let Some(secs) = official {
        return (secs, LapTimeSource::Official);
    }

    table
        .get(&config.session_time_channel)
        .and_then(|times| session_time_delta(&times[range.clone()]))
        .map_or((0.0, LapTimeSource::Unavailable), |secs| (secs, LapTimeSource::SessionTime))
}
