//! Live lap tracking.
//!
//! Samples arrive one at a time while the car is on track. [`LiveLapTracker`]
//! buffers them until the lap channel changes, then validates and aggregates
//! the finished lap with the same rules as recorded files.
//!
//! ```rust
//! use garage::live::{LiveLapTracker, TelemetrySample};
//! use garage::ChannelId;
//!
//! let mut tracker = LiveLapTracker::default();
//! for i in 0..1200 {
//!     let lap = if i < 600 { 1.0 } else { 2.0 };
//!     let sample = TelemetrySample::new()
//!         .with(ChannelId::Lap, lap)
//!         .with(ChannelId::SessionTime, i as f64 / 60.0);
//!     if let Some(done) = tracker.push(sample) {
//!         assert_eq!(done.lap_number(), 1);
//!     }
//! }
//! let last = tracker.finish().unwrap();
//! assert_eq!(last.lap_number(), 2);
//! ```

use futures::{Stream, ready};
use pin_project_lite::pin_project;
use std::collections::BTreeMap;
use std::pin::Pin;
use std::task::{Context, Poll};
use tracing::{debug, info, trace};

use crate::laps::segmenter::{lap_number, session_time_delta};
use crate::laps::{LapSegment, LapTimeSource};
use crate::metadata::SessionContext;
use crate::pipeline::{LapPipeline, ProcessedLap};
use crate::{ChannelId, ChannelTable, LapTime};

/// One telemetry sample: a value per channel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TelemetrySample {
    values: BTreeMap<ChannelId, f64>,
}

impl TelemetrySample {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, id: ChannelId, value: f64) -> Self {
        self.values.insert(id, value);
        self
    }

    pub fn insert(&mut self, id: ChannelId, value: f64) {
        self.values.insert(id, value);
    }

    pub fn get(&self, id: &ChannelId) -> Option<f64> {
        self.values.get(id).copied()
    }

    pub fn values(&self) -> &BTreeMap<ChannelId, f64> {
        &self.values
    }
}

impl FromIterator<(ChannelId, f64)> for TelemetrySample {
    fn from_iter<I: IntoIterator<Item = (ChannelId, f64)>>(iter: I) -> Self {
        Self { values: iter.into_iter().collect() }
    }
}

/// Accumulates live samples into laps.
#[derive(Debug, Clone)]
pub struct LiveLapTracker {
    pipeline: LapPipeline,
    sector_starts: Vec<f64>,
    current_lap: Option<u32>,
    buffer: ChannelTable,
}

impl LiveLapTracker {
    pub fn new(pipeline: LapPipeline) -> Self {
        Self { pipeline, sector_starts: Vec::new(), current_lap: None, buffer: ChannelTable::new() }
    }

    /// Use the session's sector layout for sector times.
    pub fn with_context(mut self, context: &SessionContext) -> Self {
        self.sector_starts = context.sector_starts.clone();
        self
    }

    pub fn current_lap(&self) -> Option<u32> {
        self.current_lap
    }

    /// Samples buffered for the lap in progress.
    pub fn buffered_samples(&self) -> usize {
        self.buffer.sample_count()
    }

    /// Add a sample. Returns the previous lap when this sample starts a new one.
    ///
    /// Samples without a usable lap value belong to the lap in progress;
    /// before the first lap they are dropped.
    pub fn push(&mut self, sample: TelemetrySample) -> Option<ProcessedLap> {
        let lap_channel = &self.pipeline.config().segmentation.lap_channel;
        let lap = sample.get(lap_channel).and_then(lap_number);

        let completed = match (self.current_lap, lap) {
            (None, None) => {
                trace!("Sample before first lap dropped");
                return None;
            }
            (None, Some(lap)) => {
                debug!(lap, "Tracking lap");
                self.current_lap = Some(lap);
                None
            }
            (Some(current), Some(lap)) if lap != current => {
                let official = self
                    .pipeline
                    .config()
                    .segmentation
                    .official_lap_time_channel
                    .as_ref()
                    .and_then(|id| sample.get(id));
                self.current_lap = Some(lap);
                self.complete(current, official)
            }
            _ => None,
        };

        self.buffer.push_row(sample.values());
        completed
    }

    /// Flush the lap in progress, e.g. when the session ends.
    pub fn finish(&mut self) -> Option<ProcessedLap> {
        let current = self.current_lap.take()?;
        self.complete(current, None)
    }

    fn complete(&mut self, lap_number: u32, official: Option<f64>) -> Option<ProcessedLap> {
        let channels = std::mem::take(&mut self.buffer);
        if lap_number == 0 || channels.is_empty() {
            return None;
        }

        let (duration_secs, time_source) = self.lap_duration(&channels, official);
        let end = channels.sample_count();
        let segment = LapSegment {
            lap_number,
            start: 0,
            end,
            lap_time: LapTime::from_secs_f64(duration_secs).unwrap_or(LapTime::ZERO),
            duration_secs,
            time_source,
            channels,
            is_fallback: false,
        };
        let lap = self.pipeline.process_segment(segment, &self.sector_starts);
        info!(lap = lap_number, lap_time = %lap.lap_time(), valid = lap.is_valid(), "Lap completed");
        Some(lap)
    }

    /// Official time, then the session-time delta, then the sample count.
    fn lap_duration(&self, channels: &ChannelTable, official: Option<f64>) -> (f64, LapTimeSource) {
        if let Some(secs) = official.filter(|t| t.is_finite() && *t > 0.0) {
            return (secs, LapTimeSource::Official);
        }

        let config = self.pipeline.config();
        let delta = channels
            .get(&config.segmentation.session_time_channel)
            .and_then(session_time_delta);
        if let Some(secs) = delta {
            return (secs, LapTimeSource::SessionTime);
        }

        (channels.sample_count() as f64 / config.live.tick_rate_hz, LapTimeSource::Unavailable)
    }
}

impl Default for LiveLapTracker {
    fn default() -> Self {
        Self::new(LapPipeline::default())
    }
}

/// Extension trait turning a sample stream into a stream of completed laps.
pub trait LiveLapExt: Stream<Item = TelemetrySample> {
    /// Emit each lap as soon as the next one starts, and the last lap when
    /// the sample stream ends.
    fn completed_laps(self, tracker: LiveLapTracker) -> CompletedLaps<Self>
    where
        Self: Sized,
    {
        CompletedLaps::new(self, tracker)
    }
}

impl<T: Stream<Item = TelemetrySample>> LiveLapExt for T {}

pin_project! {
    /// Stream of laps completed by a live sample stream.
    pub struct CompletedLaps<S> {
        #[pin]
        stream: S,
        tracker: LiveLapTracker,
        done: bool,
    }
}

impl<S> CompletedLaps<S> {
    pub fn new(stream: S, tracker: LiveLapTracker) -> Self {
        Self { stream, tracker, done: false }
    }
}

impl<S: Stream<Item = TelemetrySample>> Stream for CompletedLaps<S> {
    type Item = ProcessedLap;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();
        if *this.done {
            return Poll::Ready(None);
        }

        loop {
            match ready!(this.stream.as_mut().poll_next(cx)) {
                Some(sample) => {
                    if let Some(lap) = this.tracker.push(sample) {
                        return Poll::Ready(Some(lap));
                    }
                }
                None => {
                    *this.done = true;
                    return Poll::Ready(this.tracker.finish());
                }
            }
        }
    }
}
