//! # Lap Pipeline
//!
//! Turns one recording into laps: read the session metadata, read the
//! channels, segment, validate and aggregate every lap.
//!
//! ```text
//!  TelemetrySource ──► SessionContext
//!        │
//!        ▼
//!   ChannelTable ──► segment_laps ──► LapSegment ─┬─► LapValidator  ──► LapValidity
//!                         │                       └─► LapStatistics
//!                         ▼
//!                  skipped laps (MalformedLap)
//! ```
//!
//! Fatal errors (unreadable file, missing metadata) abort before any lap is
//! produced. A malformed lap is skipped and counted; a missing channel only
//! disables the rules and statistics that need it.
//!
//! The persisted shapes ([`LapRecord`], [`TelemetryBlob`]) are produced from
//! a [`ProcessedLap`]; storing them is the caller's concern.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::laps::{LapSegment, LapStatistics, LapValidator, LapValidity, segment_laps};
use crate::metadata::{SessionContext, extract_context};
use crate::{ChannelId, ChannelTable, GarageError, IbtReader, LapTime, Result, TelemetrySource};

/// One lap with its validity and statistics.
#[derive(Debug, Clone)]
pub struct ProcessedLap {
    pub segment: LapSegment,
    pub validity: LapValidity,
    pub stats: LapStatistics,
}

impl ProcessedLap {
    pub fn lap_number(&self) -> u32 {
        self.segment.lap_number
    }

    pub fn lap_time(&self) -> LapTime {
        self.segment.lap_time
    }

    pub fn is_valid(&self) -> bool {
        self.validity.is_valid
    }

    /// The persisted lap row. New laps never carry the personal-best flag.
    pub fn to_record(&self) -> LapRecord {
        let sectors = self.stats.sector_times;
        LapRecord {
            lap_number: self.segment.lap_number,
            lap_time: self.segment.lap_time,
            sector1_time: sectors.map(|s| s.sector1),
            sector2_time: sectors.map(|s| s.sector2),
            sector3_time: sectors.map(|s| s.sector3),
            is_valid: self.validity.is_valid,
            is_personal_best: false,
        }
    }

    /// The persisted telemetry of this lap, restricted to `channels`.
    pub fn telemetry_blob(&self, channels: &[ChannelId]) -> TelemetryBlob {
        TelemetryBlob {
            sample_count: self.stats.sample_count,
            max_speed: self.stats.max_speed_kph.unwrap_or(0.0),
            avg_speed: self.stats.avg_speed_kph.unwrap_or(0.0),
            data: self.segment.channels.select(channels),
        }
    }
}

/// Everything extracted from one recording.
#[derive(Debug, Clone)]
pub struct ProcessedSession {
    pub context: SessionContext,
    pub laps: Vec<ProcessedLap>,
    /// Laps skipped as malformed.
    pub skipped_laps: usize,
}

impl ProcessedSession {
    pub fn valid_laps(&self) -> impl Iterator<Item = &ProcessedLap> {
        self.laps.iter().filter(|lap| lap.is_valid())
    }

    /// Fastest valid lap with a non-zero time.
    pub fn best_lap(&self) -> Option<&ProcessedLap> {
        self.valid_laps()
            .filter(|lap| !lap.lap_time().is_zero() && lap.lap_number() != 0)
            .min_by_key(|lap| (lap.lap_time(), lap.lap_number()))
    }
}

/// Persisted lap row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LapRecord {
    pub lap_number: u32,
    pub lap_time: LapTime,
    pub sector1_time: Option<LapTime>,
    pub sector2_time: Option<LapTime>,
    pub sector3_time: Option<LapTime>,
    pub is_valid: bool,
    pub is_personal_best: bool,
}

/// Persisted per-lap telemetry. Speeds are km/h.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryBlob {
    pub sample_count: usize,
    pub max_speed: f64,
    pub avg_speed: f64,
    pub data: ChannelTable,
}

impl TelemetryBlob {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| GarageError::Parse {
            context: "TelemetryBlob serialization".to_string(),
            details: e.to_string(),
        })
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| GarageError::Parse {
            context: "TelemetryBlob deserialization".to_string(),
            details: e.to_string(),
        })
    }
}

/// Parse, segment, validate and aggregate recordings.
#[derive(Debug, Clone)]
pub struct LapPipeline {
    config: PipelineConfig,
    validator: LapValidator,
}

impl LapPipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let validator = LapValidator::new(config.validation.clone());
        Ok(Self { config, validator })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn validator(&self) -> &LapValidator {
        &self.validator
    }

    /// Open and process an IBT file.
    pub fn process_file(&self, path: impl AsRef<Path>) -> Result<ProcessedSession> {
        let reader = IbtReader::open(path)?;
        self.process_source(&reader)
    }

    pub fn process_source<S: TelemetrySource + ?Sized>(&self, source: &S) -> Result<ProcessedSession> {
        let context = extract_context(source)?;

        let requested = self.config.required_channels();
        let table = source.read_channels(&requested)?;
        let missing: Vec<&str> =
            requested.iter().filter(|id| !table.has(id)).map(ChannelId::as_str).collect();
        if !missing.is_empty() {
            debug!(?missing, "Channels not recorded");
        }

        let segmentation = segment_laps(&table, &self.config.segmentation);
        let skipped_laps = segmentation.skipped_count();
        for error in &segmentation.skipped {
            warn!(path = %source.source_path().display(), %error, "Skipped lap");
        }

        let laps: Vec<ProcessedLap> = segmentation
            .segments
            .into_iter()
            .map(|segment| self.process_segment(segment, &context.sector_starts))
            .collect();

        info!(
            path = %source.source_path().display(),
            laps = laps.len(),
            valid = laps.iter().filter(|l| l.is_valid()).count(),
            skipped = skipped_laps,
            "Processed session"
        );
        Ok(ProcessedSession { context, laps, skipped_laps })
    }

    /// Validate and aggregate one segment.
    pub fn process_segment(&self, segment: LapSegment, sector_starts: &[f64]) -> ProcessedLap {
        let validity = self.validator.validate(&segment);
        let stats = LapStatistics::for_segment(&segment, sector_starts);
        debug!(
            lap = segment.lap_number,
            lap_time = %segment.lap_time,
            valid = validity.is_valid,
            samples = stats.sample_count,
            "Processed lap"
        );
        ProcessedLap { segment, validity, stats }
    }
}

impl Default for LapPipeline {
    fn default() -> Self {
        let config = PipelineConfig::default();
        Self { validator: LapValidator::new(config.validation.clone()), config }
    }
}
