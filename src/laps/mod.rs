//! Lap segmentation, validation and statistics.
//!
//! ```rust
//! use garage::config::PipelineConfig;
//! use garage::laps::{LapStatistics, LapValidator, segment_laps};
//! use garage::{ChannelId, ChannelTable};
//!
//! let mut lap = vec![0.0; 10];
//! lap.extend(vec![1.0; 20]);
//! let table = ChannelTable::from_columns([
//!     (ChannelId::Lap, lap),
//!     (ChannelId::SessionTime, (0..30).map(|i| i as f64).collect()),
//!     (ChannelId::Speed, vec![50.0; 30]),
//! ])?;
//!
//! let config = PipelineConfig::default();
//! let segmentation = segment_laps(&table, &config.segmentation);
//! let validator = LapValidator::new(config.validation.clone());
//! for segment in &segmentation.segments {
//!     let validity = validator.validate(segment);
//!     let stats = LapStatistics::for_segment(segment, &[]);
//!     println!("lap {} {} valid={} max={:?}", segment.lap_number, segment.lap_time, validity.is_valid, stats.max_speed_kph);
//! }
//! # Ok::<(), garage::GarageError>(())
//! ```

pub mod segmenter;
pub mod stats;
pub mod validator;

pub use segmenter::{LapSegment, LapTimeSource, Segmentation, segment_laps};
pub use stats::{LapStatistics, SectorTimes};
pub use validator::{InvalidReason, LapValidator, LapValidity};
