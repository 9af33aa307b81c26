//! Pipeline configuration.
//!
//! Every field has a default, so an empty document (or no file at all) yields
//! the standard pipeline. Configuration is YAML:
//!
//! ```yaml
//! validation:
//!   min_lap_time_secs: 10.0
//!   off_track_surfaces: [3, -1]
//!   reset_jump_threshold_m: 100.0
//! error_message_limit: 500
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::channels::default_channels;
use crate::types::track_surface;
use crate::{ChannelId, GarageError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Channels extracted from each file and stored with each lap.
    pub channels: Vec<ChannelId>,
    pub segmentation: SegmentationConfig,
    pub validation: ValidationConfig,
    pub live: LiveConfig,
    /// Longest error message recorded on a failed session.
    pub error_message_limit: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            channels: default_channels(),
            segmentation: SegmentationConfig::default(),
            validation: ValidationConfig::default(),
            live: LiveConfig::default(),
            error_message_limit: 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    /// Lap-index channel; one segment per distinct value.
    pub lap_channel: ChannelId,
    /// Monotonic time channel used to derive lap durations.
    pub session_time_channel: ChannelId,
    /// Simulator's official last-lap time, preferred over the time delta when set.
    pub official_lap_time_channel: Option<ChannelId>,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            lap_channel: ChannelId::Lap,
            session_time_channel: ChannelId::SessionTime,
            official_lap_time_channel: Some(ChannelId::LapLastLapTime),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Laps shorter than this are incomplete.
    pub min_lap_time_secs: f64,
    /// `PlayerTrackSurface` codes that invalidate a lap.
    pub off_track_surfaces: Vec<i32>,
    pub check_incidents: bool,
    pub check_inlap: bool,
    /// Largest believable GPS jump between consecutive samples, in meters.
    /// `None` disables reset detection.
    pub reset_jump_threshold_m: Option<f64>,
    /// Apply the rules to the single lap produced when there is no lap channel.
    pub validate_fallback_lap: bool,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            min_lap_time_secs: 10.0,
            off_track_surfaces: track_surface::DEFAULT_INVALID_SURFACES.to_vec(),
            check_incidents: true,
            check_inlap: true,
            reset_jump_threshold_m: None,
            validate_fallback_lap: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    /// Sample rate used to estimate lap time when no time channel is streamed.
    pub tick_rate_hz: f64,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self { tick_rate_hz: 60.0 }
    }
}

impl PipelineConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: PipelineConfig = if yaml.trim().is_empty() {
            PipelineConfig::default()
        } else {
            serde_yaml_ng::from_str(yaml).map_err(|e| GarageError::Config {
                details: format!("invalid pipeline configuration: {}", e),
                source: Some(Box::new(e)),
            })?
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|e| GarageError::Config {
            details: format!("cannot read {}: {}", path.display(), e),
            source: Some(Box::new(e)),
        })?;
        Self::from_yaml_str(&yaml)
    }

    pub fn to_yaml_string(&self) -> Result<String> {
        serde_yaml_ng::to_string(self).map_err(|e| GarageError::Config {
            details: format!("cannot serialize pipeline configuration: {}", e),
            source: Some(Box::new(e)),
        })
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        let validation = &self.validation;
        if !validation.min_lap_time_secs.is_finite() || validation.min_lap_time_secs < 0.0 {
            return Err(GarageError::config(format!(
                "min_lap_time_secs must be a non-negative number, got {}",
                validation.min_lap_time_secs
            )));
        }
        if let Some(threshold) = validation.reset_jump_threshold_m {
            if !threshold.is_finite() || threshold <= 0.0 {
                return Err(GarageError::config(format!(
                    "reset_jump_threshold_m must be positive, got {}",
                    threshold
                )));
            }
        }
        if !self.live.tick_rate_hz.is_finite() || self.live.tick_rate_hz <= 0.0 {
            return Err(GarageError::config(format!(
                "live.tick_rate_hz must be positive, got {}",
                self.live.tick_rate_hz
            )));
        }
        if self.error_message_limit == 0 {
            return Err(GarageError::config("error_message_limit must be at least 1"));
        }
        if self.segmentation.lap_channel == self.segmentation.session_time_channel {
            return Err(GarageError::config(
                "lap_channel and session_time_channel must be different channels",
            ));
        }
        Ok(())
    }

    /// Every channel the pipeline reads: the stored set plus the ones
    /// segmentation and validation depend on.
    pub fn required_channels(&self) -> Vec<ChannelId> {
        let mut channels = self.channels.clone();
        let seg = &self.segmentation;
        let mut extra = vec![
            seg.lap_channel.clone(),
            seg.session_time_channel.clone(),
            ChannelId::Speed,
            ChannelId::LapDistPct,
            ChannelId::PlayerTrackSurface,
            ChannelId::OnPitRoad,
            ChannelId::PlayerCarMyIncidentCount,
        ];
        if let Some(official) = &seg.official_lap_time_channel {
            extra.push(official.clone());
        }
        if self.validation.reset_jump_threshold_m.is_some() {
            extra.extend([ChannelId::Lat, ChannelId::Lon]);
        }
        for id in extra {
            if !channels.contains(&id) {
                channels.push(id);
            }
        }
        channels
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[test]
    fn empty_document_gives_defaults() -> Result<()> {
        let config = PipelineConfig::from_yaml_str("")?;
        assert_eq!(config, PipelineConfig::default());
        assert_eq!(config.validation.min_lap_time_secs, 10.0);
        assert_eq!(config.validation.off_track_surfaces, vec![3, -1]);
        assert_eq!(config.error_message_limit, 500);
        Ok(())
    }

    #[test]
    fn partial_document_keeps_other_defaults() -> Result<()> {
        let config = PipelineConfig::from_yaml_str(
            "validation:\n  reset_jump_threshold_m: 100.0\n  check_inlap: false\nchannels: [Lap, SessionTime, LFtempL]\n",
        )?;
        assert_eq!(config.validation.reset_jump_threshold_m, Some(100.0));
        assert!(!config.validation.check_inlap);
        assert!(config.validation.check_incidents);
        assert_eq!(
            config.channels,
            vec![ChannelId::Lap, ChannelId::SessionTime, ChannelId::new("LFtempL")]
        );
        assert_eq!(config.segmentation.lap_channel, ChannelId::Lap);
        Ok(())
    }

    #[test]
    fn rejects_invalid_values() {
        for yaml in [
            "validation:\n  min_lap_time_secs: -1.0\n",
            "validation:\n  reset_jump_threshold_m: 0.0\n",
            "live:\n  tick_rate_hz: 0.0\n",
            "error_message_limit: 0\n",
            "segmentation:\n  lap_channel: SessionTime\n",
            "validation: [1, 2]\n",
        ] {
            let result = PipelineConfig::from_yaml_str(yaml);
            assert!(matches!(result, Err(GarageError::Config { .. })), "accepted: {}", yaml);
        }
    }

    #[test]
    fn yaml_round_trip_preserves_settings() -> Result<()> {
        let mut config = PipelineConfig::default();
        config.validation.reset_jump_threshold_m = Some(150.0);
        config.segmentation.official_lap_time_channel = None;
        let yaml = config.to_yaml_string()?;
        assert_eq!(PipelineConfig::from_yaml_str(&yaml)?, config);
        Ok(())
    }

    #[test]
    fn loads_from_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("pipeline.yaml");
        std::fs::write(&path, "error_message_limit: 120\n")?;
        assert_eq!(PipelineConfig::from_path(&path)?.error_message_limit, 120);
        assert!(PipelineConfig::from_path(dir.path().join("missing.yaml")).is_err());
        Ok(())
    }

    #[test]
    fn required_channels_include_rule_inputs() {
        let mut config = PipelineConfig::default();
        config.channels = vec![ChannelId::Speed];
        config.validation.reset_jump_threshold_m = Some(100.0);
        let required = config.required_channels();
        for id in [
            ChannelId::Lap,
            ChannelId::SessionTime,
            ChannelId::LapLastLapTime,
            ChannelId::PlayerTrackSurface,
            ChannelId::Lat,
            ChannelId::Lon,
        ] {
            assert!(required.contains(&id), "missing {}", id);
        }
        assert_eq!(required.iter().filter(|id| **id == ChannelId::Speed).count(), 1);
    }
}
