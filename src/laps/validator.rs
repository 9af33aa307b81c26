//! Lap validation rules.
//!
//! Each rule is evaluated independently and every rule that fires is
//! reported. A rule whose channel is missing from the lap cannot fire; it is
//! listed in [`LapValidity::unevaluated`] and the lap stays valid.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use super::segmenter::LapSegment;
use crate::config::ValidationConfig;
use crate::types::track_surface::{self, surface_code};
use crate::{ChannelId, ChannelTable, LapTime};

const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Why a lap is invalid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum InvalidReason {
    /// Shorter than the minimum lap time.
    Incomplete { lap_time: LapTime },
    /// An off-track surface code was seen.
    OffTrack { samples: usize },
    /// The car left the world (reset or tow).
    NotInWorld { samples: usize },
    /// The incident counter increased during the lap.
    Incident { count: f64 },
    /// The lap ended on pit road.
    Inlap,
    /// The car position jumped further than a car can travel between samples.
    Reset { jump_m: f64 },
}

impl fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvalidReason::Incomplete { lap_time } => {
                write!(f, "Incomplete lap (time: {:.3}s)", lap_time.as_secs_f64())
            }
            InvalidReason::OffTrack { samples } => write!(f, "Off track ({} samples)", samples),
            InvalidReason::NotInWorld { samples } => {
                write!(f, "Reset/tow detected ({} samples)", samples)
            }
            InvalidReason::Incident { count } => write!(f, "Incident during lap ({}x)", count),
            InvalidReason::Inlap => f.write_str("Inlap (ended in pits)"),
            InvalidReason::Reset { jump_m } => {
                write!(f, "Reset detected (position jump: {:.1}m)", jump_m)
            }
        }
    }
}

/// Outcome of validating one lap.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LapValidity {
    pub is_valid: bool,
    pub reasons: Vec<InvalidReason>,
    /// Channels a rule needed but the lap did not have.
    pub unevaluated: Vec<ChannelId>,
}

impl LapValidity {
    pub fn valid() -> Self {
        Self { is_valid: true, ..Self::default() }
    }

    fn push(&mut self, reason: InvalidReason) {
        self.is_valid = false;
        self.reasons.push(reason);
    }
}

/// Applies the configured rules to laps.
#[derive(Debug, Clone)]
pub struct LapValidator {
    config: ValidationConfig,
}

impl LapValidator {
    pub fn new(config: ValidationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    /// Validate a segment.
    ///
    /// The single lap produced without a lap channel is valid unless
    /// `validate_fallback_lap` is set.
    pub fn validate(&self, segment: &LapSegment) -> LapValidity {
        if segment.is_fallback && !self.config.validate_fallback_lap {
            return LapValidity::valid();
        }
        let validity = self.check(segment.duration_secs, segment.lap_time, &segment.channels);
        if !validity.is_valid {
            debug!(
                lap = segment.lap_number,
                reasons = ?validity.reasons.iter().map(ToString::to_string).collect::<Vec<_>>(),
                "Lap invalid"
            );
        }
        validity
    }

    /// Validate a lap given its time and its sliced channels.
    pub fn validate_channels(&self, lap_time: LapTime, channels: &ChannelTable) -> LapValidity {
        self.check(lap_time.as_secs_f64(), lap_time, channels)
    }

    /// The minimum-time rule compares the unrounded `duration_secs`.
    fn check(&self, duration_secs: f64, lap_time: LapTime, channels: &ChannelTable) -> LapValidity {
        let mut validity = LapValidity::valid();

        if duration_secs < self.config.min_lap_time_secs {
            validity.push(InvalidReason::Incomplete { lap_time });
        }

        if let Some(threshold) = self.config.reset_jump_threshold_m {
            match (channels.get(&ChannelId::Lat), channels.get(&ChannelId::Lon)) {
                (Some(lats), Some(lons)) => {
                    let jump = max_position_jump(lats, lons);
                    if jump > threshold {
                        validity.push(InvalidReason::Reset { jump_m: jump });
                    }
                }
                (lats, _) => {
                    let missing = if lats.is_none() { ChannelId::Lat } else { ChannelId::Lon };
                    validity.unevaluated.push(missing);
                }
            }
        }

        match channels.get(&ChannelId::PlayerTrackSurface) {
            Some(surfaces) => self.check_surfaces(surfaces, &mut validity),
            None => validity.unevaluated.push(ChannelId::PlayerTrackSurface),
        }

        if self.config.check_incidents {
            match channels.get(&ChannelId::PlayerCarMyIncidentCount) {
                Some(counts) => {
                    if let (Some(first), Some(last)) = (counts.first(), counts.last()) {
                        if last > first {
                            validity.push(InvalidReason::Incident { count: last - first });
                        }
                    }
                }
                None => validity.unevaluated.push(ChannelId::PlayerCarMyIncidentCount),
            }
        }

        if self.config.check_inlap {
            match channels.get(&ChannelId::OnPitRoad) {
                Some(on_pit_road) => {
                    if on_pit_road.last().is_some_and(|v| *v != 0.0 && !v.is_nan()) {
                        validity.push(InvalidReason::Inlap);
                    }
                }
                None => validity.unevaluated.push(ChannelId::OnPitRoad),
            }
        }

        validity
    }

    fn check_surfaces(&self, surfaces: &[f64], validity: &mut LapValidity) {
        let mut off_track = 0;
        let mut not_in_world = 0;
        for code in surfaces.iter().filter_map(|s| surface_code(*s)) {
            if !self.config.off_track_surfaces.contains(&code) {
                continue;
            }
            if code == track_surface::NOT_IN_WORLD {
                not_in_world += 1;
            } else {
                off_track += 1;
            }
        }
        if not_in_world > 0 {
            validity.push(InvalidReason::NotInWorld { samples: not_in_world });
        }
        if off_track > 0 {
            validity.push(InvalidReason::OffTrack { samples: off_track });
        }
    }
}

impl Default for LapValidator {
    fn default() -> Self {
        Self::new(ValidationConfig::default())
    }
}

/// Largest great-circle distance in meters between consecutive GPS samples.
pub fn max_position_jump(lats: &[f64], lons: &[f64]) -> f64 {
    lats.windows(2)
        .zip(lons.windows(2))
        .map(|(lat, lon)| haversine_m(lat[0], lon[0], lat[1], lon[1]))
        .filter(|d| d.is_finite())
        .fold(0.0, f64::max)
}

fn haversine_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (lat1, lon1, lat2, lon2) =
        (lat1.to_radians(), lon1.to_radians(), lat2.to_radians(), lon2.to_radians());
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;
    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * a.sqrt().asin()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::laps::LapTimeSource;
    use proptest::prelude::*;

    const N: usize = 100;

    fn clean_lap() -> ChannelTable {
        ChannelTable::from_columns([
            (ChannelId::PlayerTrackSurface, vec![1.0; N]),
            (ChannelId::PlayerCarMyIncidentCount, vec![2.0; N]),
            (ChannelId::OnPitRoad, vec![0.0; N]),
        ])
        .unwrap()
    }

    fn secs(s: f64) -> LapTime {
        LapTime::from_secs_f64(s).unwrap()
    }

    #[test]
    fn clean_lap_is_valid() {
        let validity = LapValidator::default().validate_channels(secs(92.5), &clean_lap());
        assert!(validity.is_valid);
        assert!(validity.reasons.is_empty());
        assert!(validity.unevaluated.is_empty());
    }

    #[test]
    fn off_track_samples_invalidate() {
        let mut surfaces = vec![1.0; N];
        surfaces[80..90].fill(3.0);
        let mut channels = clean_lap();
        channels.insert(ChannelId::PlayerTrackSurface, surfaces).unwrap();

        let validity = LapValidator::default().validate_channels(secs(92.5), &channels);
        assert!(!validity.is_valid);
        assert_eq!(validity.reasons, vec![InvalidReason::OffTrack { samples: 10 }]);
    }

    #[test]
    fn short_lap_is_incomplete_regardless_of_channels() {
        let validity = LapValidator::default().validate_channels(secs(5.123), &clean_lap());
        assert!(!validity.is_valid);
        assert_eq!(validity.reasons, vec![InvalidReason::Incomplete { lap_time: secs(5.123) }]);
        assert_eq!(validity.reasons[0].to_string(), "Incomplete lap (time: 5.123s)");

        let bare = LapValidator::default().validate_channels(secs(5.123), &ChannelTable::new());
        assert!(!bare.is_valid);
    }

    #[test]
    fn zero_time_lap_is_incomplete() {
        let validity = LapValidator::default().validate_channels(LapTime::ZERO, &clean_lap());
        assert!(!validity.is_valid);
    }

    #[test]
    fn minimum_time_uses_unrounded_duration() {
        let segment = LapSegment {
            lap_number: 1,
            start: 0,
            end: N,
            lap_time: secs(10.0),
            duration_secs: 9.99996,
            time_source: LapTimeSource::SessionTime,
            channels: clean_lap(),
            is_fallback: false,
        };
        let validity = LapValidator::default().validate(&segment);
        assert_eq!(validity.reasons, vec![InvalidReason::Incomplete { lap_time: secs(10.0) }]);

        let exact = LapSegment { duration_secs: 10.0, ..segment };
        assert!(LapValidator::default().validate(&exact).is_valid);
    }

    #[test]
    fn every_triggered_rule_is_reported() {
        let mut surfaces = vec![1.0; N];
        surfaces[3] = -1.0;
        surfaces[4] = 3.0;
        let mut incidents = vec![0.0; N];
        incidents[N - 1] = 4.0;
        let mut pit = vec![0.0; N];
        pit[N - 1] = 1.0;
        let channels = ChannelTable::from_columns([
            (ChannelId::PlayerTrackSurface, surfaces),
            (ChannelId::PlayerCarMyIncidentCount, incidents),
            (ChannelId::OnPitRoad, pit),
        ])
        .unwrap();

        let validity = LapValidator::default().validate_channels(secs(3.0), &channels);
        assert_eq!(
            validity.reasons,
            vec![
                InvalidReason::Incomplete { lap_time: secs(3.0) },
                InvalidReason::NotInWorld { samples: 1 },
                InvalidReason::OffTrack { samples: 1 },
                InvalidReason::Incident { count: 4.0 },
                InvalidReason::Inlap,
            ]
        );
    }

    #[test]
    fn pit_road_mid_lap_is_not_an_inlap() {
        let mut pit = vec![0.0; N];
        pit[0..20].fill(1.0);
        let mut channels = clean_lap();
        channels.insert(ChannelId::OnPitRoad, pit).unwrap();
        assert!(LapValidator::default().validate_channels(secs(95.0), &channels).is_valid);
    }

    #[test]
    fn missing_channels_fail_open() {
        let validity = LapValidator::default().validate_channels(secs(95.0), &ChannelTable::new());
        assert!(validity.is_valid);
        assert_eq!(
            validity.unevaluated,
            vec![
                ChannelId::PlayerTrackSurface,
                ChannelId::PlayerCarMyIncidentCount,
                ChannelId::OnPitRoad
            ]
        );
    }

    #[test]
    fn disabled_rules_are_not_evaluated() {
        let config = ValidationConfig {
            check_incidents: false,
            check_inlap: false,
            off_track_surfaces: vec![],
            ..ValidationConfig::default()
        };
        let mut surfaces = vec![1.0; N];
        surfaces[0] = 3.0;
        let channels = ChannelTable::from_columns([
            (ChannelId::PlayerTrackSurface, surfaces),
            (ChannelId::PlayerCarMyIncidentCount, (0..N).map(|i| i as f64).collect()),
            (ChannelId::OnPitRoad, vec![1.0; N]),
        ])
        .unwrap();
        let validity = LapValidator::new(config).validate_channels(secs(95.0), &channels);
        assert!(validity.is_valid);
        assert!(validity.unevaluated.is_empty());
    }

    #[test]
    fn reset_detection_uses_position_jumps() {
        let config = ValidationConfig { reset_jump_threshold_m: Some(100.0), ..Default::default() };
        let validator = LapValidator::new(config);

        // About 1.1 m between samples along a meridian.
        let lats: Vec<f64> = (0..N).map(|i| 41.9 + i as f64 * 1e-5).collect();
        let mut channels = clean_lap();
        channels.insert(ChannelId::Lat, lats.clone()).unwrap();
        channels.insert(ChannelId::Lon, vec![-73.38; N]).unwrap();
        assert!(validator.validate_channels(secs(60.0), &channels).is_valid);

        let mut teleport = lats;
        teleport[50] += 0.01;
        channels.insert(ChannelId::Lat, teleport).unwrap();
        let validity = validator.validate_channels(secs(60.0), &channels);
        assert!(!validity.is_valid);
        match &validity.reasons[..] {
            [InvalidReason::Reset { jump_m }] => assert!(*jump_m > 1000.0 && *jump_m < 1200.0),
            other => panic!("Expected a reset, got {:?}", other),
        }

        let without_gps = validator.validate_channels(secs(60.0), &clean_lap());
        assert_eq!(without_gps.unevaluated[0], ChannelId::Lat);
    }

    #[test]
    fn haversine_matches_known_distance() {
        // One degree of latitude is about 111.19 km.
        let d = haversine_m(0.0, 0.0, 1.0, 0.0);
        assert!((d - 111_194.9).abs() < 1.0, "got {}", d);
    }

    proptest! {
        #[test]
        fn any_single_trigger_invalidates_a_clean_lap(
            trigger in 0usize..4,
            at in 0usize..N,
            lap_secs in 10.0f64..300.0,
        ) {
            let validator = LapValidator::default();
            let mut channels = clean_lap();
            let mut lap_time = secs(lap_secs);
            prop_assert!(validator.validate_channels(lap_time, &channels).is_valid);

            match trigger {
                0 => lap_time = secs(lap_secs % 10.0 * 0.99),
                1 => {
                    let mut surfaces = vec![1.0; N];
                    surfaces[at] = if at % 2 == 0 { 3.0 } else { -1.0 };
                    channels.insert(ChannelId::PlayerTrackSurface, surfaces).unwrap();
                }
                2 => {
                    let counts: Vec<f64> = (0..N).map(|i| if i >= at.max(1) { 3.0 } else { 2.0 }).collect();
                    channels.insert(ChannelId::PlayerCarMyIncidentCount, counts).unwrap();
                }
                _ => {
                    let mut pit = vec![0.0; N];
                    pit[N - 1] = 1.0;
                    channels.insert(ChannelId::OnPitRoad, pit).unwrap();
                }
            }

            let validity = validator.validate_channels(lap_time, &channels);
            prop_assert!(!validity.is_valid);
            prop_assert_eq!(validity.reasons.len(), 1);
        }
    }
}
