//! Per-lap statistics.

use serde::{Deserialize, Serialize};

use super::segmenter::LapSegment;
use crate::{ChannelId, ChannelTable, LapTime};

const MS_TO_KPH: f64 = 3.6;

/// Split times of a three-sector lap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectorTimes {
    pub sector1: LapTime,
    pub sector2: LapTime,
    pub sector3: LapTime,
}

/// Derived metrics of one lap. Speeds are km/h rounded to two decimals.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LapStatistics {
    pub sample_count: usize,
    pub max_speed_kph: Option<f64>,
    pub avg_speed_kph: Option<f64>,
    pub sector_times: Option<SectorTimes>,
}

impl LapStatistics {
    pub fn for_segment(segment: &LapSegment, sector_starts: &[f64]) -> Self {
        Self::compute(&segment.channels, segment.lap_time, sector_starts)
    }

    /// Statistics of a lap's sliced channels.
    ///
    /// `sector_starts` are the track's sector start fractions; sector times
    /// are only computed for exactly three sectors.
    pub fn compute(channels: &ChannelTable, lap_time: LapTime, sector_starts: &[f64]) -> Self {
        let speeds: Vec<f64> = channels
            .get(&ChannelId::Speed)
            .map(|s| s.iter().copied().filter(|v| v.is_finite()).collect())
            .unwrap_or_default();

        let (max_speed_kph, avg_speed_kph) = if speeds.is_empty() {
            (None, None)
        } else {
            let max = speeds.iter().copied().fold(f64::MIN, f64::max);
            let avg = speeds.iter().sum::<f64>() / speeds.len() as f64;
            (Some(round2(max * MS_TO_KPH)), Some(round2(avg * MS_TO_KPH)))
        };

        LapStatistics {
            sample_count: channels.sample_count(),
            max_speed_kph,
            avg_speed_kph,
            sector_times: sector_times(channels, lap_time, sector_starts),
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn sector_times(
    channels: &ChannelTable,
    lap_time: LapTime,
    sector_starts: &[f64],
) -> Option<SectorTimes> {
    let [_, split1, split2] = sector_starts else {
        return None;
    };
    let pct = channels.get(&ChannelId::LapDistPct)?;
    let time = channels.get(&ChannelId::SessionTime)?;
    let start = *time.first()?;

    let total = if lap_time.is_zero() { *time.last()? - start } else { lap_time.as_secs_f64() };
    let t1 = crossing(pct, *split1).map(|i| time[i] - start)?;
    let t2 = crossing(pct, *split2).map(|i| time[i] - start)?;
    if !(0.0 < t1 && t1 < t2 && t2 < total) {
        return None;
    }

    Some(SectorTimes {
        sector1: LapTime::from_secs_f64(t1)?,
        sector2: LapTime::from_secs_f64(t2 - t1)?,
        sector3: LapTime::from_secs_f64(total - t2)?,
    })
}

/// First sample where the lap distance moves from below `boundary` to at or past it.
fn crossing(pct: &[f64], boundary: f64) -> Option<usize> {
    pct.windows(2).position(|w| w[0] < boundary && w[1] >= boundary).map(|i| i + 1)
}
