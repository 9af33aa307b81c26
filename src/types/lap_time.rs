//! Fixed-point lap times

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Sub;

use crate::GarageError;

const UNITS_PER_SECOND: i64 = 10_000;

/// A lap time stored in ten-thousandths of a second.
///
/// Four decimal places match the persisted `decimal(10,4)` column, so
/// comparisons and personal-best improvements are exact: `105.234 - 100.000`
/// is `5.234`, never `5.233999`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(into = "f64", try_from = "f64")]
pub struct LapTime(i64);

impl LapTime {
    pub const ZERO: LapTime = LapTime(0);

    /// Round a duration in seconds to the nearest ten-thousandth.
    ///
    /// Returns `None` for negative or non-finite input.
    pub fn from_secs_f64(secs: f64) -> Option<Self> {
        if !secs.is_finite() || secs < 0.0 {
            return None;
        }
        let units = (secs * UNITS_PER_SECOND as f64).round();
        if units > i64::MAX as f64 {
            return None;
        }
        Some(LapTime(units as i64))
    }

    pub const fn from_ten_thousandths(units: i64) -> Self {
        LapTime(units)
    }

    pub const fn ten_thousandths(&self) -> i64 {
        self.0
    }

    pub fn as_secs_f64(&self) -> f64 {
        self.0 as f64 / UNITS_PER_SECOND as f64
    }

    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_sub(self, other: LapTime) -> Option<LapTime> {
        self.0.checked_sub(other.0).map(LapTime)
    }
}

impl Sub for LapTime {
    type Output = LapTime;

    fn sub(self, rhs: LapTime) -> LapTime {
        LapTime(self.0.saturating_sub(rhs.0))
    }
}

impl From<LapTime> for f64 {
    fn from(time: LapTime) -> f64 {
        time.as_secs_f64()
    }
}

impl TryFrom<f64> for LapTime {
    type Error = GarageError;

    fn try_from(secs: f64) -> Result<Self, Self::Error> {
        LapTime::from_secs_f64(secs).ok_or_else(|| GarageError::TypeConversion {
            details: format!("{} is not a valid lap time", secs),
        })
    }
}

/// Formats as `M:SS.mmm`, or `SS.mmm` under a minute.
impl fmt::Display for LapTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let total_millis = (self.0.abs() + 5) / 10;
        let minutes = total_millis / 60_000;
        let seconds = (total_millis % 60_000) / 1_000;
        let millis = total_millis % 1_000;

        if minutes > 0 {
            write!(f, "{sign}{minutes}:{seconds:02}.{millis:03}")
        } else {
            write!(f, "{sign}{seconds}.{millis:03}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn improvement_is_exact() {
        let previous = LapTime::from_secs_f64(105.234).unwrap();
        let new = LapTime::from_secs_f64(100.000).unwrap();
        let improvement = previous - new;
        assert_eq!(improvement.ten_thousandths(), 52_340);
        assert_eq!(improvement.as_secs_f64(), 5.234);
    }

    #[test]
    fn rejects_negative_and_non_finite() {
        assert!(LapTime::from_secs_f64(-0.5).is_none());
        assert!(LapTime::from_secs_f64(f64::NAN).is_none());
        assert!(LapTime::from_secs_f64(f64::INFINITY).is_none());
        assert_eq!(LapTime::from_secs_f64(0.0), Some(LapTime::ZERO));
    }

    #[test]
    fn display_formats() {
        assert_eq!(LapTime::from_secs_f64(83.456).unwrap().to_string(), "1:23.456");
        assert_eq!(LapTime::from_secs_f64(59.123).unwrap().to_string(), "59.123");
        assert_eq!(LapTime::from_secs_f64(59.9996).unwrap().to_string(), "1:00.000");
        assert_eq!(LapTime::from_secs_f64(125.0).unwrap().to_string(), "2:05.000");
    }

    #[test]
    fn serializes_as_seconds() {
        let time = LapTime::from_secs_f64(92.1234).unwrap();
        let json = serde_json::to_string(&time).unwrap();
        assert_eq!(json, "92.1234");
        let back: LapTime = serde_json::from_str(&json).unwrap();
        assert_eq!(back, time);
        assert!(serde_json::from_str::<LapTime>("-1.0").is_err());
    }
}
