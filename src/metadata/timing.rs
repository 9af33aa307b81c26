//! Split timing and sector information

use serde::{Deserialize, Serialize};

use super::{lenient_f64, lenient_i32};

/// Split timing information
#[derive(Default, Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
#[serde(default)]
pub struct SplitTimeInfo {
    /// Sector information
    pub sectors: Option<Vec<Sector>>,
}

/// Individual sector timing information
#[derive(Default, Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
#[serde(default)]
pub struct Sector {
    /// Sector number
    #[serde(deserialize_with = "lenient_i32")]
    pub sector_num: Option<i32>,
    /// Sector start percentage along track
    #[serde(deserialize_with = "lenient_f64")]
    pub sector_start_pct: Option<f64>,
}

impl SplitTimeInfo {
    /// Sector start fractions in sector order; sectors without a start are dropped.
    pub fn sector_starts(&self) -> Vec<f64> {
        let mut sectors: Vec<&Sector> = self
            .sectors
            .iter()
            .flatten()
            .filter(|s| s.sector_start_pct.is_some_and(f64::is_finite))
            .collect();
        sectors.sort_by_key(|s| s.sector_num.unwrap_or(i32::MAX));
        sectors.iter().filter_map(|s| s.sector_start_pct).collect()
    }
}
