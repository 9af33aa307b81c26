//! Typed telemetry channels.
//!
//! A [`ChannelTable`] is a struct-of-arrays view of one recording: each
//! [`ChannelId`] maps to one `f64` per sample, and every column has the same
//! length. Rules that depend on a channel ask the table whether it is present
//! instead of probing a string-keyed map.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Range;
use std::str::FromStr;

use crate::{GarageError, Result};

macro_rules! channel_ids {
    ($($(#[$doc:meta])* $variant:ident => $name:literal,)+) => {
        /// Identifier of a telemetry channel.
        ///
        /// Well-known channels have their own variant; any other simulator
        /// variable is carried as [`ChannelId::Other`]. Parsing a known name
        /// always yields its dedicated variant.
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub enum ChannelId {
            $($(#[$doc])* $variant,)+
            /// Any other simulator variable, by name.
            Other(String),
        }

        impl ChannelId {
            /// The simulator's variable name for this channel.
            pub fn as_str(&self) -> &str {
                match self {
                    $(ChannelId::$variant => $name,)+
                    ChannelId::Other(name) => name,
                }
            }

            fn known(name: &str) -> Option<Self> {
                match name {
                    $($name => Some(ChannelId::$variant),)+
                    _ => None,
                }
            }
        }
    };
}

channel_ids! {
    /// Lap counter; the lap-index channel used for segmentation.
    Lap => "Lap",
    /// Distance from the start/finish line in meters.
    LapDist => "LapDist",
    /// Fraction of the lap completed, 0.0 to 1.0.
    LapDistPct => "LapDistPct",
    /// Seconds since session start; monotonic.
    SessionTime => "SessionTime",
    /// Ground speed in m/s.
    Speed => "Speed",
    /// Official time of the last completed lap, set when crossing the line.
    LapLastLapTime => "LapLastLapTime",
    LapCurrentLapTime => "LapCurrentLapTime",
    Throttle => "Throttle",
    Brake => "Brake",
    Clutch => "Clutch",
    Gear => "Gear",
    Rpm => "RPM",
    SteeringWheelAngle => "SteeringWheelAngle",
    Lat => "Lat",
    Lon => "Lon",
    Alt => "Alt",
    /// Surface under the player's car; see [`crate::types::track_surface`].
    PlayerTrackSurface => "PlayerTrackSurface",
    OnPitRoad => "OnPitRoad",
    PlayerCarMyIncidentCount => "PlayerCarMyIncidentCount",
    FuelLevel => "FuelLevel",
    FuelLevelPct => "FuelLevelPct",
    LatAccel => "LatAccel",
    LongAccel => "LongAccel",
    VertAccel => "VertAccel",
    Roll => "Roll",
    Pitch => "Pitch",
    Yaw => "Yaw",
}

impl ChannelId {
    /// Canonical identifier for a simulator variable name.
    pub fn new(name: &str) -> Self {
        ChannelId::known(name).unwrap_or_else(|| ChannelId::Other(name.to_string()))
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChannelId {
    type Err = GarageError;

    fn from_str(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Err(GarageError::parse("Channel name", "empty channel name"));
        }
        Ok(ChannelId::new(s))
    }
}

impl From<&str> for ChannelId {
    fn from(name: &str) -> Self {
        ChannelId::new(name)
    }
}

impl From<String> for ChannelId {
    fn from(name: String) -> Self {
        ChannelId::known(&name).unwrap_or(ChannelId::Other(name))
    }
}

impl From<ChannelId> for String {
    fn from(id: ChannelId) -> String {
        match id {
            ChannelId::Other(name) => name,
            known => known.as_str().to_string(),
        }
    }
}

impl Serialize for ChannelId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ChannelId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        String::deserialize(deserializer).map(ChannelId::from)
    }
}

/// Channels extracted from every uploaded file by default.
///
/// Lap bookkeeping, driver inputs, GPS, tyre temperatures and pressures, fuel,
/// suspension, accelerations, orientation and the lap validation channels.
pub fn default_channels() -> Vec<ChannelId> {
    let mut channels = vec![
        ChannelId::Lap,
        ChannelId::LapDist,
        ChannelId::LapDistPct,
        ChannelId::SessionTime,
        ChannelId::Speed,
        ChannelId::LapLastLapTime,
        ChannelId::LapCurrentLapTime,
        ChannelId::Throttle,
        ChannelId::Brake,
        ChannelId::Clutch,
        ChannelId::Gear,
        ChannelId::Rpm,
        ChannelId::SteeringWheelAngle,
        ChannelId::Lat,
        ChannelId::Lon,
        ChannelId::Alt,
    ];

    // Surface temperatures first, then carcass temperatures.
    for suffixes in [["tempL", "tempM", "tempR"], ["tempCL", "tempCM", "tempCR"]] {
        for corner in ["LF", "RF", "LR", "RR"] {
            for suffix in suffixes {
                channels.push(ChannelId::new(&format!("{corner}{suffix}")));
            }
        }
    }
    for corner in ["LF", "RF", "LR", "RR"] {
        channels.push(ChannelId::new(&format!("{corner}coldPressure")));
    }

    channels.extend([ChannelId::FuelLevel, ChannelId::FuelLevelPct]);

    for suffix in ["rideHeight", "shockDefl", "shockVel"] {
        for corner in ["LF", "RF", "LR", "RR"] {
            channels.push(ChannelId::new(&format!("{corner}{suffix}")));
        }
    }

    channels.extend([
        ChannelId::LatAccel,
        ChannelId::LongAccel,
        ChannelId::VertAccel,
        ChannelId::Roll,
        ChannelId::Pitch,
        ChannelId::Yaw,
        ChannelId::new("RollRate"),
        ChannelId::new("PitchRate"),
        ChannelId::new("YawRate"),
        ChannelId::PlayerTrackSurface,
        ChannelId::OnPitRoad,
        ChannelId::PlayerCarMyIncidentCount,
    ]);

    channels
}

/// Equal-length sample columns keyed by channel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelTable {
    columns: BTreeMap<ChannelId, Vec<f64>>,
    sample_count: usize,
}

impl ChannelTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from columns, checking that every column has the same length.
    pub fn from_columns(
        columns: impl IntoIterator<Item = (ChannelId, Vec<f64>)>,
    ) -> Result<Self> {
        let mut table = ChannelTable::new();
        for (id, values) in columns {
            table.insert(id, values)?;
        }
        Ok(table)
    }

    /// Add or replace a column. The first column fixes the sample count.
    pub fn insert(&mut self, id: ChannelId, values: Vec<f64>) -> Result<()> {
        let replacing_only_column = self.columns.len() == 1 && self.columns.contains_key(&id);
        if !self.columns.is_empty() && !replacing_only_column && values.len() != self.sample_count
        {
            return Err(GarageError::parse(
                "Channel table",
                format!(
                    "channel '{}' has {} samples, expected {}",
                    id,
                    values.len(),
                    self.sample_count
                ),
            ));
        }
        self.sample_count = values.len();
        self.columns.insert(id, values);
        Ok(())
    }

    pub fn get(&self, id: &ChannelId) -> Option<&[f64]> {
        self.columns.get(id).map(Vec::as_slice)
    }

    pub fn has(&self, id: &ChannelId) -> bool {
        self.columns.contains_key(id)
    }

    /// The column for `id`, or [`GarageError::ChannelUnavailable`].
    pub fn require(&self, id: &ChannelId) -> Result<&[f64]> {
        self.get(id).ok_or_else(|| GarageError::channel_unavailable(id.as_str()))
    }

    pub fn value_at(&self, id: &ChannelId, index: usize) -> Option<f64> {
        self.columns.get(id).and_then(|column| column.get(index).copied())
    }

    pub fn sample_count(&self) -> usize {
        self.sample_count
    }

    pub fn channel_count(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty() || self.sample_count == 0
    }

    pub fn channel_ids(&self) -> impl Iterator<Item = &ChannelId> {
        self.columns.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ChannelId, &[f64])> {
        self.columns.iter().map(|(id, column)| (id, column.as_slice()))
    }

    /// Copy of every column restricted to `range` (clamped to the sample count).
    pub fn slice(&self, range: Range<usize>) -> ChannelTable {
        let end = range.end.min(self.sample_count);
        let start = range.start.min(end);
        ChannelTable {
            columns: self
                .columns
                .iter()
                .map(|(id, column)| (id.clone(), column[start..end].to_vec()))
                .collect(),
            sample_count: end - start,
        }
    }

    /// Keep only the listed channels.
    pub fn select(&self, ids: &[ChannelId]) -> ChannelTable {
        let columns: BTreeMap<_, _> = self
            .columns
            .iter()
            .filter(|(id, _)| ids.contains(id))
            .map(|(id, column)| (id.clone(), column.clone()))
            .collect();
        let sample_count = if columns.is_empty() { 0 } else { self.sample_count };
        ChannelTable { columns, sample_count }
    }

    /// Append one sample row; channels absent from `row` get NaN.
    pub fn push_row(&mut self, row: &BTreeMap<ChannelId, f64>) {
        for (id, value) in row {
            if !self.columns.contains_key(id) {
                self.columns.insert(id.clone(), vec![f64::NAN; self.sample_count]);
            }
            if let Some(column) = self.columns.get_mut(id) {
                column.push(*value);
            }
        }
        self.sample_count += 1;
        for column in self.columns.values_mut() {
            if column.len() < self.sample_count {
                column.push(f64::NAN);
            }
        }
    }
}

impl Serialize for ChannelTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.columns.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ChannelTable {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let columns = BTreeMap::<ChannelId, Vec<f64>>::deserialize(deserializer)?;
        ChannelTable::from_columns(columns).map_err(serde::de::Error::custom)
    }
}
