//! Test utilities for building IBT recordings in memory
//!
//! [`IbtBuilder`] writes a complete, valid IBT file (header, disk sub-header,
//! variable headers, session info and frames) so reader and pipeline tests
//! run against real bytes without external fixtures.

#![cfg(any(test, feature = "benchmark"))]

use crate::VariableType;
use crate::ibt::format::{
    IRSDK_DISK_SUBHEADER_SIZE, IRSDK_HEADER_SIZE, IRSDK_VAR_DESC_SIZE, IRSDK_VAR_HEADER_SIZE,
    IRSDK_VAR_NAME_SIZE, IRSDK_VAR_UNIT_SIZE, VAR_COUNT_AS_TIME_OFFSET, VAR_COUNT_OFFSET,
    VAR_DESC_OFFSET, VAR_NAME_OFFSET, VAR_OFFSET_OFFSET, VAR_TYPE_OFFSET, VAR_UNIT_OFFSET,
};
use std::path::{Path, PathBuf};

struct BuilderVar {
    name: String,
    data_type: VariableType,
    units: String,
    count: usize,
    values: Vec<f64>,
}

/// Builder for synthetic IBT files.
pub struct IbtBuilder {
    version: i32,
    tick_rate: i32,
    session_yaml: Option<Vec<u8>>,
    vars: Vec<BuilderVar>,
    lap_count: i32,
    record_count: Option<i32>,
    write_buf_offset: bool,
    trailing_bytes: usize,
}

impl Default for IbtBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl IbtBuilder {
    pub fn new() -> Self {
        Self {
            version: 2,
            tick_rate: 60,
            session_yaml: None,
            vars: Vec::new(),
            lap_count: 0,
            record_count: None,
            write_buf_offset: true,
            trailing_bytes: 0,
        }
    }

    pub fn version(mut self, version: i32) -> Self {
        self.version = version;
        self
    }

    pub fn tick_rate(mut self, tick_rate: i32) -> Self {
        self.tick_rate = tick_rate;
        self
    }

    pub fn session_yaml(self, yaml: &str) -> Self {
        self.session_yaml_bytes(yaml.as_bytes())
    }

    /// Session info written verbatim (e.g. Windows-1252 text).
    pub fn session_yaml_bytes(mut self, bytes: &[u8]) -> Self {
        self.session_yaml = Some(bytes.to_vec());
        self
    }

    /// Add a scalar channel. All channels must have the same number of samples.
    pub fn channel(
        mut self,
        name: &str,
        data_type: VariableType,
        units: &str,
        values: impl IntoIterator<Item = f64>,
    ) -> Self {
        self.vars.push(BuilderVar {
            name: name.to_string(),
            data_type,
            units: units.to_string(),
            count: 1,
            values: values.into_iter().collect(),
        });
        self
    }

    /// Add an array variable (e.g. per-car data); every element is zero.
    pub fn array_variable(mut self, name: &str, data_type: VariableType, count: usize) -> Self {
        self.vars.push(BuilderVar {
            name: name.to_string(),
            data_type,
            units: String::new(),
            count,
            values: Vec::new(),
        });
        self
    }

    pub fn lap_count(mut self, laps: i32) -> Self {
        self.lap_count = laps;
        self
    }

    /// Override the record count written to the disk sub-header.
    pub fn record_count(mut self, records: i32) -> Self {
        self.record_count = Some(records);
        self
    }

    /// Leave `varBuf[0].bufOffset` at zero so readers must compute the frame start.
    pub fn without_buf_offset(mut self) -> Self {
        self.write_buf_offset = false;
        self
    }

    /// Append garbage after the last whole frame (a partially written record).
    pub fn trailing_bytes(mut self, len: usize) -> Self {
        self.trailing_bytes = len;
        self
    }

    fn frame_count(&self) -> usize {
        self.vars.iter().filter(|v| v.count == 1).map(|v| v.values.len()).max().unwrap_or(0)
    }

    pub fn build(&self) -> Vec<u8> {
        let mut offsets = Vec::with_capacity(self.vars.len());
        let mut buf_len = 0usize;
        for var in &self.vars {
            offsets.push(buf_len);
            buf_len += var.data_type.size() * var.count;
        }

        let var_header_offset = IRSDK_HEADER_SIZE + IRSDK_DISK_SUBHEADER_SIZE;
        let session_info_offset = var_header_offset + self.vars.len() * IRSDK_VAR_HEADER_SIZE;
        let session_info_len = self.session_yaml.as_ref().map_or(0, |yaml| yaml.len() + 1);
        let frame_start = session_info_offset + session_info_len;
        let frames = self.frame_count();

        let mut data = vec![0u8; frame_start];
        put_i32(&mut data, 0, self.version);
        put_i32(&mut data, 4, 1);
        put_i32(&mut data, 8, self.tick_rate);
        put_i32(&mut data, 12, 1);
        put_i32(&mut data, 16, session_info_len as i32);
        put_i32(&mut data, 20, session_info_offset as i32);
        put_i32(&mut data, 24, self.vars.len() as i32);
        put_i32(&mut data, 28, var_header_offset as i32);
        put_i32(&mut data, 32, 1);
        put_i32(&mut data, 36, buf_len as i32);
        put_i32(&mut data, 48, frames as i32);
        if self.write_buf_offset {
            put_i32(&mut data, 52, frame_start as i32);
        }

        let disk = IRSDK_HEADER_SIZE;
        data[disk..disk + 8].copy_from_slice(&1_760_000_000i64.to_le_bytes());
        data[disk + 8..disk + 16].copy_from_slice(&0.0f64.to_le_bytes());
        let end_time = frames as f64 / self.tick_rate.max(1) as f64;
        data[disk + 16..disk + 24].copy_from_slice(&end_time.to_le_bytes());
        put_i32(&mut data, disk + 24, self.lap_count);
        put_i32(&mut data, disk + 28, self.record_count.unwrap_or(frames as i32));

        for (i, var) in self.vars.iter().enumerate() {
            let base = var_header_offset + i * IRSDK_VAR_HEADER_SIZE;
            put_i32(&mut data, base + VAR_TYPE_OFFSET, var.data_type.irsdk_code());
            put_i32(&mut data, base + VAR_OFFSET_OFFSET, offsets[i] as i32);
            put_i32(&mut data, base + VAR_COUNT_OFFSET, var.count as i32);
            data[base + VAR_COUNT_AS_TIME_OFFSET] = 0;
            put_str(&mut data, base + VAR_NAME_OFFSET, IRSDK_VAR_NAME_SIZE, &var.name);
            put_str(&mut data, base + VAR_DESC_OFFSET, IRSDK_VAR_DESC_SIZE, &var.name);
            put_str(&mut data, base + VAR_UNIT_OFFSET, IRSDK_VAR_UNIT_SIZE, &var.units);
        }

        if let Some(yaml) = &self.session_yaml {
            data[session_info_offset..session_info_offset + yaml.len()].copy_from_slice(yaml);
        }

        for frame in 0..frames {
            let mut record = vec![0u8; buf_len];
            for (var, offset) in self.vars.iter().zip(&offsets) {
                if var.count != 1 {
                    continue;
                }
                let value = var.values.get(frame).copied().unwrap_or(0.0);
                encode(&mut record[*offset..], var.data_type, value);
            }
            data.extend_from_slice(&record);
        }

        data.extend(std::iter::repeat_n(0xAB, self.trailing_bytes));
        data
    }

    /// Write the file into `dir` and return its path.
    pub fn write_to(&self, dir: &Path, file_name: &str) -> std::io::Result<PathBuf> {
        let path = dir.join(file_name);
        std::fs::write(&path, self.build())?;
        Ok(path)
    }
}

fn put_i32(data: &mut [u8], offset: usize, value: i32) {
    data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

fn put_str(data: &mut [u8], offset: usize, size: usize, value: &str) {
    let bytes = value.as_bytes();
    let len = bytes.len().min(size - 1);
    data[offset..offset + len].copy_from_slice(&bytes[..len]);
}

fn encode(out: &mut [u8], data_type: VariableType, value: f64) {
    match data_type {
        VariableType::Char => out[0] = value as u8,
        VariableType::Bool => out[0] = u8::from(value != 0.0),
        VariableType::Int32 => out[..4].copy_from_slice(&(value as i32).to_le_bytes()),
        VariableType::BitField => out[..4].copy_from_slice(&(value as u32).to_le_bytes()),
        VariableType::Float32 => out[..4].copy_from_slice(&(value as f32).to_le_bytes()),
        VariableType::Float64 => out[..8].copy_from_slice(&value.to_le_bytes()),
    }
}

/// Session info as the simulator writes it, including an unquoted driver name
/// with an apostrophe and a numeric track configuration.
pub fn sample_session_yaml() -> String {
    session_yaml_for("Lime Rock Park", "Global Mazda MX-5 Cup", "Practice")
}

/// Session info for a given track, car and session type.
pub fn session_yaml_for(track: &str, car: &str, session_type: &str) -> String {
    format!(
        "---
WeekendInfo:
 TrackName: limerock
 TrackID: 261
 TrackLength: 2.44 km
 TrackDisplayName: {track}
 TrackConfigName: 2008
 TrackWeatherType: Static
 TrackSkies: Partly Cloudy
 TrackSurfaceTemp: 33.15 C
 TrackAirTemp: 24.32 C

SessionInfo:
 CurrentSessionNum: 0
 Sessions:
 - SessionNum: 0
   SessionLaps: unlimited
   SessionTime: unlimited
   SessionType: Offline Testing
 - SessionNum: 1
   SessionLaps: unlimited
   SessionTime: 1800.0000 sec
   SessionType: {session_type}

SplitTimeInfo:
 Sectors:
 - SectorNum: 0
   SectorStartPct: 0.000000
 - SectorNum: 1
   SectorStartPct: 0.333333
 - SectorNum: 2
   SectorStartPct: 0.666667

DriverInfo:
 DriverCarIdx: 1
 DriverSetupName: baseline.sto
 Drivers:
 - CarIdx: 0
   UserName: Pace Car
   CarScreenName: safety pcporsche911cup
   CarClassShortName:
 - CarIdx: 1
   UserName: Siobhan O'Reilly
   AbbrevName: O'Reilly, S
   TeamName: Ridgway Garage: Blue
   CarScreenName: {car}
   CarClassShortName: MX5 Cup
   CarDesignStr: ,ff0000,000000
"
    )
}
