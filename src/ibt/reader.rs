//! IBT file reader
//!
//! Loads an IBT recording into memory, validates its headers and exposes the
//! session info block and per-channel sample columns.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use garage::{ChannelId, IbtReader, TelemetrySource};
//!
//! fn read_laps() -> garage::Result<()> {
//!     let reader = IbtReader::open("telemetry.ibt")?;
//!     println!("File contains {} frames", reader.total_frames());
//!
//!     let table = reader.read_channels(&[ChannelId::Lap, ChannelId::Speed])?;
//!     if let Some(laps) = table.get(&ChannelId::Lap) {
//!         println!("Last lap index: {:?}", laps.last());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Performance Notes
//!
//! - File data is loaded into memory at construction time for fast random access
//! - Channel extraction is one pass over the frames per requested channel

use super::format::{
    IRSDK_DISK_SUBHEADER_SIZE, IRSDK_HEADER_SIZE, IbtDiskSubHeader, IbtHeader,
    extract_variable_schema, verify_min_length,
};
use crate::{
    ChannelId, ChannelTable, GarageError, Result, TelemetrySource, VariableSchema, decode_f64,
    yaml_utils,
};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// In-memory IBT recording
pub struct IbtReader {
    data: Vec<u8>,
    path: PathBuf,
    header: IbtHeader,
    disk_header: IbtDiskSubHeader,
    variable_schema: VariableSchema,
    total_frames: usize,
    frame_data_start: usize,
}

impl IbtReader {
    /// Open an IBT file for reading
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut file = File::open(path).map_err(|e| GarageError::io(path, e))?;

        let mut data = Vec::new();
        file.read_to_end(&mut data).map_err(|e| GarageError::io(path, e))?;

        Self::from_bytes_with_path(data, path.to_path_buf())
    }

    /// Create IbtReader from bytes
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Self::from_bytes_with_path(data.to_vec(), PathBuf::from("<memory>"))
    }

    /// Parse headers and schema; every failure is reported as unreadable with the path.
    fn from_bytes_with_path(data: Vec<u8>, path: PathBuf) -> Result<Self> {
        if data.len() < IRSDK_HEADER_SIZE + IRSDK_DISK_SUBHEADER_SIZE {
            return Err(GarageError::unreadable(
                path,
                Some(data.len()),
                format!(
                    "file is {} bytes, shorter than the {}-byte header",
                    data.len(),
                    IRSDK_HEADER_SIZE + IRSDK_DISK_SUBHEADER_SIZE
                ),
            ));
        }

        let mut cursor = std::io::Cursor::new(data.as_slice());

        let header = IbtHeader::parse_from_reader(&mut cursor)
            .and_then(|header| header.validate().map(|_| header))
            .map_err(|e| e.into_unreadable(&path, Some(0)))?;

        let disk_header = IbtDiskSubHeader::parse_from_reader(&mut cursor)
            .map_err(|e| e.into_unreadable(&path, Some(IRSDK_HEADER_SIZE)))?;

        verify_min_length(data.len() as u64, &header)
            .map_err(|e| e.into_unreadable(&path, Some(data.len())))?;

        let variable_schema = extract_variable_schema(&mut cursor, &header)
            .map_err(|e| e.into_unreadable(&path, Some(header.var_header_offset as usize)))?;

        let frame_data_start =
            header.frame_data_start().map_err(|e| e.into_unreadable(&path, None))?;

        let remaining_bytes = data.len().checked_sub(frame_data_start).ok_or_else(|| {
            GarageError::unreadable(
                &path,
                Some(frame_data_start),
                format!("frame data starts beyond end of file ({} bytes)", data.len()),
            )
        })?;

        let frame_size = header.buf_len as usize;
        let total_frames = if frame_size > 0 { remaining_bytes / frame_size } else { 0 };

        if frame_size > 0 && remaining_bytes % frame_size != 0 {
            warn!(
                path = %path.display(),
                "Ignoring {} trailing bytes of a partial frame",
                remaining_bytes % frame_size
            );
        }

        if disk_header.record_count > 0 && disk_header.record_count as usize != total_frames {
            warn!(
                path = %path.display(),
                "Frame count mismatch: disk header reports {} records, calculated {} frames from file size",
                disk_header.record_count, total_frames
            );
        }

        debug!(
            path = %path.display(),
            frames = total_frames,
            variables = variable_schema.variable_count(),
            "Opened IBT recording"
        );

        Ok(IbtReader {
            data,
            path,
            header,
            disk_header,
            variable_schema,
            total_frames,
            frame_data_start,
        })
    }

    /// Get the variable schema for this IBT file
    pub fn variables(&self) -> &VariableSchema {
        &self.variable_schema
    }

    /// Get total number of frames in the file
    pub fn total_frames(&self) -> usize {
        self.total_frames
    }

    /// Get the file path this reader was opened from
    pub fn file_path(&self) -> &Path {
        &self.path
    }

    /// Recording frequency, or 60Hz when the header value is invalid.
    pub fn tick_rate(&self) -> f64 {
        if self.header.tick_rate > 0 { self.header.tick_rate as f64 } else { 60.0 }
    }

    /// Get disk metadata from the disk sub-header
    pub fn disk_header(&self) -> &IbtDiskSubHeader {
        &self.disk_header
    }

    /// Get the IBT header information
    pub fn header(&self) -> &IbtHeader {
        &self.header
    }

    /// Raw bytes of one frame.
    pub fn frame(&self, index: usize) -> Option<&[u8]> {
        if index >= self.total_frames {
            return None;
        }
        let frame_size = self.header.buf_len as usize;
        let start = self.frame_data_start + index * frame_size;
        self.data.get(start..start + frame_size)
    }

    /// Decode one scalar variable across every frame.
    ///
    /// Returns `Ok(None)` when the file does not record the channel or records
    /// it as an array.
    pub fn read_channel(&self, id: &ChannelId) -> Result<Option<Vec<f64>>> {
        let Some(info) = self.variable_schema.get_variable(id.as_str()) else {
            debug!(channel = %id, "Channel not in telemetry data");
            return Ok(None);
        };
        if !info.is_scalar() {
            debug!(channel = %id, count = info.count, "Skipping array channel");
            return Ok(None);
        }

        let mut column = Vec::with_capacity(self.total_frames);
        for index in 0..self.total_frames {
            let frame = self.frame(index).ok_or_else(|| {
                GarageError::unreadable(&self.path, None, format!("frame {} out of bounds", index))
            })?;
            let value = decode_f64(frame, info).map_err(|e| {
                let offset = self.frame_data_start + index * self.header.buf_len as usize;
                e.into_unreadable(&self.path, Some(offset + info.offset))
            })?;
            column.push(value);
        }
        Ok(Some(column))
    }
}

impl TelemetrySource for IbtReader {
    fn source_path(&self) -> &Path {
        &self.path
    }

    /// Session info block, decoded and preprocessed.
    fn session_yaml(&self) -> Result<Option<String>> {
        if self.header.session_info_len <= 0 || self.header.session_info_offset <= 0 {
            return Ok(None);
        }

        let raw_yaml = yaml_utils::extract_yaml_from_memory(
            &self.data,
            self.header.session_info_offset,
            self.header.session_info_len,
        )
        .map_err(|e| e.into_unreadable(&self.path, Some(self.header.session_info_offset as usize)))?;

        if raw_yaml.trim().is_empty() {
            return Ok(None);
        }

        yaml_utils::preprocess_iracing_yaml(&raw_yaml).map(Some)
    }

    fn read_channels(&self, channels: &[ChannelId]) -> Result<ChannelTable> {
        let mut table = ChannelTable::new();
        for id in channels {
            if table.has(id) {
                continue;
            }
            if let Some(column) = self.read_channel(id)? {
                table.insert(id.clone(), column)?;
            }
        }
        debug!(
            path = %self.path.display(),
            requested = channels.len(),
            extracted = table.channel_count(),
            "Extracted telemetry channels"
        );
        Ok(table)
    }
}
