//! IBT file format structures and parsing
//!
//! Defines the binary structures used in iRacing's IBT file format
//! and provides parsing functions for cross-platform file reading.
//!
//! ## IBT File Structure
//!
//! IBT (iRacing Binary Telemetry) files contain recorded telemetry data from iRacing sessions:
//!
//! 1. **Main Header** (112 bytes) - `irsdk_header` compatible structure
//! 2. **Disk Sub-Header** (32 bytes) - IBT-specific metadata with timing and record counts
//! 3. **Variable Headers** - Array of 144-byte variable definitions
//! 4. **Session Info** - YAML session configuration
//! 5. **Frame Data** - Sequential fixed-width telemetry samples at `varBuf[0].bufOffset`
//!
//! All integers are little-endian.

use crate::{GarageError, Result, VariableInfo, VariableSchema, VariableType};
use std::collections::HashMap;
use std::io::{Read, Seek};
use tracing::{debug, trace};

// Size constants for IBT format structures
pub const IRSDK_HEADER_SIZE: usize = 112;
pub const IRSDK_DISK_SUBHEADER_SIZE: usize = 32;
pub const IRSDK_VAR_HEADER_SIZE: usize = 144;
pub const IRSDK_MAX_BUFS: usize = 4;
pub const IRSDK_VAR_NAME_SIZE: usize = 32;
pub const IRSDK_VAR_DESC_SIZE: usize = 64;
pub const IRSDK_VAR_UNIT_SIZE: usize = 32;
pub const IRSDK_VERSION: i32 = 2;

const VAR_BUF_TABLE_OFFSET: usize = 48;
const VAR_BUF_ENTRY_SIZE: usize = 16;

// Variable header field offsets
pub const VAR_TYPE_OFFSET: usize = 0;
pub const VAR_OFFSET_OFFSET: usize = 4;
pub const VAR_COUNT_OFFSET: usize = 8;
pub const VAR_COUNT_AS_TIME_OFFSET: usize = 12;
pub const VAR_NAME_OFFSET: usize = 16;
pub const VAR_DESC_OFFSET: usize = 48;
pub const VAR_UNIT_OFFSET: usize = 112;

/// One entry of the header's `varBuf` table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VarBuf {
    pub tick_count: i32,
    pub buf_offset: i32,
}

/// IBT file header structure (matches iRacing's irsdk_header)
#[derive(Debug, Clone)]
pub struct IbtHeader {
    pub version: i32,
    pub status: i32,
    pub tick_rate: i32,
    pub session_info_update: i32,
    pub session_info_len: i32,
    pub session_info_offset: i32,
    pub num_vars: i32,
    pub var_header_offset: i32,
    pub num_buf: i32,
    pub buf_len: i32,
    pub var_bufs: [VarBuf; IRSDK_MAX_BUFS],
}

/// IBT disk sub-header (IBT-specific structure)
/// struct irsdk_diskSubHeader {
///   time_t sessionStartDate;   // 8 bytes (i64)
///   double sessionStartTime;   // 8 bytes (f64)
///   double sessionEndTime;     // 8 bytes (f64)
///   int sessionLapCount;       // 4 bytes (i32)
///   int sessionRecordCount;    // 4 bytes (i32)
/// }
#[derive(Debug, Clone)]
pub struct IbtDiskSubHeader {
    pub start_date: i64,
    pub start_time: f64,
    pub end_time: f64,
    pub lap_count: i32,
    pub record_count: i32,
}

impl IbtHeader {
    /// Size of the irsdk_header structure in bytes
    pub const HEADER_SIZE: usize = IRSDK_HEADER_SIZE;

    pub fn parse_from_reader<R: Read>(reader: &mut R) -> Result<Self> {
        trace!("Reading IBT header ({} bytes)", IRSDK_HEADER_SIZE);
        let mut header_data = [0u8; IRSDK_HEADER_SIZE];
        reader.read_exact(&mut header_data).map_err(|e| {
            GarageError::parse(
                "IBT header reading",
                format!("Failed to read {} header bytes: {}", IRSDK_HEADER_SIZE, e),
            )
        })?;

        // struct irsdk_header {
        //   int ver;                    // offset 0
        //   int status;                 // offset 4
        //   int tickRate;               // offset 8
        //   int sessionInfoUpdate;      // offset 12
        //   int sessionInfoLen;         // offset 16
        //   int sessionInfoOffset;      // offset 20
        //   int numVars;                // offset 24
        //   int varHeaderOffset;        // offset 28
        //   int numBuf;                 // offset 32
        //   int bufLen;                 // offset 36
        //   int pad1[2];                // offset 40
        //   irsdk_varBuf varBuf[4];     // offset 48, 16 bytes each
        // }
        let version = parse_i32_le(&header_data, 0)?;
        let status = parse_i32_le(&header_data, 4)?;
        let tick_rate = parse_i32_le(&header_data, 8)?;
        let session_info_update = parse_i32_le(&header_data, 12)?;
        let session_info_len = parse_i32_le(&header_data, 16)?;
        let session_info_offset = parse_i32_le(&header_data, 20)?;
        let num_vars = parse_i32_le(&header_data, 24)?;
        let var_header_offset = parse_i32_le(&header_data, 28)?;
        let num_buf = parse_i32_le(&header_data, 32)?;
        let buf_len = parse_i32_le(&header_data, 36)?;

        let mut var_bufs = [VarBuf::default(); IRSDK_MAX_BUFS];
        for (i, var_buf) in var_bufs.iter_mut().enumerate() {
            let base = VAR_BUF_TABLE_OFFSET + i * VAR_BUF_ENTRY_SIZE;
            var_buf.tick_count = parse_i32_le(&header_data, base)?;
            var_buf.buf_offset = parse_i32_le(&header_data, base + 4)?;
        }

        debug!(
            "Parsed IBT header: version={}, tick_rate={}, num_vars={}, buf_len={}, buf_offset={}",
            version, tick_rate, num_vars, buf_len, var_bufs[0].buf_offset
        );

        Ok(Self {
            version,
            status,
            tick_rate,
            session_info_update,
            session_info_len,
            session_info_offset,
            num_vars,
            var_header_offset,
            num_buf,
            buf_len,
            var_bufs,
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.version != IRSDK_VERSION {
            return Err(GarageError::Version { expected: IRSDK_VERSION, found: self.version });
        }

        let non_negative = [
            (self.num_vars, "Number of variables"),
            (self.buf_len, "Buffer length"),
            (self.session_info_offset, "Session info offset"),
            (self.session_info_len, "Session info length"),
            (self.var_header_offset, "Variable header offset"),
            (self.var_bufs[0].buf_offset, "Frame data offset"),
        ];
        for (value, what) in non_negative {
            if value < 0 {
                return Err(GarageError::parse(
                    "Header validation",
                    format!("{} cannot be negative ({})", what, value),
                ));
            }
        }

        // Note: buf_len can be 0 in IBT files that contain only session info
        if self.buf_len > 100_000_000 {
            return Err(GarageError::parse(
                "Header validation",
                "Buffer length is unreasonably large",
            ));
        }

        if self.num_vars > 10_000 {
            return Err(GarageError::parse(
                "Header validation",
                "Number of variables is unreasonably large",
            ));
        }

        Ok(())
    }

    /// End of the variable header table.
    pub fn var_headers_end(&self) -> Result<usize> {
        (self.num_vars as usize)
            .checked_mul(IRSDK_VAR_HEADER_SIZE)
            .and_then(|len| len.checked_add(self.var_header_offset as usize))
            .ok_or_else(|| {
                GarageError::parse("Frame data calculation", "Variable headers end overflowed")
            })
    }

    /// Byte offset of the first telemetry frame.
    ///
    /// Uses `varBuf[0].bufOffset` when set, otherwise the first byte after both
    /// the variable headers and the session info block.
    pub fn frame_data_start(&self) -> Result<usize> {
        if self.var_bufs[0].buf_offset > 0 {
            return Ok(self.var_bufs[0].buf_offset as usize);
        }

        let var_headers_end = self.var_headers_end()?;
        let session_info_end = if self.session_info_len > 0 {
            (self.session_info_offset as usize)
                .checked_add(self.session_info_len as usize)
                .ok_or_else(|| {
                    GarageError::parse("Frame data calculation", "Session info end overflowed")
                })?
        } else {
            var_headers_end
        };

        Ok(session_info_end.max(var_headers_end))
    }
}

impl IbtDiskSubHeader {
    /// Size of the disk sub-header structure in bytes
    pub const DISK_HEADER_SIZE: usize = IRSDK_DISK_SUBHEADER_SIZE;

    pub fn parse_from_reader<R: Read>(reader: &mut R) -> Result<Self> {
        let mut disk_header_data = [0u8; IRSDK_DISK_SUBHEADER_SIZE];
        reader.read_exact(&mut disk_header_data).map_err(|e| {
            GarageError::parse(
                "IBT disk sub-header reading",
                format!(
                    "Failed to read {} disk sub-header bytes: {}",
                    IRSDK_DISK_SUBHEADER_SIZE, e
                ),
            )
        })?;

        let start_date = parse_i64_le(&disk_header_data, 0)?;
        let start_time = parse_f64_le(&disk_header_data, 8)?;
        let end_time = parse_f64_le(&disk_header_data, 16)?;
        let lap_count = parse_i32_le(&disk_header_data, 24)?;
        let record_count = parse_i32_le(&disk_header_data, 28)?;

        Ok(Self { start_date, start_time, end_time, lap_count, record_count })
    }
}

/// Extract variable schema from IBT file headers
pub fn extract_variable_schema<R: Read + Seek>(
    reader: &mut R,
    header: &IbtHeader,
) -> Result<VariableSchema> {
    debug!("Extracting variable schema for {} variables", header.num_vars);
    if header.buf_len == 0 || header.num_vars <= 0 {
        return Ok(VariableSchema::empty());
    }

    reader.seek(std::io::SeekFrom::Start(header.var_header_offset as u64)).map_err(|e| {
        GarageError::parse(
            "Variable headers seek",
            format!(
                "Failed to seek to variable headers at offset {}: {}",
                header.var_header_offset, e
            ),
        )
    })?;

    let num_vars = header.num_vars as usize;
    let mut variables = HashMap::with_capacity(num_vars);

    for i in 0..num_vars {
        let mut var_header_bytes = [0u8; IRSDK_VAR_HEADER_SIZE];
        reader.read_exact(&mut var_header_bytes).map_err(|e| {
            GarageError::parse(
                format!("Variable header {} reading", i),
                format!("Failed to read variable header {}: {}", i, e),
            )
        })?;

        let var_type = parse_i32_le(&var_header_bytes, VAR_TYPE_OFFSET)?;
        let offset = parse_i32_le(&var_header_bytes, VAR_OFFSET_OFFSET)?;
        let count = parse_i32_le(&var_header_bytes, VAR_COUNT_OFFSET)?;
        let count_as_time = var_header_bytes[VAR_COUNT_AS_TIME_OFFSET] != 0;

        let name = extract_null_terminated_string(
            &var_header_bytes[VAR_NAME_OFFSET..VAR_NAME_OFFSET + IRSDK_VAR_NAME_SIZE],
        );
        let desc = extract_null_terminated_string(
            &var_header_bytes[VAR_DESC_OFFSET..VAR_DESC_OFFSET + IRSDK_VAR_DESC_SIZE],
        );
        let unit = extract_null_terminated_string(
            &var_header_bytes[VAR_UNIT_OFFSET..VAR_UNIT_OFFSET + IRSDK_VAR_UNIT_SIZE],
        );

        if name.is_empty() || offset < 0 || count <= 0 {
            continue;
        }

        let Some(data_type) = VariableType::from_irsdk(var_type) else {
            debug!("Skipping variable '{}' with unknown type {}", name, var_type);
            continue;
        };

        variables.insert(
            name.clone(),
            VariableInfo {
                name,
                data_type,
                offset: offset as usize,
                count: count as usize,
                count_as_time,
                units: unit,
                description: desc,
            },
        );
    }

    debug!("Extracted {} variables with frame size {}", variables.len(), header.buf_len);
    VariableSchema::new(variables, header.buf_len as usize)
}

/// Verify that the file is long enough for its headers, session info and
/// the number of records the disk sub-header claims.
///
/// This is a lower bound; partial trailing frames are tolerated by the reader.
pub fn verify_min_length(file_len: u64, header: &IbtHeader) -> Result<()> {
    let var_headers_end = header.var_headers_end()? as u64;
    let session_info_end =
        (header.session_info_offset as u64).saturating_add(header.session_info_len as u64);
    let min_end = var_headers_end.max(session_info_end);

    if file_len < min_end {
        return Err(GarageError::parse(
            "IBT length verification",
            format!(
                "File too small: len={} < required_min={} (vars={}, session_info_len={})",
                file_len, min_end, header.num_vars, header.session_info_len
            ),
        ));
    }
    Ok(())
}

/// Safe byte parsing helpers with bounds checking
fn parse_bytes<const N: usize>(data: &[u8], offset: usize, what: &str) -> Result<[u8; N]> {
    data.get(offset..offset + N).and_then(|slice| <[u8; N]>::try_from(slice).ok()).ok_or_else(
        || {
            GarageError::parse(
                format!("{} parsing", what),
                format!(
                    "Insufficient data at offset {} (need {} bytes, have {})",
                    offset,
                    N,
                    data.len().saturating_sub(offset)
                ),
            )
        },
    )
}

fn parse_i32_le(data: &[u8], offset: usize) -> Result<i32> {
    parse_bytes::<4>(data, offset, "Integer").map(i32::from_le_bytes)
}

fn parse_i64_le(data: &[u8], offset: usize) -> Result<i64> {
    parse_bytes::<8>(data, offset, "Long integer").map(i64::from_le_bytes)
}

fn parse_f64_le(data: &[u8], offset: usize) -> Result<f64> {
    parse_bytes::<8>(data, offset, "Double precision float").map(f64::from_le_bytes)
}

/// Extract null-terminated string from byte slice
fn extract_null_terminated_string(bytes: &[u8]) -> String {
    let null_pos = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..null_pos]).to_string()
}
