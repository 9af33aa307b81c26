//! Variable data parsing trait and implementations

use super::{VariableInfo, VariableType};
use crate::GarageError;

/// Trait for types that can be parsed from binary telemetry data.
pub trait VarData: Sized {
    /// Parse this type from binary data at the given offset.
    fn from_bytes(data: &[u8], info: &VariableInfo) -> crate::Result<Self>;
}

fn bytes_at<'a, const N: usize>(data: &'a [u8], info: &VariableInfo) -> crate::Result<[u8; N]> {
    data.get(info.offset..info.offset + N)
        .and_then(|slice| <[u8; N]>::try_from(slice).ok())
        .ok_or_else(|| {
            GarageError::parse(
                format!("Variable '{}'", info.name),
                format!(
                    "need {} bytes at offset {} but frame has {}",
                    N,
                    info.offset,
                    data.len()
                ),
            )
        })
}

fn expect_type(info: &VariableInfo, expected: &[VariableType]) -> crate::Result<()> {
    if expected.contains(&info.data_type) {
        Ok(())
    } else {
        Err(GarageError::TypeConversion {
            details: format!("Expected {:?} for '{}', got {:?}", expected, info.name, info.data_type),
        })
    }
}

impl VarData for f32 {
    fn from_bytes(data: &[u8], info: &VariableInfo) -> crate::Result<Self> {
        expect_type(info, &[VariableType::Float32])?;
        Ok(f32::from_le_bytes(bytes_at::<4>(data, info)?))
    }
}

impl VarData for f64 {
    fn from_bytes(data: &[u8], info: &VariableInfo) -> crate::Result<Self> {
        expect_type(info, &[VariableType::Float64])?;
        Ok(f64::from_le_bytes(bytes_at::<8>(data, info)?))
    }
}

impl VarData for i32 {
    fn from_bytes(data: &[u8], info: &VariableInfo) -> crate::Result<Self> {
        expect_type(info, &[VariableType::Int32])?;
        Ok(i32::from_le_bytes(bytes_at::<4>(data, info)?))
    }
}

impl VarData for u32 {
    fn from_bytes(data: &[u8], info: &VariableInfo) -> crate::Result<Self> {
        expect_type(info, &[VariableType::BitField])?;
        Ok(u32::from_le_bytes(bytes_at::<4>(data, info)?))
    }
}

impl VarData for u8 {
    fn from_bytes(data: &[u8], info: &VariableInfo) -> crate::Result<Self> {
        expect_type(info, &[VariableType::Char])?;
        Ok(bytes_at::<1>(data, info)?[0])
    }
}

impl VarData for bool {
    fn from_bytes(data: &[u8], info: &VariableInfo) -> crate::Result<Self> {
        expect_type(info, &[VariableType::Bool])?;
        Ok(bytes_at::<1>(data, info)?[0] != 0)
    }
}

/// Decode a scalar variable of any irsdk type, widened to `f64`.
///
/// Booleans become 0.0 / 1.0 so every channel can share one numeric column type.
pub fn decode_f64(data: &[u8], info: &VariableInfo) -> crate::Result<f64> {
    match info.data_type {
        VariableType::Float32 => f32::from_bytes(data, info).map(f64::from),
        VariableType::Float64 => f64::from_bytes(data, info),
        VariableType::Int32 => i32::from_bytes(data, info).map(f64::from),
        VariableType::BitField => u32::from_bytes(data, info).map(f64::from),
        VariableType::Char => u8::from_bytes(data, info).map(f64::from),
        VariableType::Bool => bool::from_bytes(data, info).map(|b| if b { 1.0 } else { 0.0 }),
    }
}
