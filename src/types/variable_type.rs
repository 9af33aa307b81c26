//! Element types of IBT variables

use serde::{Deserialize, Serialize};

/// Element type of a recorded variable, in `irsdk_VarType` order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VariableType {
    Char,
    Bool,
    Int32,
    BitField,
    Float32,
    Float64,
}

const BY_CODE: [VariableType; 6] = [
    VariableType::Char,
    VariableType::Bool,
    VariableType::Int32,
    VariableType::BitField,
    VariableType::Float32,
    VariableType::Float64,
];

impl VariableType {
    /// Width of one element in bytes.
    pub const fn size(&self) -> usize {
        match self {
            Self::Char | Self::Bool => 1,
            Self::Int32 | Self::BitField | Self::Float32 => 4,
            Self::Float64 => 8,
        }
    }

    /// Map the `type` field of a variable header. Unknown codes yield `None`.
    pub fn from_irsdk(code: i32) -> Option<Self> {
        usize::try_from(code).ok().and_then(|index| BY_CODE.get(index).copied())
    }

    pub const fn irsdk_code(&self) -> i32 {
        *self as i32
    }
}
