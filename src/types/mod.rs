//! Core types for telemetry data representation.
//!
//! This module provides the foundational data structures for decoding recorded
//! telemetry and describing laps:
//! - [`VariableSchema`] describes the variables in one recording with O(1) lookup
//! - [`VariableType`] maps to iRacing's `irsdk_VarType` enum with size information
//! - [`VarData`] provides type-safe parsing from binary frame data
//! - [`LapTime`] is the fixed-point lap duration used for validation and personal bests
//! - [`track_surface`] holds the `PlayerTrackSurface` codes
//!
//! ## Usage Example
//!
//! ```rust
//! use garage::types::{VariableSchema, VariableInfo, VariableType, decode_f64};
//! use std::collections::HashMap;
//!
//! let mut variables = HashMap::new();
//! variables.insert("RPM".to_string(), VariableInfo {
//!     name: "RPM".to_string(),
//!     data_type: VariableType::Float32,
//!     offset: 0,
//!     count: 1,
//!     count_as_time: false,
//!     units: "revs/min".to_string(),
//!     description: "Engine RPM".to_string(),
//! });
//!
//! let schema = VariableSchema::new(variables, 4).unwrap();
//! let frame = 4500.0f32.to_le_bytes();
//!
//! let rpm = decode_f64(&frame, schema.get_variable("RPM").unwrap()).unwrap();
//! assert_eq!(rpm, 4500.0);
//! ```

mod lap_time;
mod schema;
pub mod track_surface;
mod var_data;
mod variable_type;

pub use lap_time::LapTime;
pub use schema::{VariableInfo, VariableSchema};
pub use var_data::{VarData, decode_f64};
pub use variable_type::VariableType;
