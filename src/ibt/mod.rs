//! IBT file reading and parsing support (cross-platform)
//!
//! This module reads iRacing's IBT (telemetry) recordings and exposes them as
//! a [`TelemetrySource`](crate::TelemetrySource) for the lap pipeline.

pub mod format;
pub mod reader;

pub use reader::IbtReader;
