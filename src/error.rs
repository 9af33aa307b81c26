//! Error types for the lap pipeline.
//!
//! All errors implement `std::error::Error` and carry enough context (file path,
//! byte offset, lap number, session id) to be logged and attached to a failed
//! processing job.
//!
//! ## Error Categories
//!
//! - **Fatal parse errors**: the file cannot be read or has no session metadata.
//!   No partial results are produced.
//! - **Recoverable errors**: a missing channel or a malformed lap. The affected
//!   rule or lap is skipped and processing continues.
//! - **Store and job errors**: lap store failures and invalid status transitions.
//!
//! ```rust
//! use garage::GarageError;
//! use std::path::PathBuf;
//!
//! let error = GarageError::metadata_missing(PathBuf::from("/uploads/session.ibt"));
//! assert!(error.is_fatal());
//! for suggestion in error.recovery_suggestions() {
//!     println!("  - {}", suggestion);
//! }
//! ```

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type alias for pipeline operations.
pub type Result<T, E = GarageError> = std::result::Result<T, E>;

/// Main error type for the lap pipeline.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum GarageError {
    #[error("Unreadable telemetry file {path}{}: {reason}", offset_suffix(.offset))]
    UnreadableFile {
        path: PathBuf,
        offset: Option<usize>,
        reason: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("No session metadata block found in {path}")]
    MetadataMissing { path: PathBuf },

    #[error("Channel '{channel}' not available in telemetry data")]
    ChannelUnavailable { channel: String },

    #[error("IBT version mismatch: expected {expected}, found {found}")]
    Version { expected: i32, found: i32 },

    #[error("Parse error in {context}: {details}")]
    Parse { context: String, details: String },

    #[error("Type conversion error: {details}")]
    TypeConversion { details: String },

    #[error("Malformed lap {lap}: {details}")]
    MalformedLap { lap: String, details: String },

    #[error("Session {session} not found")]
    SessionNotFound { session: u64 },

    #[error("Session {session} cannot move from {from} to {to}")]
    InvalidTransition { session: u64, from: &'static str, to: &'static str },

    #[error("Lap store error in {context}: {details}")]
    Store { context: String, details: String },

    #[error("Invalid configuration: {details}")]
    Config {
        details: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Background task failed: {details}")]
    Task { details: String },
}

fn offset_suffix(offset: &Option<usize>) -> String {
    match offset {
        Some(offset) => format!(" at byte {offset:#x}"),
        None => String::new(),
    }
}

impl GarageError {
    /// Returns whether this error aborts the whole file.
    pub fn is_fatal(&self) -> bool {
        match self {
            GarageError::UnreadableFile { .. } => true,
            GarageError::MetadataMissing { .. } => true,
            GarageError::Version { .. } => true,
            GarageError::Parse { .. } => true,
            GarageError::TypeConversion { .. } => true,
            GarageError::Config { .. } => true,
            GarageError::ChannelUnavailable { .. } => false,
            GarageError::MalformedLap { .. } => false,
            GarageError::SessionNotFound { .. } => true,
            GarageError::InvalidTransition { .. } => true,
            GarageError::Store { .. } => true,
            GarageError::Task { .. } => true,
        }
    }

    /// Returns whether this error is potentially recoverable through retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, GarageError::Store { .. } | GarageError::Task { .. })
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            GarageError::UnreadableFile { .. } | GarageError::Version { .. } => vec![
                "Check the upload completed and the file is not truncated",
                "Verify the file is an iRacing IBT recording",
                "Re-export the telemetry from the simulator",
            ],
            GarageError::MetadataMissing { .. } => vec![
                "Verify the recording contains session info",
                "Record a longer session so the simulator writes metadata",
            ],
            GarageError::ChannelUnavailable { .. } => vec![
                "Enable the channel in the simulator's telemetry settings",
                "Rules depending on this channel were skipped",
            ],
            GarageError::Parse { .. } | GarageError::TypeConversion { .. } => vec![
                "Check data format compatibility",
                "Verify source data integrity",
            ],
            GarageError::MalformedLap { .. } => vec![
                "The lap was skipped; remaining laps were processed",
                "Inspect the lap-index channel for non-contiguous values",
            ],
            GarageError::SessionNotFound { .. } | GarageError::InvalidTransition { .. } => vec![
                "Check the session id",
                "Requeue failed sessions before reprocessing them",
            ],
            GarageError::Store { .. } | GarageError::Task { .. } => vec![
                "Retry the job",
                "Check worker health",
            ],
            GarageError::Config { .. } => vec![
                "Check the configuration file syntax",
                "Compare against the documented defaults",
            ],
        }
    }

    /// Helper constructor for unreadable files.
    pub fn unreadable(path: impl Into<PathBuf>, offset: Option<usize>, reason: impl Into<String>) -> Self {
        GarageError::UnreadableFile { path: path.into(), offset, reason: reason.into(), source: None }
    }

    /// Helper constructor for I/O failures while opening or reading a file.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        GarageError::UnreadableFile {
            path: path.into(),
            offset: None,
            reason: source.to_string(),
            source: Some(source),
        }
    }

    /// Helper constructor for a missing session metadata block.
    pub fn metadata_missing(path: impl Into<PathBuf>) -> Self {
        GarageError::MetadataMissing { path: path.into() }
    }

    /// Helper constructor for missing channels.
    pub fn channel_unavailable(channel: impl Into<String>) -> Self {
        GarageError::ChannelUnavailable { channel: channel.into() }
    }

    /// Helper constructor for parse errors.
    pub fn parse(context: impl Into<String>, details: impl Into<String>) -> Self {
        GarageError::Parse { context: context.into(), details: details.into() }
    }

    /// Helper constructor for malformed laps.
    pub fn malformed_lap(lap: impl ToString, details: impl Into<String>) -> Self {
        GarageError::MalformedLap { lap: lap.to_string(), details: details.into() }
    }

    /// Helper constructor for lap store errors.
    pub fn store(context: impl Into<String>, details: impl Into<String>) -> Self {
        GarageError::Store { context: context.into(), details: details.into() }
    }

    /// Helper constructor for configuration errors.
    pub fn config(details: impl Into<String>) -> Self {
        GarageError::Config { details: details.into(), source: None }
    }

    /// Attach a file path to header and format errors.
    ///
    /// Parse and version errors raised while decoding the binary layout become
    /// `UnreadableFile` so callers always see the path. Other errors pass through.
    pub fn into_unreadable(self, path: &Path, offset: Option<usize>) -> Self {
        match self {
            GarageError::Parse { .. }
            | GarageError::Version { .. }
            | GarageError::TypeConversion { .. } => GarageError::UnreadableFile {
                path: path.to_path_buf(),
                offset,
                reason: self.to_string(),
                source: None,
            },
            GarageError::UnreadableFile { path: original, offset: known, reason, source }
                if original.as_os_str().is_empty() =>
            {
                GarageError::UnreadableFile {
                    path: path.to_path_buf(),
                    offset: known.or(offset),
                    reason,
                    source,
                }
            }
            other => other,
        }
    }
}
