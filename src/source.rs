//! Telemetry sources consumed by the lap pipeline.
//!
//! The pipeline only needs a session info block and per-channel sample
//! columns. [`IbtReader`](crate::IbtReader) provides them from a recording on
//! disk; [`MemorySource`] provides them from data already in memory (live
//! capture, tests, re-processing of stored laps).

use std::path::{Path, PathBuf};

use crate::{ChannelId, ChannelTable, Result, yaml_utils};

/// Source of one session's metadata and channel data.
pub trait TelemetrySource {
    /// Path used in error messages and logs.
    fn source_path(&self) -> &Path;

    /// Preprocessed session info YAML, or `None` when the source has no block.
    fn session_yaml(&self) -> Result<Option<String>>;

    /// Columns for the requested channels. Channels the source does not
    /// record are omitted rather than reported as errors.
    fn read_channels(&self, channels: &[ChannelId]) -> Result<ChannelTable>;
}

/// A [`TelemetrySource`] over in-memory data.
#[derive(Debug, Clone)]
pub struct MemorySource {
    path: PathBuf,
    session_yaml: Option<String>,
    table: ChannelTable,
}

impl MemorySource {
    /// `session_yaml` is raw simulator text; it is preprocessed on read.
    pub fn new(session_yaml: Option<String>, table: ChannelTable) -> Self {
        Self { path: PathBuf::from("<memory>"), session_yaml, table }
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = path.into();
        self
    }

    pub fn table(&self) -> &ChannelTable {
        &self.table
    }
}

impl TelemetrySource for MemorySource {
    fn source_path(&self) -> &Path {
        &self.path
    }

    fn session_yaml(&self) -> Result<Option<String>> {
        match &self.session_yaml {
            Some(yaml) if !yaml.trim().is_empty() => {
                yaml_utils::preprocess_iracing_yaml(yaml).map(Some)
            }
            _ => Ok(None),
        }
    }

    fn read_channels(&self, channels: &[ChannelId]) -> Result<ChannelTable> {
        Ok(self.table.select(channels))
    }
}
