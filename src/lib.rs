//! Lap pipeline for iRacing telemetry recordings.
//!
//! Garage turns an uploaded IBT file into laps: it reads the binary
//! container and its session YAML, splits the sample stream into laps,
//! validates and aggregates each lap, and keeps one personal best per
//! driver, track and car.
//!
//! # Features
//!
//! - **Cross-platform IBT**: header, variable table, session YAML and frames
//! - **Lap rules**: minimum duration, off-track, incidents, in-laps, resets
//! - **Personal bests**: keyed, serialised reconciliation over a [`pb::LapStore`]
//! - **Live laps**: the same rules applied to a streaming sample source
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use garage::pipeline::LapPipeline;
//!
//! fn main() -> garage::Result<()> {
//!     let session = LapPipeline::default().process_file("/uploads/limerock.ibt")?;
//!     println!("{:?} in {:?}", session.context.track_name, session.context.car_name);
//!     for lap in &session.laps {
//!         println!("lap {} {} valid={}", lap.lap_number(), lap.lap_time(), lap.is_valid());
//!     }
//!     Ok(())
//! }
//! ```

// Core types and error handling
mod channels;
mod error;
mod source;
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod types;
pub mod yaml_utils;

// Data source modules
pub mod ibt;
pub mod metadata;

// Lap processing
pub mod config;
pub mod jobs;
pub mod laps;
pub mod live;
pub mod pb;
pub mod pipeline;

// Core exports
pub use channels::{ChannelId, ChannelTable, default_channels};
pub use error::*;
pub use source::{MemorySource, TelemetrySource};
pub use types::*;

// Data source exports
pub use ibt::IbtReader;
pub use metadata::{SessionContext, SessionInfo, SessionType, TrackId};

// Main API exports
pub use config::PipelineConfig;
pub use jobs::{JobReport, JobRunner, ProcessingStatus, SessionRecord};
pub use pb::{LapStore, MemoryLapStore, PbOutcome};
pub use pipeline::{LapPipeline, LapRecord, ProcessedLap, ProcessedSession, TelemetryBlob};

use std::path::PathBuf;
use std::sync::Arc;

/// Async entry point for processing uploads.
///
/// Parsing is CPU and file bound, so each job runs on tokio's blocking pool.
///
/// ```rust,no_run
/// use garage::{Garage, MemoryLapStore, PipelineConfig};
/// use std::sync::Arc;
///
/// # #[tokio::main]
/// # async fn main() -> garage::Result<()> {
/// let garage = Garage::new(PipelineConfig::default(), Arc::new(MemoryLapStore::new()))?;
/// let session = garage.submit("ana", "/uploads/limerock.ibt")?;
/// let report = garage.process_session(session, "/uploads/limerock.ibt").await?;
/// println!("new personal best: {}", report.personal_best.is_new_pb);
/// # Ok(())
/// # }
/// ```
pub struct Garage<S: ?Sized = dyn LapStore> {
    runner: JobRunner<S>,
}

impl<S: LapStore + ?Sized + 'static> Garage<S> {
    pub fn new(config: PipelineConfig, store: Arc<S>) -> Result<Self> {
        Ok(Self { runner: JobRunner::new(LapPipeline::new(config)?, store) })
    }

    pub fn store(&self) -> &Arc<S> {
        self.runner.store()
    }

    pub fn runner(&self) -> &JobRunner<S> {
        &self.runner
    }

    /// Register an upload as a pending session.
    pub fn submit(&self, driver: &str, path: impl Into<PathBuf>) -> Result<pb::SessionId> {
        self.runner.submit(driver, path.into())
    }

    /// Process a pending session on the blocking pool.
    pub async fn process_session(
        &self,
        session: pb::SessionId,
        path: impl Into<PathBuf>,
    ) -> Result<JobReport> {
        let runner = self.runner.clone();
        let path = path.into();
        tokio::task::spawn_blocking(move || runner.run(session, path))
            .await
            .map_err(|e| GarageError::Task { details: e.to_string() })?
    }
}

impl<S: ?Sized> Clone for Garage<S> {
    fn clone(&self) -> Self {
        Self { runner: self.runner.clone() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{IbtBuilder, sample_session_yaml};
    use anyhow::Result;

    fn recording() -> IbtBuilder {
        let mut lap = vec![0.0; 60];
        lap.extend(vec![1.0; 900]);
        let time: Vec<f64> = (0..lap.len()).map(|i| i as f64 / 60.0).collect();
        IbtBuilder::new()
            .session_yaml(&sample_session_yaml())
            .channel("Lap", VariableType::Int32, "", lap)
            .channel("SessionTime", VariableType::Float64, "s", time)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn processes_session_on_blocking_pool() -> Result<()> {
        let _ = tracing_subscriber::fmt::try_init();
        let dir = tempfile::tempdir()?;
        let path = recording().write_to(dir.path(), "limerock.ibt")?;

        let garage = Garage::new(PipelineConfig::default(), Arc::new(MemoryLapStore::new()))?;
        let id = garage.submit("ana", &path)?;
        let report = garage.process_session(id, &path).await?;

        assert_eq!(report.processed.laps.len(), 1);
        assert!(report.personal_best.is_new_pb);
        assert_eq!(garage.store().session(id)?.status, ProcessingStatus::Completed);
        Ok(())
    }

    #[tokio::test]
    async fn trait_object_store() -> Result<()> {
        let store: Arc<dyn LapStore> = Arc::new(MemoryLapStore::new());
        let garage: Garage = Garage::new(PipelineConfig::default(), store)?;
        let id = garage.submit("ana", "/nonexistent/session.ibt")?;

        let error = garage.process_session(id, "/nonexistent/session.ibt").await.unwrap_err();
        assert!(error.is_fatal());
        assert_eq!(garage.store().session(id)?.status, ProcessingStatus::Failed);
        Ok(())
    }
}
