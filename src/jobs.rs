//! Session processing jobs.
//!
//! Each uploaded recording has a [`SessionRecord`] whose status moves
//! `Pending → Processing → Completed` or `Pending → Processing → Failed`.
//! [`JobRunner::run`] drives one record through those states: parse, store
//! laps and telemetry, reconcile personal bests, complete. Any error marks the
//! record failed with its (truncated) message before being returned.
//!
//! Retrying is the scheduler's concern; [`requeue`] moves a failed record back
//! to pending for it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{error, info};

use crate::metadata::SessionContext;
use crate::pb::{LapStore, PbKey, PbOutcome, SessionId, reconcile};
use crate::pipeline::{LapPipeline, ProcessedSession};
use crate::{GarageError, Result};

/// Processing state of a session record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStatus::Pending => "pending",
            ProcessingStatus::Processing => "processing",
            ProcessingStatus::Completed => "completed",
            ProcessingStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ProcessingStatus::Completed | ProcessingStatus::Failed)
    }

    /// Forward moves of a single job, plus `Failed → Pending` for a retry.
    pub fn can_transition_to(&self, next: ProcessingStatus) -> bool {
        use ProcessingStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Failed, Pending)
        )
    }
}

impl fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One uploaded recording and what processing made of it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: SessionId,
    /// Uploading driver; personal bests are tracked per driver.
    pub driver: String,
    pub file_path: PathBuf,
    pub status: ProcessingStatus,
    pub error_message: Option<String>,
    pub started_at: Option<SystemTime>,
    pub completed_at: Option<SystemTime>,
    pub context: Option<SessionContext>,
    pub skipped_laps: usize,
}

impl SessionRecord {
    pub fn new(driver: impl Into<String>, file_path: impl Into<PathBuf>) -> Self {
        Self { driver: driver.into(), file_path: file_path.into(), ..Self::default() }
    }

    /// Personal-best key; `None` until track and car are known.
    pub fn pb_key(&self) -> Option<PbKey> {
        let context = self.context.as_ref()?;
        Some(PbKey {
            driver: self.driver.clone(),
            track: context.track_id()?,
            car: context.car_name.clone()?,
        })
    }

    /// Move to `next`, or fail with [`GarageError::InvalidTransition`].
    pub fn transition(&mut self, next: ProcessingStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(GarageError::InvalidTransition {
                session: self.id,
                from: self.status.as_str(),
                to: next.as_str(),
            });
        }
        self.status = next;
        Ok(())
    }
}

/// Cut `message` to at most `limit` characters.
pub fn truncate_message(message: &str, limit: usize) -> String {
    match message.char_indices().nth(limit) {
        Some((end, _)) => message[..end].to_string(),
        None => message.to_string(),
    }
}

/// What a completed job produced.
#[derive(Debug, Clone)]
pub struct JobReport {
    pub session: SessionId,
    pub processed: ProcessedSession,
    pub personal_best: PbOutcome,
}

/// Runs processing jobs against a lap store.
#[derive(Debug)]
pub struct JobRunner<S: ?Sized> {
    pipeline: LapPipeline,
    store: Arc<S>,
}

impl<S: ?Sized> Clone for JobRunner<S> {
    fn clone(&self) -> Self {
        Self { pipeline: self.pipeline.clone(), store: Arc::clone(&self.store) }
    }
}

impl<S: LapStore + ?Sized> JobRunner<S> {
    pub fn new(pipeline: LapPipeline, store: Arc<S>) -> Self {
        Self { pipeline, store }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn pipeline(&self) -> &LapPipeline {
        &self.pipeline
    }

    /// Create a pending session record for an upload.
    pub fn submit(&self, driver: &str, path: impl AsRef<Path>) -> Result<SessionId> {
        let id = self.store.insert_session(SessionRecord::new(driver, path.as_ref()))?;
        info!(session = id, path = %path.as_ref().display(), "Session queued");
        Ok(id)
    }

    /// Process the session's recording at `path`.
    pub fn run(&self, session: SessionId, path: impl AsRef<Path>) -> Result<JobReport> {
        let path = path.as_ref();
        self.store.update_session(session, &mut |record| {
            record.transition(ProcessingStatus::Processing)?;
            record.file_path = path.to_path_buf();
            record.started_at = Some(SystemTime::now());
            record.error_message = None;
            record.completed_at = None;
            Ok(())
        })?;
        info!(session, path = %path.display(), "Processing session");

        match self.process(session, path) {
            Ok(report) => {
                self.store.update_session(session, &mut |record| {
                    record.transition(ProcessingStatus::Completed)?;
                    record.completed_at = Some(SystemTime::now());
                    Ok(())
                })?;
                info!(
                    session,
                    laps = report.processed.laps.len(),
                    new_pb = report.personal_best.is_new_pb,
                    "Processing complete"
                );
                Ok(report)
            }
            Err(err) => {
                let message =
                    truncate_message(&err.to_string(), self.pipeline.config().error_message_limit);
                error!(
                    session,
                    error = %message,
                    fatal = err.is_fatal(),
                    retryable = err.is_retryable(),
                    "Processing failed"
                );
                for suggestion in err.recovery_suggestions() {
                    info!(session, suggestion, "Recovery suggestion");
                }
                self.store.update_session(session, &mut |record| {
                    record.transition(ProcessingStatus::Failed)?;
                    record.error_message = Some(message.clone());
                    record.completed_at = Some(SystemTime::now());
                    Ok(())
                })?;
                Err(err)
            }
        }
    }

    fn process(&self, session: SessionId, path: &Path) -> Result<JobReport> {
        let processed = self.pipeline.process_file(path)?;
        self.store_session(session, processed)
    }

    /// Store already processed laps and reconcile personal bests.
    fn store_session(&self, session: SessionId, processed: ProcessedSession) -> Result<JobReport> {
        let channels = &self.pipeline.config().channels;
        let records = processed.laps.iter().map(|lap| lap.to_record()).collect();
        let blobs = processed.laps.iter().map(|lap| lap.telemetry_blob(channels)).collect();
        self.store.replace_laps(session, records, blobs)?;

        let context = processed.context.clone();
        let skipped = processed.skipped_laps;
        self.store.update_session(session, &mut |record| {
            record.context = Some(context.clone());
            record.skipped_laps = skipped;
            Ok(())
        })?;

        let personal_best = reconcile(self.store.as_ref(), session)?;
        Ok(JobReport { session, processed, personal_best })
    }
}

/// Move a failed session back to pending so it can be run again.
pub fn requeue<S: LapStore + ?Sized>(store: &S, session: SessionId) -> Result<SessionRecord> {
    let record = store.update_session(session, &mut |record| {
        record.transition(ProcessingStatus::Pending)?;
        record.error_message = None;
        record.started_at = None;
        record.completed_at = None;
        Ok(())
    })?;
    info!(session, "Session requeued");
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pb::MemoryLapStore;
    use crate::test_utils::{IbtBuilder, session_yaml_for};
    use crate::types::VariableType;
    use crate::LapTime;
    use anyhow::Result;

    fn lap_file(dir: &Path, name: &str, lap_secs: &[f64]) -> std::io::Result<PathBuf> {
        let mut lap = vec![0.0; 30];
        let mut time: Vec<f64> = (0..30).map(|i| i as f64 / 60.0).collect();
        let mut clock = 0.5;
        for (n, secs) in lap_secs.iter().enumerate() {
            for i in 0..60 {
                lap.push((n + 1) as f64);
                time.push(clock + secs * i as f64 / 59.0);
            }
            clock += secs + 1.0 / 60.0;
        }
        let samples = lap.len();
        IbtBuilder::new()
            .session_yaml(&session_yaml_for("Lime Rock Park", "Global Mazda MX-5 Cup", "Practice"))
            .channel("Lap", VariableType::Int32, "", lap)
            .channel("SessionTime", VariableType::Float64, "s", time)
            .channel("Speed", VariableType::Float32, "m/s", vec![35.0; samples])
            .write_to(dir, name)
    }

    fn runner() -> JobRunner<MemoryLapStore> {
        JobRunner::new(LapPipeline::default(), Arc::new(MemoryLapStore::new()))
    }

    #[test]
    fn status_transitions() {
        use ProcessingStatus::*;
        assert!(Pending.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Completed));
        assert!(Processing.can_transition_to(Failed));
        assert!(Failed.can_transition_to(Pending));
        assert!(!Pending.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Processing));
        assert!(!Completed.can_transition_to(Pending));
        assert!(Completed.is_terminal() && Failed.is_terminal());

        let mut record = SessionRecord::new("ana", "a.ibt");
        let error = record.transition(Completed).unwrap_err();
        assert!(matches!(
            error,
            GarageError::InvalidTransition { from: "pending", to: "completed", .. }
        ));
        assert_eq!(record.status, Pending);
    }

    #[test]
    fn truncates_on_char_boundaries() {
        assert_eq!(truncate_message("short", 500), "short");
        assert_eq!(truncate_message("abcdef", 3), "abc");
        assert_eq!(truncate_message("ñüé", 2), "ñü");
        assert_eq!(truncate_message(&"x".repeat(800), 500).len(), 500);
    }

    #[test]
    fn completed_job_stores_laps_and_first_pb() -> Result<()> {
        let _ = tracing_subscriber::fmt::try_init();
        let dir = tempfile::tempdir()?;
        let path = lap_file(dir.path(), "a.ibt", &[62.0, 61.5])?;
        let runner = runner();

        let id = runner.submit("ana", &path)?;
        assert_eq!(runner.store().session(id)?.status, ProcessingStatus::Pending);

        let report = runner.run(id, &path)?;
        assert!(report.personal_best.is_new_pb);
        assert_eq!(report.personal_best.previous_time, None);
        assert_eq!(report.personal_best.lap_number, Some(2));

        let record = runner.store().session(id)?;
        assert_eq!(record.status, ProcessingStatus::Completed);
        assert!(record.started_at.is_some() && record.completed_at.is_some());
        assert!(record.error_message.is_none());
        assert_eq!(
            record.pb_key().map(|k| k.car),
            Some("Global Mazda MX-5 Cup".to_string())
        );

        let laps = runner.store().laps(id)?;
        assert_eq!(laps.len(), 2);
        assert_eq!(laps[1].lap_time, LapTime::from_secs_f64(61.5).unwrap());
        assert!(laps[1].is_personal_best && !laps[0].is_personal_best);
        let blob = runner.store().telemetry(id, 1)?.expect("lap 1 telemetry");
        assert_eq!(blob.sample_count, 60);
        assert_eq!(blob.max_speed, 126.0);
        Ok(())
    }

    #[test]
    fn failed_job_records_truncated_error() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let long_name = format!("{}.ibt", "n".repeat(200));
        let path = dir.path().join(long_name);
        std::fs::write(&path, b"not an ibt file")?;

        let mut config = crate::config::PipelineConfig::default();
        config.error_message_limit = 40;
        let runner = JobRunner::new(LapPipeline::new(config)?, Arc::new(MemoryLapStore::new()));
        let id = runner.submit("ana", &path)?;

        let error = runner.run(id, &path).unwrap_err();
        assert!(matches!(error, GarageError::UnreadableFile { .. }));

        let record = runner.store().session(id)?;
        assert_eq!(record.status, ProcessingStatus::Failed);
        let message = record.error_message.expect("error recorded");
        assert_eq!(message.chars().count(), 40);
        assert!(error.to_string().starts_with(&message));
        assert!(record.completed_at.is_some());
        assert!(runner.store().laps(id)?.is_empty());
        Ok(())
    }

    #[test]
    fn failed_job_can_be_requeued_and_rerun() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("late.ibt");
        let runner = runner();
        let id = runner.submit("ana", &path)?;

        assert!(runner.run(id, &path).is_err());
        assert!(matches!(
            runner.run(id, &path),
            Err(GarageError::InvalidTransition { from: "failed", to: "processing", .. })
        ));

        let requeued = requeue(runner.store().as_ref(), id)?;
        assert_eq!(requeued.status, ProcessingStatus::Pending);
        assert!(requeued.error_message.is_none());

        lap_file(dir.path(), "late.ibt", &[70.0])?;
        runner.run(id, &path)?;
        assert_eq!(runner.store().session(id)?.status, ProcessingStatus::Completed);
        assert!(requeue(runner.store().as_ref(), id).is_err());
        Ok(())
    }

    #[test]
    fn unknown_session_is_not_found() {
        let runner = runner();
        assert!(matches!(
            runner.run(42, "missing.ibt"),
            Err(GarageError::SessionNotFound { session: 42 })
        ));
    }
}
