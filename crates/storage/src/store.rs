// SPDX-License-Identifier: MIT

//! `Store`: the Job Store (C1) contract — durable persistence of jobs,
//! checkpoints, and logs, backed by the WAL plus a periodic snapshot.
//!
//! Every mutation is expressed as an [`Event`], appended to the WAL first
//! and then folded into the in-memory [`MaterializedState`] via
//! `apply_event`, so a crash mid-write leaves the log (not the snapshot)
//! as the source of truth on restart.

use crate::pagination::{skip_to_cursor, sort_rows, SortOrder};
use crate::snapshot::{self, Snapshot, CURRENT_SNAPSHOT_VERSION};
use crate::state::MaterializedState;
use crate::wal::Wal;
use chrono::Utc;
use loom_core::{
    ApprovalDecision, ApprovalRecord, CancellationInfo, Clock, Event, Job, JobError, JobId,
    JobLog, JobSpec, JobStatus, LogLevel, Pipeline, PipelineId, PipelineRun, RunError, RunId,
    RunStatus, StepResult,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Wal(#[from] crate::wal::WalError),
    #[error(transparent)]
    Snapshot(#[from] snapshot::SnapshotError),
    #[error("job {0} not found")]
    NotFound(JobId),
    #[error("pipeline {0} not found")]
    PipelineNotFound(PipelineId),
    #[error("run {0} not found")]
    RunNotFound(RunId),
    #[error(transparent)]
    Cursor(#[from] crate::pagination::CursorError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Filters accepted by `list_jobs`, combined with AND semantics; `None`
/// means "no filter on this dimension".
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub job_type: Option<String>,
    pub status: Option<JobStatus>,
    pub session_id: Option<String>,
    pub agent_id: Option<String>,
}

impl JobFilter {
    fn matches(&self, job: &Job) -> bool {
        self.job_type.as_deref().is_none_or(|t| job.job_type == t)
            && self.status.is_none_or(|s| job.status == s)
            && self.session_id.as_deref().is_none_or(|s| job.session_id.as_deref() == Some(s))
            && self.agent_id.as_deref().is_none_or(|a| job.agent_id.as_deref() == Some(a))
    }
}

pub struct JobPage {
    pub jobs: Vec<Job>,
    pub next_cursor: Option<String>,
}

/// Filters accepted by `list_pipelines`, combined with AND semantics;
/// `tags` matches if the pipeline carries any of the listed tags.
#[derive(Debug, Clone, Default)]
pub struct PipelineFilter {
    pub enabled: Option<bool>,
    pub owner_id: Option<String>,
    pub tags: Vec<String>,
}

impl PipelineFilter {
    fn matches(&self, pipeline: &Pipeline) -> bool {
        self.enabled.is_none_or(|e| pipeline.enabled == e)
            && self.owner_id.as_deref().is_none_or(|o| pipeline.owner_id.as_deref() == Some(o))
            && (self.tags.is_empty() || self.tags.iter().any(|t| pipeline.tags.contains(t)))
    }
}

pub struct PipelinePage {
    pub pipelines: Vec<Pipeline>,
    pub next_cursor: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct RetentionConfig {
    pub completed_retention_ms: u64,
    pub failed_retention_ms: u64,
}

const SNAPSHOT_INTERVAL_EVENTS: u64 = 500;

pub struct Store {
    wal: Wal,
    state: MaterializedState,
    snapshot_path: PathBuf,
    events_since_snapshot: u64,
}

impl Store {
    /// Open (or create) the store rooted at `dir`: `dir/log.wal` and
    /// `dir/snapshot.zst`. Loads the latest snapshot, opens the WAL at the
    /// snapshot's sequence, and replays everything after it.
    pub fn open(dir: &Path) -> Result<Self, StoreError> {
        std::fs::create_dir_all(dir)?;
        let snapshot_path = dir.join("snapshot.zst");
        let wal_path = dir.join("log.wal");

        let (mut state, processed_seq) = match snapshot::load(&snapshot_path)? {
            Some(snap) => (snap.state, snap.seq),
            None => (MaterializedState::default(), 0),
        };

        let mut wal = Wal::open(&wal_path, processed_seq)?;
        while let Some(entry) = wal.next_unprocessed()? {
            state.apply_event(&entry.event);
            wal.mark_processed(entry.seq);
        }

        Ok(Self { wal, state, snapshot_path, events_since_snapshot: 0 })
    }

    fn append(&mut self, event: Event) -> Result<(), StoreError> {
        let seq = self.wal.append(&event)?;
        self.state.apply_event(&event);
        self.wal.mark_processed(seq);
        if self.wal.needs_flush() {
            self.wal.flush()?;
        }
        self.events_since_snapshot += 1;
        if self.events_since_snapshot >= SNAPSHOT_INTERVAL_EVENTS {
            self.snapshot()?;
        }
        Ok(())
    }

    /// Force a snapshot now and truncate the WAL to entries after it.
    pub fn snapshot(&mut self) -> Result<(), StoreError> {
        self.wal.flush()?;
        let seq = self.wal.processed_seq();
        let snap =
            Snapshot { version: CURRENT_SNAPSHOT_VERSION, seq, state: self.state.clone(), created_at: Utc::now() };
        snapshot::save(&self.snapshot_path, &snap)?;
        self.wal.truncate_before(seq + 1)?;
        self.events_since_snapshot = 0;
        Ok(())
    }

    // ---- jobs (C1) ----

    pub fn create_job(&mut self, spec: JobSpec, clock: &impl Clock) -> Result<Job, StoreError> {
        let job = Job::new(JobId::new(), spec, clock);
        self.append(Event::JobCreated { job: job.clone(), epoch_ms: clock.epoch_ms() })?;
        Ok(job)
    }

    pub fn get_job(&self, id: JobId) -> Option<&Job> {
        self.state.jobs.get(&id)
    }

    pub fn list_jobs(
        &self,
        filter: &JobFilter,
        order: SortOrder,
        limit: usize,
        cursor: Option<&str>,
    ) -> Result<JobPage, StoreError> {
        let mut rows: Vec<Job> = self.state.jobs.values().filter(|j| filter.matches(j)).cloned().collect();
        sort_rows(&mut rows, order, |j| (j.priority, j.created_at_epoch_ms, j.id.to_string()));
        let rows = skip_to_cursor(rows, order, cursor, |j| (j.priority, j.created_at_epoch_ms, j.id.to_string()))?;

        let next_cursor = rows
            .get(limit.saturating_sub(1))
            .map(|last| crate::pagination::encode(last.priority, last.created_at_epoch_ms, &last.id.to_string()));
        let jobs = rows.into_iter().take(limit).collect();
        Ok(JobPage { jobs, next_cursor })
    }

    pub fn start_job(&mut self, job_id: JobId, clock: &impl Clock) -> Result<(), StoreError> {
        self.append(Event::JobStarted { job_id, epoch_ms: clock.epoch_ms() })
    }

    pub fn update_progress(
        &mut self,
        job_id: JobId,
        current: u64,
        total: u64,
        message: Option<String>,
        clock: &impl Clock,
    ) -> Result<(), StoreError> {
        self.append(Event::JobProgress { job_id, current, total, message, epoch_ms: clock.epoch_ms() })
    }

    pub fn pause_job(&mut self, job_id: JobId, clock: &impl Clock) -> Result<(), StoreError> {
        self.append(Event::JobPaused { job_id, epoch_ms: clock.epoch_ms() })
    }

    pub fn resume_job(&mut self, job_id: JobId, clock: &impl Clock) -> Result<(), StoreError> {
        self.append(Event::JobResumed { job_id, epoch_ms: clock.epoch_ms() })
    }

    pub fn cancel_job(
        &mut self,
        job_id: JobId,
        requested_by: impl Into<String>,
        reason: Option<String>,
        clock: &impl Clock,
    ) -> Result<(), StoreError> {
        let epoch_ms = clock.epoch_ms();
        let cancellation = CancellationInfo { requested_at_epoch_ms: epoch_ms, requested_by: requested_by.into(), reason };
        self.append(Event::JobCancelled { job_id, cancellation, epoch_ms })
    }

    pub fn fail_job(
        &mut self,
        job_id: JobId,
        error: JobError,
        will_retry: bool,
        next_retry_at_epoch_ms: Option<u64>,
        clock: &impl Clock,
    ) -> Result<(), StoreError> {
        self.append(Event::JobFailed { job_id, error, will_retry, next_retry_at_epoch_ms, epoch_ms: clock.epoch_ms() })
    }

    pub fn complete_job(
        &mut self,
        job_id: JobId,
        output: serde_json::Value,
        duration_ms: u64,
        clock: &impl Clock,
    ) -> Result<(), StoreError> {
        self.append(Event::JobCompleted { job_id, output, duration_ms, epoch_ms: clock.epoch_ms() })
    }

    pub fn timeout_job(&mut self, job_id: JobId, clock: &impl Clock) -> Result<(), StoreError> {
        self.append(Event::JobTimeout { job_id, epoch_ms: clock.epoch_ms() })
    }

    pub fn save_checkpoint(
        &mut self,
        job_id: JobId,
        state: serde_json::Value,
        clock: &impl Clock,
    ) -> Result<(), StoreError> {
        self.append(Event::JobCheckpointed { job_id, state, epoch_ms: clock.epoch_ms() })
    }

    pub fn get_checkpoint(&self, job_id: JobId) -> Option<&loom_core::Checkpoint> {
        self.state.jobs.get(&job_id).and_then(|j| j.checkpoint.as_ref())
    }

    pub fn retry_job(&mut self, job_id: JobId, clock: &impl Clock) -> Result<(), StoreError> {
        self.append(Event::JobRetried { job_id, epoch_ms: clock.epoch_ms() })
    }

    pub fn append_log(
        &mut self,
        job_id: JobId,
        level: LogLevel,
        message: impl Into<String>,
        data: Option<serde_json::Value>,
        clock: &impl Clock,
    ) -> Result<(), StoreError> {
        let epoch_ms = clock.epoch_ms();
        let mut log = JobLog::new(job_id, level, message, epoch_ms);
        if let Some(data) = data {
            log = log.with_data(data);
        }
        self.append(Event::JobLogAppended { job_id, log, epoch_ms })
    }

    pub fn get_logs(&self, job_id: JobId) -> &[JobLog] {
        self.state.job_logs.get(&job_id).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Delete terminal jobs past their retention window. Returns the
    /// number of jobs removed.
    pub fn cleanup(&mut self, retention: RetentionConfig, now_epoch_ms: u64, clock: &impl Clock) -> Result<usize, StoreError> {
        let expired: Vec<JobId> = self
            .state
            .jobs
            .values()
            .filter(|job| match (job.status, job.completed_at_epoch_ms) {
                (JobStatus::Completed, Some(at)) => now_epoch_ms.saturating_sub(at) >= retention.completed_retention_ms,
                (JobStatus::Failed, Some(at)) => now_epoch_ms.saturating_sub(at) >= retention.failed_retention_ms,
                _ => false,
            })
            .map(|job| job.id)
            .collect();

        let count = expired.len();
        for job_id in expired {
            self.append(Event::JobDeleted { job_id, epoch_ms: clock.epoch_ms() })?;
        }
        Ok(count)
    }

    // ---- pipelines & runs (C4) ----

    pub fn create_pipeline(&mut self, pipeline: Pipeline, clock: &impl Clock) -> Result<Pipeline, StoreError> {
        self.append(Event::PipelineCreated { pipeline: pipeline.clone(), epoch_ms: clock.epoch_ms() })?;
        Ok(pipeline)
    }

    pub fn update_pipeline(&mut self, pipeline: Pipeline, clock: &impl Clock) -> Result<(), StoreError> {
        self.append(Event::PipelineUpdated { pipeline, epoch_ms: clock.epoch_ms() })
    }

    pub fn delete_pipeline(&mut self, pipeline_id: PipelineId, clock: &impl Clock) -> Result<(), StoreError> {
        self.append(Event::PipelineDeleted { pipeline_id, epoch_ms: clock.epoch_ms() })
    }

    pub fn get_pipeline(&self, id: PipelineId) -> Option<&Pipeline> {
        self.state.pipelines.get(&id)
    }

    pub fn list_pipelines(
        &self,
        filter: &PipelineFilter,
        order: SortOrder,
        limit: usize,
        cursor: Option<&str>,
    ) -> Result<PipelinePage, StoreError> {
        let mut rows: Vec<Pipeline> =
            self.state.pipelines.values().filter(|p| filter.matches(p)).cloned().collect();
        let key = |p: &Pipeline| (0i64, p.created_at_epoch_ms, p.id.to_string());
        sort_rows(&mut rows, order, key);
        let rows = skip_to_cursor(rows, order, cursor, key)?;

        let next_cursor = rows
            .get(limit.saturating_sub(1))
            .map(|last| crate::pagination::encode(0, last.created_at_epoch_ms, &last.id.to_string()));
        let pipelines = rows.into_iter().take(limit).collect();
        Ok(PipelinePage { pipelines, next_cursor })
    }

    /// Start a new run of a pipeline. The run's full initial snapshot is
    /// carried in the event, same as `create_job`.
    pub fn start_run(&mut self, run: PipelineRun, clock: &impl Clock) -> Result<PipelineRun, StoreError> {
        self.append(Event::RunStarted { run: run.clone(), epoch_ms: clock.epoch_ms() })?;
        Ok(run)
    }

    pub fn get_run(&self, id: RunId) -> Option<&PipelineRun> {
        self.state.runs.get(&id)
    }

    pub fn list_runs(&self, pipeline_id: Option<PipelineId>) -> Vec<&PipelineRun> {
        self.state
            .runs
            .values()
            .filter(|r| pipeline_id.is_none_or(|id| r.pipeline_id == id))
            .collect()
    }

    pub fn record_step_result(
        &mut self,
        run_id: RunId,
        step_id: impl Into<String>,
        result: StepResult,
        clock: &impl Clock,
    ) -> Result<(), StoreError> {
        self.append(Event::RunStepCompleted { run_id, step_id: step_id.into(), result, epoch_ms: clock.epoch_ms() })
    }

    /// Replace a run's context map wholesale (transform ops, loop outputs,
    /// and sub-pipeline results all fold their writes through this).
    pub fn update_run_context(
        &mut self,
        run_id: RunId,
        context: HashMap<String, serde_json::Value>,
        clock: &impl Clock,
    ) -> Result<(), StoreError> {
        self.append(Event::RunContextUpdated { run_id, context, epoch_ms: clock.epoch_ms() })
    }

    pub fn pause_run(&mut self, run_id: RunId, clock: &impl Clock) -> Result<(), StoreError> {
        self.append(Event::RunPaused { run_id, epoch_ms: clock.epoch_ms() })
    }

    pub fn resume_run(&mut self, run_id: RunId, clock: &impl Clock) -> Result<(), StoreError> {
        self.append(Event::RunResumed { run_id, epoch_ms: clock.epoch_ms() })
    }

    pub fn cancel_run(&mut self, run_id: RunId, clock: &impl Clock) -> Result<(), StoreError> {
        self.append(Event::RunCancelled { run_id, epoch_ms: clock.epoch_ms() })
    }

    pub fn complete_run(
        &mut self,
        run_id: RunId,
        status: RunStatus,
        error: Option<RunError>,
        clock: &impl Clock,
    ) -> Result<(), StoreError> {
        self.append(Event::RunCompleted { run_id, status, error, epoch_ms: clock.epoch_ms() })
    }

    pub fn request_approval(
        &mut self,
        run_id: RunId,
        step_id: impl Into<String>,
        approvers: Vec<String>,
        min_approvals: u32,
        timeout_at_epoch_ms: u64,
        clock: &impl Clock,
    ) -> Result<(), StoreError> {
        self.append(Event::RunApprovalRequested {
            run_id,
            step_id: step_id.into(),
            approvers,
            min_approvals,
            timeout_at_epoch_ms,
            epoch_ms: clock.epoch_ms(),
        })
    }

    pub fn decide_approval(
        &mut self,
        run_id: RunId,
        step_id: impl Into<String>,
        decision: ApprovalDecision,
        clock: &impl Clock,
    ) -> Result<(), StoreError> {
        self.append(Event::RunApprovalDecided { run_id, step_id: step_id.into(), decision, epoch_ms: clock.epoch_ms() })
    }

    pub fn get_approval(&self, run_id: RunId, step_id: &str) -> Option<&ApprovalRecord> {
        self.state.approvals.get(&MaterializedState::approval_key(run_id, step_id))
    }

    pub fn state(&self) -> &MaterializedState {
        &self.state
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
