// SPDX-License-Identifier: MIT

//! The durable event log. Every mutation to job, pipeline, or run state is
//! first appended here; [`crate::job::Job`]/[`crate::run::PipelineRun`]
//! snapshots are derived by replaying this log (see `loom-storage`). The
//! same enum is re-published verbatim on the event bus (C5) after a
//! successful apply, so wire payload and durable fact are one type.

use crate::job::{CancellationInfo, Job, JobError, JobId};
use crate::job_log::JobLog;
use crate::pipeline::{Pipeline, PipelineId};
use crate::run::{ApprovalDecision, PipelineRun, RunError, RunId, RunStatus, StepResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    /// Carries the full initial snapshot so replay can reconstruct the row
    /// without consulting any other source.
    #[serde(rename = "job.created")]
    JobCreated { job: Job, epoch_ms: u64 },
    #[serde(rename = "job.started")]
    JobStarted { job_id: JobId, epoch_ms: u64 },
    #[serde(rename = "job.progress")]
    JobProgress { job_id: JobId, current: u64, total: u64, message: Option<String>, epoch_ms: u64 },
    #[serde(rename = "job.paused")]
    JobPaused { job_id: JobId, epoch_ms: u64 },
    #[serde(rename = "job.resumed")]
    JobResumed { job_id: JobId, epoch_ms: u64 },
    #[serde(rename = "job.cancelled")]
    JobCancelled { job_id: JobId, cancellation: CancellationInfo, epoch_ms: u64 },
    #[serde(rename = "job.failed")]
    JobFailed { job_id: JobId, error: JobError, will_retry: bool, next_retry_at_epoch_ms: Option<u64>, epoch_ms: u64 },
    #[serde(rename = "job.completed")]
    JobCompleted { job_id: JobId, output: serde_json::Value, duration_ms: u64, epoch_ms: u64 },
    #[serde(rename = "job.timeout")]
    JobTimeout { job_id: JobId, epoch_ms: u64 },
    #[serde(rename = "job.checkpointed")]
    JobCheckpointed { job_id: JobId, state: serde_json::Value, epoch_ms: u64 },
    #[serde(rename = "job.retried")]
    JobRetried { job_id: JobId, epoch_ms: u64 },
    #[serde(rename = "job.log_appended")]
    JobLogAppended { job_id: JobId, log: JobLog, epoch_ms: u64 },
    #[serde(rename = "job.deleted")]
    JobDeleted { job_id: JobId, epoch_ms: u64 },

    #[serde(rename = "pipeline.created")]
    PipelineCreated { pipeline: Pipeline, epoch_ms: u64 },
    #[serde(rename = "pipeline.updated")]
    PipelineUpdated { pipeline: Pipeline, epoch_ms: u64 },
    #[serde(rename = "pipeline.deleted")]
    PipelineDeleted { pipeline_id: PipelineId, epoch_ms: u64 },

    #[serde(rename = "run.started")]
    RunStarted { run: PipelineRun, epoch_ms: u64 },
    #[serde(rename = "run.step_completed")]
    RunStepCompleted { run_id: RunId, step_id: String, result: StepResult, epoch_ms: u64 },
    /// Carries the full context map after a step mutates it (transform
    /// ops, loop outputs, sub-pipeline results): simplest to apply
    /// idempotently, same tradeoff as `JobProgress` overwriting in full.
    #[serde(rename = "run.context_updated")]
    RunContextUpdated { run_id: RunId, context: HashMap<String, serde_json::Value>, epoch_ms: u64 },
    #[serde(rename = "run.paused")]
    RunPaused { run_id: RunId, epoch_ms: u64 },
    #[serde(rename = "run.resumed")]
    RunResumed { run_id: RunId, epoch_ms: u64 },
    #[serde(rename = "run.cancelled")]
    RunCancelled { run_id: RunId, epoch_ms: u64 },
    #[serde(rename = "run.completed")]
    RunCompleted { run_id: RunId, status: RunStatus, error: Option<RunError>, epoch_ms: u64 },
    #[serde(rename = "run.approval_requested")]
    RunApprovalRequested {
        run_id: RunId,
        step_id: String,
        approvers: Vec<String>,
        min_approvals: u32,
        timeout_at_epoch_ms: u64,
        epoch_ms: u64,
    },
    #[serde(rename = "run.approval_decided")]
    RunApprovalDecided { run_id: RunId, step_id: String, decision: ApprovalDecision, epoch_ms: u64 },
}

impl Event {
    /// The wire/topic type string for this event, per the C5 channel
    /// taxonomy (e.g. `"job.completed"`).
    pub fn type_name(&self) -> &'static str {
        match self {
            Event::JobCreated { .. } => "job.created",
            Event::JobStarted { .. } => "job.started",
            Event::JobProgress { .. } => "job.progress",
            Event::JobPaused { .. } => "job.paused",
            Event::JobResumed { .. } => "job.resumed",
            Event::JobCancelled { .. } => "job.cancelled",
            Event::JobFailed { .. } => "job.failed",
            Event::JobCompleted { .. } => "job.completed",
            Event::JobTimeout { .. } => "job.timeout",
            Event::JobCheckpointed { .. } => "job.checkpointed",
            Event::JobRetried { .. } => "job.retried",
            Event::JobLogAppended { .. } => "job.log_appended",
            Event::JobDeleted { .. } => "job.deleted",
            Event::PipelineCreated { .. } => "pipeline.created",
            Event::PipelineUpdated { .. } => "pipeline.updated",
            Event::PipelineDeleted { .. } => "pipeline.deleted",
            Event::RunStarted { .. } => "run.started",
            Event::RunStepCompleted { .. } => "run.step_completed",
            Event::RunContextUpdated { .. } => "run.context_updated",
            Event::RunPaused { .. } => "run.paused",
            Event::RunResumed { .. } => "run.resumed",
            Event::RunCancelled { .. } => "run.cancelled",
            Event::RunCompleted { .. } => "run.completed",
            Event::RunApprovalRequested { .. } => "run.approval_requested",
            Event::RunApprovalDecided { .. } => "run.approval_decided",
        }
    }

    /// The job this event applies to, if it is a job-lifecycle event.
    pub fn job_id(&self) -> Option<JobId> {
        match self {
            Event::JobCreated { job, .. } => Some(job.id),
            Event::JobStarted { job_id, .. }
            | Event::JobProgress { job_id, .. }
            | Event::JobPaused { job_id, .. }
            | Event::JobResumed { job_id, .. }
            | Event::JobCancelled { job_id, .. }
            | Event::JobFailed { job_id, .. }
            | Event::JobCompleted { job_id, .. }
            | Event::JobTimeout { job_id, .. }
            | Event::JobCheckpointed { job_id, .. }
            | Event::JobRetried { job_id, .. }
            | Event::JobLogAppended { job_id, .. }
            | Event::JobDeleted { job_id, .. } => Some(*job_id),
            _ => None,
        }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
