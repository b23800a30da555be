// SPDX-License-Identifier: MIT

//! Materialized state derived by replaying the event log.

mod jobs;
mod runs;

use loom_core::{ApprovalRecord, Event, Job, JobId, JobLog, Pipeline, PipelineId, PipelineRun, RunId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// In-memory projection rebuilt from the WAL at startup and kept current by
/// applying each newly appended event. Every handler below MUST be
/// idempotent: the same event may be applied twice, once for immediate
/// in-process visibility and once during WAL replay after a restart.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct MaterializedState {
    pub jobs: HashMap<JobId, Job>,
    #[serde(default)]
    pub job_logs: HashMap<JobId, Vec<JobLog>>,
    pub pipelines: HashMap<PipelineId, Pipeline>,
    pub runs: HashMap<RunId, PipelineRun>,
    /// Keyed by `"{run_id}:{step_id}"`.
    #[serde(default)]
    pub approvals: HashMap<String, ApprovalRecord>,
}

impl MaterializedState {
    pub fn approval_key(run_id: RunId, step_id: &str) -> String {
        format!("{run_id}:{step_id}")
    }

    /// Apply one event, deriving the next state. See module docs for the
    /// idempotency requirement every per-domain handler must uphold.
    pub fn apply_event(&mut self, event: &Event) {
        match event {
            Event::JobCreated { .. }
            | Event::JobStarted { .. }
            | Event::JobProgress { .. }
            | Event::JobPaused { .. }
            | Event::JobResumed { .. }
            | Event::JobCancelled { .. }
            | Event::JobFailed { .. }
            | Event::JobCompleted { .. }
            | Event::JobTimeout { .. }
            | Event::JobCheckpointed { .. }
            | Event::JobRetried { .. }
            | Event::JobLogAppended { .. }
            | Event::JobDeleted { .. } => jobs::apply(self, event),

            Event::PipelineCreated { .. }
            | Event::PipelineUpdated { .. }
            | Event::PipelineDeleted { .. }
            | Event::RunStarted { .. }
            | Event::RunStepCompleted { .. }
            | Event::RunContextUpdated { .. }
            | Event::RunPaused { .. }
            | Event::RunResumed { .. }
            | Event::RunCancelled { .. }
            | Event::RunCompleted { .. }
            | Event::RunApprovalRequested { .. }
            | Event::RunApprovalDecided { .. } => runs::apply(self, event),
        }
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
