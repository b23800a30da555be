// SPDX-License-Identifier: MIT

//! Pipeline, run, and approval lifecycle event handlers.

use loom_core::{ApprovalId, ApprovalRecord, Event, RunStatus, StepRunStatus};

use super::MaterializedState;

pub(crate) fn apply(state: &mut MaterializedState, event: &Event) {
    match event {
        Event::PipelineCreated { pipeline, .. } => {
            state.pipelines.entry(pipeline.id).or_insert_with(|| pipeline.clone());
        }

        Event::PipelineUpdated { pipeline, .. } => {
            match state.pipelines.get(&pipeline.id) {
                Some(existing) if existing.version >= pipeline.version => {}
                _ => {
                    state.pipelines.insert(pipeline.id, pipeline.clone());
                }
            }
        }

        Event::PipelineDeleted { pipeline_id, .. } => {
            state.pipelines.remove(pipeline_id);
        }

        Event::RunStarted { run, .. } => {
            state.runs.entry(run.id).or_insert_with(|| run.clone());
        }

        Event::RunStepCompleted { run_id, step_id, result, .. } => {
            if let Some(run) = state.runs.get_mut(run_id) {
                run.step_results.insert(step_id.clone(), result.clone());
                if result.status == StepRunStatus::Completed && !run.executed_step_ids.contains(step_id) {
                    run.executed_step_ids.push(step_id.clone());
                }
            }
        }

        Event::RunContextUpdated { run_id, context, .. } => {
            if let Some(run) = state.runs.get_mut(run_id) {
                run.context = context.clone();
            }
        }

        Event::RunPaused { run_id, .. } => {
            if let Some(run) = state.runs.get_mut(run_id) {
                run.status = RunStatus::Paused;
            }
        }

        Event::RunResumed { run_id, .. } => {
            if let Some(run) = state.runs.get_mut(run_id) {
                if run.status == RunStatus::Paused {
                    run.status = RunStatus::Running;
                }
            }
        }

        Event::RunCancelled { run_id, epoch_ms } => {
            if let Some(run) = state.runs.get_mut(run_id) {
                if run.status != RunStatus::Cancelled {
                    run.status = RunStatus::Cancelled;
                    run.completed_at_epoch_ms = Some(*epoch_ms);
                }
            }
        }

        Event::RunCompleted { run_id, status, error, epoch_ms } => {
            if let Some(run) = state.runs.get_mut(run_id) {
                if !run.is_terminal() {
                    run.status = *status;
                    run.error = error.clone();
                    run.completed_at_epoch_ms = Some(*epoch_ms);
                }
            }
        }

        Event::RunApprovalRequested { run_id, step_id, approvers, min_approvals, timeout_at_epoch_ms, epoch_ms } => {
            let key = MaterializedState::approval_key(*run_id, step_id);
            state.approvals.entry(key).or_insert_with(|| ApprovalRecord {
                id: ApprovalId::new(),
                run_id: *run_id,
                step_id: step_id.clone(),
                approvers: approvers.clone(),
                min_approvals: *min_approvals,
                decisions: Vec::new(),
                created_at_epoch_ms: *epoch_ms,
                timeout_at_epoch_ms: *timeout_at_epoch_ms,
            });
        }

        Event::RunApprovalDecided { run_id, step_id, decision, .. } => {
            let key = MaterializedState::approval_key(*run_id, step_id);
            if let Some(record) = state.approvals.get_mut(&key) {
                if !record.decisions.iter().any(|d| d.user_id == decision.user_id) {
                    record.decisions.push(decision.clone());
                }
            }
        }

        _ => {}
    }
}

#[cfg(test)]
#[path = "runs_tests.rs"]
mod tests;
