// SPDX-License-Identifier: MIT

use super::*;
use crate::state::MaterializedState;
use loom_core::{
    ApprovalDecision, Decision, Pipeline, PipelineId, PipelineRun, PipelineStats, RunId, RunStatus,
    RunError, StepResult, StepRunStatus, Trigger, TriggerSourceType, TriggerType, TriggeredBy,
};
use std::collections::HashMap;

fn pipeline(id: PipelineId, version: u32) -> Pipeline {
    Pipeline {
        id,
        name: "deploy".to_string(),
        version,
        enabled: true,
        trigger: Trigger { trigger_type: TriggerType::Manual, config: serde_json::Value::Null, enabled: true },
        steps: Vec::new(),
        context_defaults: HashMap::new(),
        retry_policy: Default::default(),
        stats: PipelineStats::default(),
        created_at_epoch_ms: 0,
        updated_at_epoch_ms: 0,
        owner_id: None,
        tags: Vec::new(),
    }
}

fn run(id: RunId, pipeline_id: PipelineId) -> PipelineRun {
    PipelineRun {
        id,
        pipeline_id,
        status: RunStatus::Running,
        steps: Vec::new(),
        executed_step_ids: Vec::new(),
        context: HashMap::new(),
        triggered_by: TriggeredBy { source_type: TriggerSourceType::User, id: None },
        created_at_epoch_ms: 0,
        started_at_epoch_ms: Some(0),
        completed_at_epoch_ms: None,
        error: None,
        step_results: HashMap::new(),
    }
}

#[test]
fn pipeline_updated_ignores_stale_version() {
    let mut state = MaterializedState::default();
    let id = PipelineId::new();
    state.apply_event(&Event::PipelineCreated { pipeline: pipeline(id, 2), epoch_ms: 0 });
    state.apply_event(&Event::PipelineUpdated { pipeline: pipeline(id, 1), epoch_ms: 10 });

    assert_eq!(state.pipelines.get(&id).unwrap().version, 2);
}

#[test]
fn pipeline_deleted_removes_entry() {
    let mut state = MaterializedState::default();
    let id = PipelineId::new();
    state.apply_event(&Event::PipelineCreated { pipeline: pipeline(id, 1), epoch_ms: 0 });
    state.apply_event(&Event::PipelineDeleted { pipeline_id: id, epoch_ms: 1 });

    assert!(!state.pipelines.contains_key(&id));
}

#[test]
fn run_step_completed_tracks_executed_ids_once() {
    let mut state = MaterializedState::default();
    let pipeline_id = PipelineId::new();
    let run_id = RunId::new();
    state.apply_event(&Event::RunStarted { run: run(run_id, pipeline_id), epoch_ms: 0 });

    let result = StepResult {
        step_id: "build".to_string(),
        status: StepRunStatus::Completed,
        started_at_epoch_ms: 0,
        completed_at_epoch_ms: Some(5),
        output: None,
        error: None,
        skip_reason: None,
        approvals: Vec::new(),
    };
    state.apply_event(&Event::RunStepCompleted { run_id, step_id: "build".to_string(), result: result.clone(), epoch_ms: 5 });
    state.apply_event(&Event::RunStepCompleted { run_id, step_id: "build".to_string(), result, epoch_ms: 5 });

    let run = state.runs.get(&run_id).unwrap();
    assert_eq!(run.executed_step_ids, vec!["build".to_string()]);
}

#[test]
fn run_completed_is_terminal_once() {
    let mut state = MaterializedState::default();
    let pipeline_id = PipelineId::new();
    let run_id = RunId::new();
    state.apply_event(&Event::RunStarted { run: run(run_id, pipeline_id), epoch_ms: 0 });
    state.apply_event(&Event::RunCompleted { run_id, status: RunStatus::Completed, error: None, epoch_ms: 20 });
    state.apply_event(&Event::RunCompleted {
        run_id,
        status: RunStatus::Failed,
        error: Some(RunError { code: "X".to_string(), message: "late".to_string(), step_id: None }),
        epoch_ms: 30,
    });

    let run = state.runs.get(&run_id).unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.completed_at_epoch_ms, Some(20));
}

#[test]
fn approval_requested_then_decided_resolves() {
    let mut state = MaterializedState::default();
    let run_id = RunId::new();
    state.apply_event(&Event::RunApprovalRequested {
        run_id,
        step_id: "deploy".to_string(),
        approvers: vec!["alice".to_string(), "bob".to_string()],
        min_approvals: 1,
        timeout_at_epoch_ms: 1_000,
        epoch_ms: 0,
    });
    state.apply_event(&Event::RunApprovalDecided {
        run_id,
        step_id: "deploy".to_string(),
        decision: ApprovalDecision {
            user_id: "alice".to_string(),
            decision: Decision::Approved,
            comment: None,
            timestamp_epoch_ms: 5,
        },
        epoch_ms: 5,
    });

    let key = MaterializedState::approval_key(run_id, "deploy");
    let record = state.approvals.get(&key).unwrap();
    assert_eq!(record.resolution(), Some(true));
}

#[test]
fn approval_decision_from_same_user_is_not_duplicated() {
    let mut state = MaterializedState::default();
    let run_id = RunId::new();
    state.apply_event(&Event::RunApprovalRequested {
        run_id,
        step_id: "deploy".to_string(),
        approvers: vec!["alice".to_string()],
        min_approvals: 2,
        timeout_at_epoch_ms: 1_000,
        epoch_ms: 0,
    });
    let decide = Event::RunApprovalDecided {
        run_id,
        step_id: "deploy".to_string(),
        decision: ApprovalDecision {
            user_id: "alice".to_string(),
            decision: Decision::Approved,
            comment: None,
            timestamp_epoch_ms: 5,
        },
        epoch_ms: 5,
    };
    state.apply_event(&decide);
    state.apply_event(&decide);

    let key = MaterializedState::approval_key(run_id, "deploy");
    assert_eq!(state.approvals.get(&key).unwrap().decisions.len(), 1);
}
