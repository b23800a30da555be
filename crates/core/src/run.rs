// SPDX-License-Identifier: MIT

//! PipelineRun: one execution of a pipeline definition.

use crate::pipeline::PipelineId;
use crate::step::Step;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

crate::define_id! {
    /// Unique identifier for a pipeline run.
    pub struct RunId("run-");
}

crate::define_id! {
    /// Unique identifier for a step-approval request.
    pub struct ApprovalId("apv-");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed | RunStatus::Cancelled)
    }
}

crate::simple_display! {
    RunStatus {
        Running => "running",
        Paused => "paused",
        Completed => "completed",
        Failed => "failed",
        Cancelled => "cancelled",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSourceType {
    User,
    Schedule,
    Webhook,
    BeadEvent,
    Api,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggeredBy {
    #[serde(rename = "type")]
    pub source_type: TriggerSourceType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepRunStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

/// Runtime record of one step execution within a run (a step may appear
/// more than once if executed inside a loop body).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub step_id: String,
    pub status: StepRunStatus,
    pub started_at_epoch_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at_epoch_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RunError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
    #[serde(default)]
    pub approvals: Vec<ApprovalDecision>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunError {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approved,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalDecision {
    pub user_id: String,
    pub decision: Decision,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub timestamp_epoch_ms: u64,
}

/// A pending approval handle, keyed by `(runId, stepId)`, awaiting enough
/// decisions to resolve one way or the other.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRecord {
    pub id: ApprovalId,
    pub run_id: RunId,
    pub step_id: String,
    pub approvers: Vec<String>,
    pub min_approvals: u32,
    pub decisions: Vec<ApprovalDecision>,
    pub created_at_epoch_ms: u64,
    pub timeout_at_epoch_ms: u64,
}

impl ApprovalRecord {
    /// `Some(true)` resolved-approved, `Some(false)` resolved-rejected,
    /// `None` still pending.
    pub fn resolution(&self) -> Option<bool> {
        if self.decisions.iter().any(|d| d.decision == Decision::Rejected) {
            return Some(false);
        }
        let approved = self.decisions.iter().filter(|d| d.decision == Decision::Approved).count() as u32;
        if approved >= self.min_approvals {
            return Some(true);
        }
        None
    }
}

/// One execution of a [`crate::pipeline::Pipeline`]. Holds its own copy of
/// the step list so a later pipeline update never mutates an in-flight run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRun {
    pub id: RunId,
    pub pipeline_id: PipelineId,
    pub status: RunStatus,
    pub steps: Vec<Step>,
    #[serde(default)]
    pub executed_step_ids: Vec<String>,
    pub context: HashMap<String, serde_json::Value>,
    pub triggered_by: TriggeredBy,
    pub created_at_epoch_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at_epoch_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at_epoch_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RunError>,
    #[serde(default)]
    pub step_results: HashMap<String, StepResult>,
}

impl PipelineRun {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// `__loopDepth` from context, defaulting to 0 when absent or malformed.
    pub fn loop_depth(&self) -> i64 {
        self.context.get("__loopDepth").and_then(|v| v.as_i64()).unwrap_or(0)
    }

    pub fn set_loop_depth(&mut self, depth: i64) {
        self.context.insert("__loopDepth".to_string(), serde_json::json!(depth));
    }

    /// Whether `step_id` may be skipped as already-executed: only outside a
    /// loop body does the "already executed" dedup guard apply.
    pub fn already_executed_outside_loop(&self, step_id: &str) -> bool {
        self.loop_depth() == 0 && self.executed_step_ids.iter().any(|s| s == step_id)
    }
}

#[cfg(test)]
#[path = "run_tests.rs"]
mod tests;
