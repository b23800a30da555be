// SPDX-License-Identifier: MIT

//! Step definitions: the ten typed node kinds a pipeline is built from.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Retry policy for a pipeline step or pipeline default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
    /// If set, only errors whose code is in this list are retryable.
    /// An empty list means "never retry" (see design notes on this default).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retryable_errors: Option<Vec<String>>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 1_000,
            max_backoff_ms: 30_000,
            backoff_multiplier: 2.0,
            retryable_errors: None,
        }
    }
}

impl RetryPolicy {
    pub fn backoff_ms_for_attempt(&self, attempt: u32) -> u64 {
        let raw = self.initial_backoff_ms as f64 * self.backoff_multiplier.powi(attempt as i32);
        (raw as u64).min(self.max_backoff_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnTimeout {
    Approve,
    Reject,
    Fail,
}

impl Default for OnTimeout {
    fn default() -> Self {
        OnTimeout::Fail
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopMode {
    ForEach,
    While,
    Until,
    Times,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookAuth {
    None,
    Basic,
    Bearer,
    ApiKey,
}

/// One of the ten transform operations applied against run context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum TransformOp {
    Set { path: String, value: serde_json::Value },
    Delete { path: String },
    Merge { source: String, target: String },
    Map { source: String, expression: String, target: String },
    Filter { source: String, condition: String, target: String },
    Reduce { source: String, expression: String, initial: serde_json::Value, target: String },
    Extract { source: String, query: String, target: String },
}

/// Per-type step configuration. One variant per §4.4.2 step kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepKind {
    AgentTask {
        prompt: String,
        working_directory: Option<String>,
        system_prompt: Option<String>,
        timeout_ms: Option<u64>,
        max_tokens: Option<u64>,
        #[serde(default = "default_true")]
        wait_for_completion: bool,
    },
    Conditional {
        condition: String,
        then_steps: Vec<String>,
        #[serde(default)]
        else_steps: Vec<String>,
    },
    Parallel {
        steps: Vec<String>,
        max_concurrency: Option<usize>,
        #[serde(default)]
        fail_fast: bool,
    },
    Approval {
        approvers: Vec<String>,
        min_approvals: u32,
        #[serde(default)]
        on_timeout: OnTimeout,
        timeout_ms: u64,
    },
    Script {
        script: String,
        #[serde(default = "default_shell")]
        shell: String,
        working_directory: Option<String>,
        #[serde(default)]
        env: HashMap<String, String>,
        #[serde(default = "default_script_timeout_ms")]
        timeout_ms: u64,
        /// If true, `script` is a path and is variable-substituted; inline
        /// script bodies are never substituted (command-injection hazard).
        #[serde(default)]
        path_mode: bool,
    },
    Loop {
        mode: LoopMode,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        items: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        condition: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        times: Option<u64>,
        body_steps: Vec<String>,
        max_iterations: u64,
        #[serde(default)]
        parallel: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parallel_limit: Option<usize>,
        output_variable: String,
    },
    Wait {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration_ms: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        until: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        webhook_token: Option<String>,
        timeout_ms: u64,
    },
    Transform {
        operations: Vec<TransformOp>,
    },
    Webhook {
        url: String,
        method: HttpMethod,
        #[serde(default)]
        headers: HashMap<String, String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        body: Option<serde_json::Value>,
        #[serde(default)]
        auth: WebhookAuth,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        auth_value: Option<String>,
        #[serde(default = "default_validate_status")]
        validate_status: Vec<u16>,
        output_variable: String,
        #[serde(default)]
        extract_fields: HashMap<String, String>,
    },
    SubPipeline {
        pipeline_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        version: Option<u32>,
        #[serde(default)]
        inputs: HashMap<String, serde_json::Value>,
        #[serde(default = "default_true")]
        wait_for_completion: bool,
        timeout_ms: u64,
        output_variable: String,
    },
}

fn default_true() -> bool {
    true
}

fn default_shell() -> String {
    "/bin/bash".to_string()
}

fn default_script_timeout_ms() -> u64 {
    5 * 60 * 1_000
}

fn default_validate_status() -> Vec<u16> {
    (200..=204).collect()
}

impl Default for WebhookAuth {
    fn default() -> Self {
        WebhookAuth::None
    }
}

impl StepKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            StepKind::AgentTask { .. } => "agent_task",
            StepKind::Conditional { .. } => "conditional",
            StepKind::Parallel { .. } => "parallel",
            StepKind::Approval { .. } => "approval",
            StepKind::Script { .. } => "script",
            StepKind::Loop { .. } => "loop",
            StepKind::Wait { .. } => "wait",
            StepKind::Transform { .. } => "transform",
            StepKind::Webhook { .. } => "webhook",
            StepKind::SubPipeline { .. } => "sub_pipeline",
        }
    }
}

/// A step definition within a [`crate::pipeline::Pipeline`]. Value-typed and
/// immutable once the pipeline is created; updates produce a new pipeline
/// version rather than mutating a step in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub id: String,
    pub name: String,
    #[serde(flatten)]
    pub kind: StepKind,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_policy: Option<RetryPolicy>,
    #[serde(default)]
    pub continue_on_failure: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

#[cfg(test)]
#[path = "step_tests.rs"]
mod tests;
