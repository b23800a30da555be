// SPDX-License-Identifier: MIT

//! The `agent_task` step's external collaborator, registered in-process
//! the same way `loom-scheduler`'s `Handler` is (§6 "Handler
//! registration"): the engine never talks to an agent runtime directly,
//! it calls whatever driver the embedder plugged in.

use async_trait::async_trait;
use serde_json::Value;

#[derive(Debug, Clone)]
pub struct AgentTaskRequest {
    pub prompt: String,
    pub working_directory: Option<String>,
    pub system_prompt: Option<String>,
    pub timeout_ms: Option<u64>,
    pub max_tokens: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct AgentTaskHandle {
    pub agent_id: String,
    pub message_id: String,
}

/// Spawns and, optionally, awaits completion of an agent run. `submit`
/// always returns immediately with a handle; `await_completion` is only
/// called when the step's `waitForCompletion` is true.
#[async_trait]
pub trait AgentDriver: Send + Sync {
    async fn submit(&self, request: AgentTaskRequest) -> Result<AgentTaskHandle, String>;
    async fn await_completion(&self, handle: &AgentTaskHandle) -> Result<Value, String>;
}
