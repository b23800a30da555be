// SPDX-License-Identifier: MIT

//! The in-process handler contract (§6): `registerHandler(type, handler)`
//! where the handler validates input up front and executes against a
//! context that exposes progress/checkpoint/cancellation/logging.

use crate::cancellation::CancellationToken;
use async_trait::async_trait;
use loom_core::{Checkpoint, Clock, Job, LogLevel};
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<String>,
}

impl ValidationResult {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn invalid(errors: Vec<String>) -> Self {
        Self { errors }
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Actions an executing handler performs against the job store, collected
/// here instead of handed a live `&mut Store` so the handler never needs
/// to know about WAL/locking details — it only sees this narrow surface.
#[async_trait]
pub trait ExecutorSink: Send + Sync {
    async fn update_progress(&self, current: u64, total: u64, message: Option<String>);
    async fn checkpoint(&self, state: serde_json::Value);
    async fn get_checkpoint(&self) -> Option<Checkpoint>;
    async fn log(&self, level: LogLevel, message: String, data: Option<serde_json::Value>);
}

/// Execution context handed to a handler's `execute`. Holds a snapshot of
/// the job plus a narrow sink back into the store and the cancellation
/// token the executor will trip on timeout or explicit cancel.
pub struct ExecutionContext {
    pub job: Job,
    sink: Arc<dyn ExecutorSink>,
    cancel: CancellationToken,
    stage: Mutex<Option<String>>,
}

impl ExecutionContext {
    pub fn new(job: Job, sink: Arc<dyn ExecutorSink>, cancel: CancellationToken) -> Self {
        Self { job, sink, cancel, stage: Mutex::new(None) }
    }

    pub fn input(&self) -> &serde_json::Value {
        &self.job.input
    }

    pub async fn update_progress(&self, current: u64, total: u64, message: Option<String>) {
        self.sink.update_progress(current, total, message).await;
    }

    pub fn set_stage(&self, stage: impl Into<String>) {
        *self.stage.lock() = Some(stage.into());
    }

    pub fn stage(&self) -> Option<String> {
        self.stage.lock().clone()
    }

    pub async fn checkpoint(&self, state: serde_json::Value) {
        self.sink.checkpoint(state).await;
    }

    pub async fn get_checkpoint(&self) -> Option<Checkpoint> {
        self.sink.get_checkpoint().await
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn throw_if_cancelled(&self) -> Result<(), crate::cancellation::Cancelled> {
        self.cancel.throw_if_cancelled()
    }

    pub async fn log(&self, level: LogLevel, message: impl Into<String>, data: Option<serde_json::Value>) {
        self.sink.log(level, message.into(), data).await;
    }
}

/// A registered job handler: validate-then-execute, with optional
/// cancellation/pause hooks run best-effort (their errors are logged, not
/// propagated — cleanup failing must not change the job's outcome).
#[async_trait]
pub trait Handler: Send + Sync {
    fn validate(&self, input: &serde_json::Value) -> ValidationResult;

    async fn execute(&self, ctx: &ExecutionContext) -> Result<serde_json::Value, String>;

    async fn on_cancel(&self, _ctx: &ExecutionContext) {}

    async fn on_pause(&self, _ctx: &ExecutionContext) {}
}

/// Builds a fresh `Clock`-stamped [`Checkpoint`] the way the store does on
/// `saveCheckpoint`, so handlers that read it back via `get_checkpoint`
/// see consistent shapes regardless of which layer wrote it.
pub fn stamp_checkpoint(state: serde_json::Value, clock: &impl Clock) -> Checkpoint {
    Checkpoint { state, saved_at_epoch_ms: clock.epoch_ms() }
}

#[cfg(test)]
#[path = "handler_tests.rs"]
mod tests;
