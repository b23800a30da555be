// SPDX-License-Identifier: MIT

//! Job identifier, state machine, and the durable fields the store persists.

use crate::clock::Clock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

crate::define_id! {
    /// Unique identifier for a job instance.
    pub struct JobId("job-");
}

/// Status of a job. Terminal states are `Completed`, `Failed`, `Cancelled`,
/// `Timeout`; only an explicit retry may move a job back out of a terminal
/// state, and only to `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
    Timeout,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled | JobStatus::Timeout)
    }
}

crate::simple_display! {
    JobStatus {
        Pending => "pending",
        Running => "running",
        Paused => "paused",
        Completed => "completed",
        Failed => "failed",
        Cancelled => "cancelled",
        Timeout => "timeout",
    }
}

/// `{current, total, percentage, message, stage?}`. `percentage` is kept
/// consistent with `current`/`total` by [`Progress::update`] rather than
/// being set independently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    pub current: u64,
    pub total: u64,
    pub percentage: u8,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
}

impl Default for Progress {
    fn default() -> Self {
        Self { current: 0, total: 0, percentage: 0, message: String::new(), stage: None }
    }
}

impl Progress {
    /// Update current/total and recompute `percentage`. `current` is
    /// clamped to `total`.
    pub fn update(&mut self, current: u64, total: u64, message: Option<String>) {
        self.total = total;
        self.current = current.min(total);
        self.percentage = if total == 0 {
            0
        } else {
            ((self.current as f64 / total as f64) * 100.0).round() as u8
        };
        if let Some(m) = message {
            self.message = m;
        }
    }
}

/// `{attempts, maxAttempts, backoffMs, nextRetryAt?}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryState {
    pub attempts: u32,
    pub max_attempts: u32,
    pub backoff_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_retry_at_epoch_ms: Option<u64>,
}

impl RetryState {
    pub fn new(max_attempts: u32, initial_backoff_ms: u64) -> Self {
        Self { attempts: 0, max_attempts, backoff_ms: initial_backoff_ms, next_retry_at_epoch_ms: None }
    }

    pub fn has_attempts_remaining(&self) -> bool {
        self.attempts < self.max_attempts
    }
}

/// `{code, message, retryable, stack?}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobError {
    pub code: String,
    pub message: String,
    pub retryable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl JobError {
    pub fn new(code: impl Into<String>, message: impl Into<String>, retryable: bool) -> Self {
        Self { code: code.into(), message: message.into(), retryable, stack: None }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message, false)
    }

    pub fn validation(messages: &[String]) -> Self {
        Self::new("VALIDATION_ERROR", messages.join("; "), false)
    }

    pub fn no_handler(job_type: &str) -> Self {
        Self::new("NO_HANDLER", format!("no handler registered for job type '{job_type}'"), false)
    }
}

/// `{requestedAt, requestedBy, reason?}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancellationInfo {
    pub requested_at_epoch_ms: u64,
    pub requested_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Opaque handler-defined state blob persisted so a resumed execution can
/// recover, plus the timestamp it was saved at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub state: serde_json::Value,
    pub saved_at_epoch_ms: u64,
}

/// Caller-provided parameters for creating a new job. Retry/timeout numbers
/// are left unset here and filled in from scheduler defaults unless the
/// caller overrides them.
#[derive(Debug, Clone)]
pub struct JobSpec {
    pub job_type: String,
    pub name: Option<String>,
    pub priority: i64,
    pub session_id: Option<String>,
    pub agent_id: Option<String>,
    pub user_id: Option<String>,
    pub input: serde_json::Value,
    pub max_attempts: Option<u32>,
    pub initial_backoff_ms: Option<u64>,
    pub estimated_duration_ms: Option<u64>,
    pub correlation_id: Option<String>,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl JobSpec {
    pub fn builder(job_type: impl Into<String>, input: serde_json::Value) -> JobSpecBuilder {
        JobSpecBuilder {
            job_type: job_type.into(),
            name: None,
            priority: 0,
            session_id: None,
            agent_id: None,
            user_id: None,
            input,
            max_attempts: None,
            initial_backoff_ms: None,
            estimated_duration_ms: None,
            correlation_id: None,
            metadata: HashMap::new(),
        }
    }
}

pub struct JobSpecBuilder {
    job_type: String,
    name: Option<String>,
    priority: i64,
    session_id: Option<String>,
    agent_id: Option<String>,
    user_id: Option<String>,
    input: serde_json::Value,
    max_attempts: Option<u32>,
    initial_backoff_ms: Option<u64>,
    estimated_duration_ms: Option<u64>,
    correlation_id: Option<String>,
    metadata: HashMap<String, serde_json::Value>,
}

impl JobSpecBuilder {
    crate::setters! {
        set {
            priority: i64,
            max_attempts: Option<u32>,
            initial_backoff_ms: Option<u64>,
            estimated_duration_ms: Option<u64>,
            metadata: HashMap<String, serde_json::Value>,
        }
        option {
            name: String,
            session_id: String,
            agent_id: String,
            user_id: String,
            correlation_id: String,
        }
    }

    pub fn build(self) -> JobSpec {
        JobSpec {
            job_type: self.job_type,
            name: self.name,
            priority: self.priority,
            session_id: self.session_id,
            agent_id: self.agent_id,
            user_id: self.user_id,
            input: self.input,
            max_attempts: self.max_attempts,
            initial_backoff_ms: self.initial_backoff_ms,
            estimated_duration_ms: self.estimated_duration_ms,
            correlation_id: self.correlation_id,
            metadata: self.metadata,
        }
    }
}

/// Default values used when a [`JobSpec`] leaves retry numbers unset.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_INITIAL_BACKOFF_MS: u64 = 1_000;

/// A durable job instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub job_type: String,
    pub name: Option<String>,
    pub priority: i64,
    pub session_id: Option<String>,
    pub agent_id: Option<String>,
    pub user_id: Option<String>,
    pub status: JobStatus,
    pub input: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
    pub progress: Progress,
    pub retry: RetryState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancellation: Option<CancellationInfo>,
    pub created_at_epoch_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at_epoch_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at_epoch_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint: Option<Checkpoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Job {
    /// Construct a new job in `Pending` status from a spec.
    pub fn new(id: JobId, spec: JobSpec, clock: &impl Clock) -> Self {
        Self::new_with_epoch_ms(id, spec, clock.epoch_ms())
    }

    /// Construct with an explicit epoch, for WAL replay.
    pub fn new_with_epoch_ms(id: JobId, spec: JobSpec, epoch_ms: u64) -> Self {
        Self {
            id,
            job_type: spec.job_type,
            name: spec.name,
            priority: spec.priority,
            session_id: spec.session_id,
            agent_id: spec.agent_id,
            user_id: spec.user_id,
            status: JobStatus::Pending,
            input: spec.input,
            output: None,
            progress: Progress::default(),
            retry: RetryState::new(
                spec.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS),
                spec.initial_backoff_ms.unwrap_or(DEFAULT_INITIAL_BACKOFF_MS),
            ),
            error: None,
            cancellation: None,
            created_at_epoch_ms: epoch_ms,
            started_at_epoch_ms: None,
            completed_at_epoch_ms: None,
            estimated_duration_ms: spec.estimated_duration_ms,
            actual_duration_ms: None,
            checkpoint: None,
            correlation_id: spec.correlation_id,
            metadata: spec.metadata,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Reset a terminal job back to `Pending` for a retry attempt, clearing
    /// `error`/`startedAt`/`completedAt`/`cancellation` per the monotonic
    /// status invariant (a retry is a new attempt, not a status rollback).
    pub fn reset_for_retry(&mut self) {
        self.status = JobStatus::Pending;
        self.error = None;
        self.started_at_epoch_ms = None;
        self.completed_at_epoch_ms = None;
        self.cancellation = None;
        self.retry.attempts = 0;
        self.retry.next_retry_at_epoch_ms = None;
    }
}

crate::builder! {
    pub struct JobBuilder => Job {
        set {
            id: JobId = JobId::new(),
            job_type: String = "test".to_string(),
            priority: i64 = 0,
            status: JobStatus = JobStatus::Pending,
            input: serde_json::Value = serde_json::Value::Null,
            progress: Progress = Progress::default(),
            retry: RetryState = RetryState::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_INITIAL_BACKOFF_MS),
            created_at_epoch_ms: u64 = 0,
            metadata: HashMap<String, serde_json::Value> = HashMap::new(),
        }
        option {
            name: String = None,
            session_id: String = None,
            agent_id: String = None,
            user_id: String = None,
            output: serde_json::Value = None,
            correlation_id: String = None,
        }
        computed {
            error: Option<JobError> = None,
            cancellation: Option<CancellationInfo> = None,
            started_at_epoch_ms: Option<u64> = None,
            completed_at_epoch_ms: Option<u64> = None,
            estimated_duration_ms: Option<u64> = None,
            actual_duration_ms: Option<u64> = None,
            checkpoint: Option<Checkpoint> = None,
        }
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
