// SPDX-License-Identifier: MIT

//! Pipeline engine error taxonomy. Mirrors `loom_core::ErrorKind`, same as
//! `loom-scheduler`'s `SchedulerError`: not-found and validation kinds
//! surface to the caller of the public API, state errors report which
//! transition was rejected.

use loom_core::{PipelineDefinitionError, PipelineId, RunId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Store(#[from] loom_storage::StoreError),
    #[error(transparent)]
    Definition(#[from] PipelineDefinitionError),
    #[error("pipeline {0} not found")]
    PipelineNotFound(PipelineId),
    #[error("pipeline {0} is disabled")]
    PipelineDisabled(PipelineId),
    #[error("run {0} not found")]
    RunNotFound(RunId),
    #[error("run {run_id} is {status}, expected {expected}")]
    InvalidRunState { run_id: RunId, status: &'static str, expected: &'static str },
    #[error("step '{0}' has unmet dependencies")]
    UnmetDependencies(String),
    #[error("no agent driver registered")]
    NoAgentDriver,
    #[error("step execution failed: {0}")]
    StepFailed(String),
}
