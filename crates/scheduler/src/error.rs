// SPDX-License-Identifier: MIT

//! Scheduler/executor error taxonomy. Mirrors `loom_core::ErrorKind`: the
//! variants here are what callers actually see, but each maps to one of
//! the coarse kinds for retry/propagation decisions.

use loom_core::JobId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Store(#[from] loom_storage::StoreError),
    #[error("job {0} not found")]
    NotFound(JobId),
    #[error("no handler registered for job type '{0}'")]
    NoHandler(String),
    #[error("job {job_id} is {status}, expected {expected}")]
    InvalidState { job_id: JobId, status: String, expected: &'static str },
}
