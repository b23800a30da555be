// SPDX-License-Identifier: MIT

//! The `approval` step (§4.4.2): a pending-approval handle keyed by
//! `(runId, stepId)`, resolved once enough decisions accumulate or its
//! timeout elapses. Persistence (`loom_storage::Store`) is the source of
//! truth for decisions; this module only polls it and applies the
//! `onTimeout` policy.

use crate::error::PipelineError;
use loom_core::{Clock, OnTimeout, RunId};
use loom_storage::Store;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// `Ok(true)` approved, `Ok(false)` rejected (including by `onTimeout`).
pub async fn await_resolution<C: Clock>(
    store: &Arc<Mutex<Store>>,
    run_id: RunId,
    step_id: &str,
    timeout_ms: u64,
    on_timeout: OnTimeout,
    cancel: &CancellationToken,
    clock: &C,
    poll_interval_ms: u64,
) -> Result<bool, PipelineError> {
    let deadline_epoch_ms = clock.epoch_ms() + timeout_ms;
    loop {
        if cancel.is_cancelled() {
            return Err(PipelineError::StepFailed("Execution cancelled".to_string()));
        }
        {
            let store = store.lock().await;
            if let Some(record) = store.get_approval(run_id, step_id) {
                if let Some(resolved) = record.resolution() {
                    return Ok(resolved);
                }
            }
        }
        if clock.epoch_ms() >= deadline_epoch_ms {
            return match on_timeout {
                OnTimeout::Approve => Ok(true),
                OnTimeout::Reject => Ok(false),
                OnTimeout::Fail => Err(PipelineError::StepFailed("approval timed out".to_string())),
            };
        }
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(poll_interval_ms)) => {}
            _ = cancel.cancelled() => {
                return Err(PipelineError::StepFailed("Execution cancelled".to_string()));
            }
        }
    }
}

#[cfg(test)]
#[path = "approvals_tests.rs"]
mod tests;
