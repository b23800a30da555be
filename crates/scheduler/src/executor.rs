// SPDX-License-Identifier: MIT

//! Job Executor (C3): runs one job through
//! `pending → running → {completed | failed | cancelled | timeout}`.

use crate::cancellation::{CancellationToken, TIMEOUT_REASON};
use crate::config::SchedulerConfig;
use crate::handler::{ExecutionContext, ExecutorSink, Handler};
use async_trait::async_trait;
use loom_bus::{PublishContext, Publisher};
use loom_core::{Clock, ErrorKind, JobError, JobId, LogLevel};
use loom_storage::Store;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Routes `ExecutionContext` calls back into the store under a shared
/// lock, so concurrently-running executor tasks serialize at the store
/// boundary the way §5 requires ("persistence is the serialization
/// boundary").
pub struct StoreSink<C: Clock> {
    store: Arc<Mutex<Store>>,
    publisher: Publisher,
    job_id: JobId,
    session_id: Option<String>,
    clock: C,
}

#[async_trait]
impl<C: Clock + 'static> ExecutorSink for StoreSink<C> {
    async fn update_progress(&self, current: u64, total: u64, message: Option<String>) {
        let mut store = self.store.lock().await;
        if store.update_progress(self.job_id, current, total, message, &self.clock).is_ok() {
            self.publish_job_event(&store);
        }
    }

    async fn checkpoint(&self, state: serde_json::Value) {
        let mut store = self.store.lock().await;
        let _ = store.save_checkpoint(self.job_id, state, &self.clock);
    }

    async fn get_checkpoint(&self) -> Option<loom_core::Checkpoint> {
        self.store.lock().await.get_checkpoint(self.job_id).cloned()
    }

    async fn log(&self, level: LogLevel, message: String, data: Option<serde_json::Value>) {
        let mut store = self.store.lock().await;
        let _ = store.append_log(self.job_id, level, message, data, &self.clock);
    }
}

impl<C: Clock + 'static> StoreSink<C> {
    fn publish_job_event(&self, store: &Store) {
        if let Some(job) = store.get_job(self.job_id) {
            let event = loom_core::Event::JobProgress {
                job_id: self.job_id,
                current: job.progress.current,
                total: job.progress.total,
                message: Some(job.progress.message.clone()),
                epoch_ms: self.clock.epoch_ms(),
            };
            let ctx = PublishContext { session_id: self.session_id.clone(), correlation_id: job.correlation_id.clone() };
            self.publisher.publish(&event, &ctx);
        }
    }
}

pub struct ExecutorDeps<C: Clock> {
    pub store: Arc<Mutex<Store>>,
    pub publisher: Publisher,
    pub clock: C,
}

/// Run `job_id` through the full executor contract (§4.3). Returns once
/// the job has reached a terminal outcome for this attempt (which may be
/// `pending` again, if a retry was scheduled).
pub async fn execute_job<C: Clock + 'static>(
    deps: &ExecutorDeps<C>,
    config: &SchedulerConfig,
    handler: Arc<dyn Handler>,
    job_id: JobId,
    cancel: CancellationToken,
) {
    let (job, session_id) = {
        let store = deps.store.lock().await;
        match store.get_job(job_id) {
            Some(job) => (job.clone(), job.session_id.clone()),
            None => return,
        }
    };

    let validation = handler.validate(&job.input);
    if !validation.is_valid() {
        let error = JobError::validation(&validation.errors);
        finish_failed(deps, job_id, session_id.as_deref(), job.correlation_id.as_deref(), error, false, None).await;
        return;
    }

    let start_epoch_ms;
    {
        let mut store = deps.store.lock().await;
        if store.start_job(job_id, &deps.clock).is_err() {
            return;
        }
        start_epoch_ms = deps.clock.epoch_ms();
        emit(deps, session_id.as_deref(), job.correlation_id.as_deref(), loom_core::Event::JobStarted { job_id, epoch_ms: start_epoch_ms });
    }

    let timeout_ms = config.timeouts.ms_for_type(&job.job_type);
    let timeout_cancel = cancel.clone();
    let timer = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(timeout_ms)).await;
        timeout_cancel.cancel(TIMEOUT_REASON);
    });

    let sink: Arc<dyn ExecutorSink> = Arc::new(StoreSink {
        store: deps.store.clone(),
        publisher: deps.publisher.clone(),
        job_id,
        session_id: session_id.clone(),
        clock: deps.clock.clone(),
    });
    let ctx = ExecutionContext::new(job.clone(), sink, cancel.clone());

    let outcome = handler.execute(&ctx).await;
    timer.abort();

    if cancel.is_cancelled() {
        let reason = cancel.reason().unwrap_or_default();
        handler.on_cancel(&ctx).await;
        if reason == TIMEOUT_REASON {
            finish_timeout(deps, job_id, session_id.as_deref(), job.correlation_id.as_deref()).await;
        } else {
            finish_cancelled(deps, job_id, session_id.as_deref(), job.correlation_id.as_deref(), reason).await;
        }
        return;
    }

    match outcome {
        Ok(output) => finish_completed(deps, job_id, session_id.as_deref(), job.correlation_id.as_deref(), output, start_epoch_ms).await,
        Err(message) => {
            let kind = loom_core::classify_message(&message);
            let attempts_remaining = job.retry.attempts + 1 < job.retry.max_attempts;
            let retryable = kind.is_retryable_kind() && attempts_remaining;
            let error = JobError::new(error_code(kind), message, retryable);
            let next_retry = if retryable {
                let backoff = (job.retry.backoff_ms as f64 * config.retry.backoff_multiplier.powi(job.retry.attempts as i32))
                    .min(config.retry.max_backoff_ms as f64) as u64;
                Some(deps.clock.epoch_ms() + backoff)
            } else {
                None
            };
            finish_failed(deps, job_id, session_id.as_deref(), job.correlation_id.as_deref(), error, retryable, next_retry).await;
        }
    }
}

fn error_code(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::Validation => "VALIDATION_ERROR",
        ErrorKind::Cancelled => "CANCELLED",
        _ => "EXECUTION_ERROR",
    }
}

async fn finish_completed<C: Clock>(
    deps: &ExecutorDeps<C>,
    job_id: JobId,
    session_id: Option<&str>,
    correlation_id: Option<&str>,
    output: serde_json::Value,
    start_epoch_ms: u64,
) {
    let mut store = deps.store.lock().await;
    let duration_ms = deps.clock.epoch_ms().saturating_sub(start_epoch_ms);
    if store.complete_job(job_id, output.clone(), duration_ms, &deps.clock).is_err() {
        return;
    }
    drop(store);
    emit(
        deps,
        session_id,
        correlation_id,
        loom_core::Event::JobCompleted { job_id, output, duration_ms, epoch_ms: deps.clock.epoch_ms() },
    );
}

async fn finish_failed<C: Clock>(
    deps: &ExecutorDeps<C>,
    job_id: JobId,
    session_id: Option<&str>,
    correlation_id: Option<&str>,
    error: JobError,
    will_retry: bool,
    next_retry_at_epoch_ms: Option<u64>,
) {
    let mut store = deps.store.lock().await;
    if store.fail_job(job_id, error.clone(), will_retry, next_retry_at_epoch_ms, &deps.clock).is_err() {
        return;
    }
    drop(store);
    emit(
        deps,
        session_id,
        correlation_id,
        loom_core::Event::JobFailed { job_id, error, will_retry, next_retry_at_epoch_ms, epoch_ms: deps.clock.epoch_ms() },
    );
}

async fn finish_cancelled<C: Clock>(
    deps: &ExecutorDeps<C>,
    job_id: JobId,
    session_id: Option<&str>,
    correlation_id: Option<&str>,
    reason: String,
) {
    let epoch_ms = deps.clock.epoch_ms();
    let cancellation =
        loom_core::CancellationInfo { requested_at_epoch_ms: epoch_ms, requested_by: "executor".to_string(), reason: Some(reason) };
    let mut store = deps.store.lock().await;
    if store.cancel_job(job_id, cancellation.requested_by.clone(), cancellation.reason.clone(), &deps.clock).is_err() {
        return;
    }
    drop(store);
    emit(deps, session_id, correlation_id, loom_core::Event::JobCancelled { job_id, cancellation, epoch_ms });
}

async fn finish_timeout<C: Clock>(deps: &ExecutorDeps<C>, job_id: JobId, session_id: Option<&str>, correlation_id: Option<&str>) {
    let mut store = deps.store.lock().await;
    if store.timeout_job(job_id, &deps.clock).is_err() {
        return;
    }
    drop(store);
    emit(deps, session_id, correlation_id, loom_core::Event::JobTimeout { job_id, epoch_ms: deps.clock.epoch_ms() });
}

fn emit<C: Clock>(deps: &ExecutorDeps<C>, session_id: Option<&str>, correlation_id: Option<&str>, event: loom_core::Event) {
    let ctx = PublishContext { session_id: session_id.map(str::to_string), correlation_id: correlation_id.map(str::to_string) };
    deps.publisher.publish(&event, &ctx);
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;
