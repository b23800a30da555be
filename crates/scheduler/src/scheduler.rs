// SPDX-License-Identifier: MIT

//! Job Scheduler (C2): the polling admission loop that decides which
//! pending jobs get to run next (§4.2) and hands admitted jobs off to the
//! executor (§4.3).

use crate::cancellation::{CancellationToken, SHUTDOWN_REASON};
use crate::config::SchedulerConfig;
use crate::error::SchedulerError;
use crate::executor::{self, ExecutorDeps};
use crate::handler::Handler;
use crate::inflight::InFlightSet;
use crate::registry::HandlerRegistry;
use loom_bus::Publisher;
use loom_core::{Clock, Job, JobId, JobSpec, JobStatus};
use loom_storage::{JobFilter, JobPage, SortOrder, Store};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Things `create_job` and friends need but the inner poll loop doesn't
/// touch directly — kept together so `Scheduler::new` takes one bag of
/// dependencies rather than a long parameter list.
pub struct Scheduler<C: Clock + 'static> {
    store: Arc<Mutex<Store>>,
    publisher: Publisher,
    registry: Arc<HandlerRegistry>,
    config: SchedulerConfig,
    inflight: Arc<Mutex<InFlightSet>>,
    clock: C,
    running: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl<C: Clock + 'static> Clone for Scheduler<C> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            publisher: self.publisher.clone(),
            registry: self.registry.clone(),
            config: self.config.clone(),
            inflight: self.inflight.clone(),
            clock: self.clock.clone(),
            running: self.running.clone(),
        }
    }
}

impl<C: Clock + 'static> Scheduler<C> {
    pub fn new(store: Arc<Mutex<Store>>, publisher: Publisher, registry: HandlerRegistry, config: SchedulerConfig, clock: C) -> Self {
        Self {
            store,
            publisher,
            registry: Arc::new(registry),
            config,
            inflight: Arc::new(Mutex::new(InFlightSet::new())),
            clock,
            running: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub async fn create_job(&self, spec: JobSpec) -> Result<Job, SchedulerError> {
        let mut store = self.store.lock().await;
        Ok(store.create_job(spec, &self.clock)?)
    }

    pub async fn pause_job(&self, job_id: JobId) -> Result<(), SchedulerError> {
        let mut store = self.store.lock().await;
        store.pause_job(job_id, &self.clock)?;
        Ok(())
    }

    pub async fn resume_job(&self, job_id: JobId) -> Result<(), SchedulerError> {
        let mut store = self.store.lock().await;
        store.resume_job(job_id, &self.clock)?;
        Ok(())
    }

    /// Cancel `job_id`. If it's currently in flight, trips its cancellation
    /// token so the executor observes it on the next checkpoint/poll;
    /// otherwise marks it cancelled directly in the store.
    pub async fn cancel_job(&self, job_id: JobId, requested_by: impl Into<String>, reason: Option<String>) -> Result<(), SchedulerError> {
        let requested_by = requested_by.into();
        let token = self.inflight.lock().await.cancel_token(job_id);
        match token {
            Some(token) => {
                token.cancel(reason.unwrap_or(requested_by));
                Ok(())
            }
            None => {
                let mut store = self.store.lock().await;
                store.cancel_job(job_id, requested_by, reason, &self.clock)?;
                Ok(())
            }
        }
    }

    pub async fn get_job(&self, job_id: JobId) -> Option<Job> {
        self.store.lock().await.get_job(job_id).cloned()
    }

    pub async fn list_jobs(&self, filter: &JobFilter, order: SortOrder, limit: usize, cursor: Option<&str>) -> Result<JobPage, SchedulerError> {
        Ok(self.store.lock().await.list_jobs(filter, order, limit, cursor)?)
    }

    /// One admission pass (§4.2): if already at the global ceiling, do
    /// nothing; otherwise pull pending jobs in `(priority DESC, createdAt
    /// ASC)` order, skip any whose `nextRetryAt` hasn't arrived, and admit
    /// until capacity runs out.
    pub async fn poll_once(&self) -> usize {
        let available = {
            let inflight = self.inflight.lock().await;
            self.config.concurrency.global.saturating_sub(inflight.len())
        };
        if available == 0 {
            return 0;
        }

        let now = self.clock.epoch_ms();
        let candidates = {
            let store = self.store.lock().await;
            let filter = JobFilter { status: Some(JobStatus::Pending), ..Default::default() };
            store
                .list_jobs(&filter, SortOrder::SchedulingOrder, available.max(1) * 4 + 16, None)
                .map(|page| page.jobs)
                .unwrap_or_default()
        };

        let mut admitted = 0;
        for job in candidates {
            if admitted >= available {
                break;
            }
            if let Some(next_retry) = job.retry.next_retry_at_epoch_ms {
                if next_retry > now {
                    continue;
                }
            }

            let handler = match self.registry.get(&job.job_type) {
                Some(handler) => handler,
                None => {
                    warn!(job_type = %job.job_type, "no handler registered, skipping job");
                    continue;
                }
            };

            let admitted_here = {
                let mut inflight = self.inflight.lock().await;
                if !inflight.can_admit(&job.job_type, job.session_id.as_deref(), &self.config.concurrency) {
                    false
                } else {
                    let cancel = CancellationToken::new();
                    inflight.insert(job.id, job.job_type.clone(), job.session_id.clone(), cancel);
                    true
                }
            };
            if !admitted_here {
                continue;
            }

            self.spawn_executor(job.id, handler).await;
            admitted += 1;
        }
        admitted
    }

    async fn spawn_executor(&self, job_id: JobId, handler: Arc<dyn Handler>) {
        let cancel = { self.inflight.lock().await.cancel_token(job_id).unwrap_or_default() };
        let deps = ExecutorDeps { store: self.store.clone(), publisher: self.publisher.clone(), clock: self.clock.clone() };
        let config = self.config.clone();
        let inflight = self.inflight.clone();
        let handle = tokio::spawn(async move {
            executor::execute_job(&deps, &config, handler, job_id, cancel).await;
            inflight.lock().await.remove(job_id);
        });
        self.running.lock().await.push(handle);
    }

    /// Drive `poll_once` on a fixed interval until `shutdown` is
    /// requested. Returns once the loop itself has stopped — in-flight
    /// executor tasks may still be finishing, see [`Scheduler::shutdown`].
    pub async fn run(&self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(std::time::Duration::from_millis(self.config.worker.poll_interval_ms));
        loop {
            ticker.tick().await;
            if shutdown.is_cancelled() {
                return;
            }
            self.poll_once().await;
        }
    }

    /// Stop admitting new work and wait up to `shutdown_timeout_ms` for
    /// in-flight jobs to finish on their own; anything still running past
    /// that deadline gets its cancellation token tripped.
    pub async fn shutdown(&self) {
        let deadline = tokio::time::sleep(std::time::Duration::from_millis(self.config.worker.shutdown_timeout_ms));
        tokio::pin!(deadline);
        loop {
            if self.inflight.lock().await.is_empty() {
                break;
            }
            tokio::select! {
                _ = tokio::time::sleep(std::time::Duration::from_millis(25)) => {}
                _ = &mut deadline => {
                    info!("shutdown deadline reached with jobs still in flight, cancelling");
                    self.inflight.lock().await.cancel_all(SHUTDOWN_REASON);
                    break;
                }
            }
        }
        let handles: Vec<_> = std::mem::take(&mut *self.running.lock().await);
        for handle in handles {
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
