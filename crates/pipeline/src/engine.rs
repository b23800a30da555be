// SPDX-License-Identifier: MIT

//! Pipeline Engine (C4) public API: pipeline CRUD plus the run lifecycle
//! (`run_pipeline`/`pause_run`/`resume_run`/`cancel_run`/`decide_approval`).
//! Mirrors `loom-scheduler`'s `Scheduler` shape: a small `Clone` handle
//! wrapping a shared store/publisher/clock, with one cooperative
//! cancellation token per in-flight run instead of a registry of
//! in-process handler objects.

use crate::agent::AgentDriver;
use crate::config::PipelineConfig;
use crate::dispatcher;
use crate::error::PipelineError;
use loom_bus::{PublishContext, Publisher};
use loom_core::{
    ApprovalDecision, Clock, Decision, Event, Pipeline, PipelineId, PipelineRun, RetryPolicy, RunError, RunId, RunStatus, StepResult,
    TriggeredBy,
};
use loom_storage::{PipelineFilter, PipelinePage, SortOrder, Store};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

pub struct PipelineEngine<C: Clock> {
    store: Arc<Mutex<Store>>,
    publisher: Publisher,
    clock: C,
    config: PipelineConfig,
    agent_driver: Option<Arc<dyn AgentDriver>>,
    cancellations: Arc<Mutex<HashMap<RunId, CancellationToken>>>,
}

impl<C: Clock> Clone for PipelineEngine<C> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            publisher: self.publisher.clone(),
            clock: self.clock.clone(),
            config: self.config.clone(),
            agent_driver: self.agent_driver.clone(),
            cancellations: self.cancellations.clone(),
        }
    }
}

impl<C: Clock + Clone + Send + Sync + 'static> PipelineEngine<C> {
    pub fn new(store: Arc<Mutex<Store>>, publisher: Publisher, clock: C, config: PipelineConfig, agent_driver: Option<Arc<dyn AgentDriver>>) -> Self {
        Self { store, publisher, clock, config, agent_driver, cancellations: Arc::new(Mutex::new(HashMap::new())) }
    }

    // ---- pipeline CRUD ----

    pub async fn create_pipeline(&self, mut pipeline: Pipeline) -> Result<Pipeline, PipelineError> {
        Pipeline::validate_steps(&pipeline.steps)?;
        pipeline.id = PipelineId::new();
        let mut store = self.store.lock().await;
        let created = store.create_pipeline(pipeline, &self.clock)?;
        drop(store);
        self.emit(Event::PipelineCreated { pipeline: created.clone(), epoch_ms: self.clock.epoch_ms() });
        Ok(created)
    }

    pub async fn update_pipeline(&self, pipeline: Pipeline) -> Result<(), PipelineError> {
        Pipeline::validate_steps(&pipeline.steps)?;
        let mut store = self.store.lock().await;
        store.update_pipeline(pipeline.clone(), &self.clock)?;
        drop(store);
        self.emit(Event::PipelineUpdated { pipeline, epoch_ms: self.clock.epoch_ms() });
        Ok(())
    }

    pub async fn delete_pipeline(&self, pipeline_id: PipelineId) -> Result<(), PipelineError> {
        let mut store = self.store.lock().await;
        store.delete_pipeline(pipeline_id, &self.clock)?;
        drop(store);
        self.emit(Event::PipelineDeleted { pipeline_id, epoch_ms: self.clock.epoch_ms() });
        Ok(())
    }

    pub async fn get_pipeline(&self, pipeline_id: PipelineId) -> Option<Pipeline> {
        self.store.lock().await.get_pipeline(pipeline_id).cloned()
    }

    pub async fn list_pipelines(
        &self,
        filter: &PipelineFilter,
        order: SortOrder,
        limit: usize,
        cursor: Option<&str>,
    ) -> Result<PipelinePage, PipelineError> {
        Ok(self.store.lock().await.list_pipelines(filter, order, limit, cursor)?)
    }

    // ---- run lifecycle ----

    pub async fn run_pipeline(&self, pipeline_id: PipelineId, triggered_by: TriggeredBy, params: HashMap<String, Value>) -> Result<PipelineRun, PipelineError> {
        let mut store = self.store.lock().await;
        let pipeline = store.get_pipeline(pipeline_id).cloned().ok_or(PipelineError::PipelineNotFound(pipeline_id))?;
        if !pipeline.enabled {
            return Err(PipelineError::PipelineDisabled(pipeline_id));
        }
        let mut context = pipeline.context_defaults.clone();
        context.extend(params);
        let now = self.clock.epoch_ms();
        let run = PipelineRun {
            id: RunId::new(),
            pipeline_id,
            status: RunStatus::Running,
            steps: pipeline.steps.clone(),
            executed_step_ids: Vec::new(),
            context,
            triggered_by,
            created_at_epoch_ms: now,
            started_at_epoch_ms: Some(now),
            completed_at_epoch_ms: None,
            error: None,
            step_results: HashMap::new(),
        };
        let started = store.start_run(run, &self.clock)?;
        drop(store);
        self.emit(Event::RunStarted { run: started.clone(), epoch_ms: now });

        self.spawn_dispatch(started.id).await;
        Ok(started)
    }

    async fn spawn_dispatch(&self, run_id: RunId) {
        let cancel = CancellationToken::new();
        self.cancellations.lock().await.insert(run_id, cancel.clone());
        let engine = self.clone();
        tokio::spawn(async move {
            dispatcher::dispatch_run(&engine, run_id, cancel).await;
        });
    }

    /// Sets `status = paused` before tripping the run's cancellation
    /// token, so an observer reading the store mid-transition never sees
    /// a still-`running` status for a run whose execution has already
    /// stopped taking new steps.
    pub async fn pause_run(&self, run_id: RunId) -> Result<(), PipelineError> {
        let mut store = self.store.lock().await;
        store.pause_run(run_id, &self.clock)?;
        drop(store);
        self.emit(Event::RunPaused { run_id, epoch_ms: self.clock.epoch_ms() });
        if let Some(token) = self.cancellations.lock().await.remove(&run_id) {
            token.cancel();
        }
        Ok(())
    }

    pub async fn resume_run(&self, run_id: RunId) -> Result<(), PipelineError> {
        let mut store = self.store.lock().await;
        store.resume_run(run_id, &self.clock)?;
        drop(store);
        self.emit(Event::RunResumed { run_id, epoch_ms: self.clock.epoch_ms() });
        self.spawn_dispatch(run_id).await;
        Ok(())
    }

    pub async fn cancel_run(&self, run_id: RunId) -> Result<(), PipelineError> {
        let mut store = self.store.lock().await;
        store.cancel_run(run_id, &self.clock)?;
        drop(store);
        self.emit(Event::RunCancelled { run_id, epoch_ms: self.clock.epoch_ms() });
        if let Some(token) = self.cancellations.lock().await.remove(&run_id) {
            token.cancel();
        }
        dispatcher::reject_pending_approvals(self, run_id).await;
        Ok(())
    }

    pub async fn decide_approval(&self, run_id: RunId, step_id: impl Into<String>, user_id: impl Into<String>, approve: bool, comment: Option<String>) -> Result<(), PipelineError> {
        let decision = ApprovalDecision {
            user_id: user_id.into(),
            decision: if approve { Decision::Approved } else { Decision::Rejected },
            comment,
            timestamp_epoch_ms: self.clock.epoch_ms(),
        };
        let step_id = step_id.into();
        let mut store = self.store.lock().await;
        store.decide_approval(run_id, step_id.clone(), decision.clone(), &self.clock)?;
        drop(store);
        self.emit(Event::RunApprovalDecided { run_id, step_id, decision, epoch_ms: self.clock.epoch_ms() });
        Ok(())
    }

    pub async fn get_run(&self, run_id: RunId) -> Option<PipelineRun> {
        self.store.lock().await.get_run(run_id).cloned()
    }

    pub async fn list_runs(&self, pipeline_id: Option<PipelineId>) -> Vec<PipelineRun> {
        self.store.lock().await.list_runs(pipeline_id).into_iter().cloned().collect()
    }

    // ---- collaborators used by dispatcher.rs ----

    pub(crate) fn clock(&self) -> &C {
        &self.clock
    }

    pub(crate) fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub(crate) fn store_handle(&self) -> &Arc<Mutex<Store>> {
        &self.store
    }

    pub(crate) fn agent_driver(&self) -> Option<Arc<dyn AgentDriver>> {
        self.agent_driver.clone()
    }

    pub(crate) async fn default_retry_policy(&self, run_id: RunId) -> RetryPolicy {
        let store = self.store.lock().await;
        store
            .get_run(run_id)
            .and_then(|run| store.get_pipeline(run.pipeline_id))
            .map(|pipeline| pipeline.retry_policy.clone())
            .unwrap_or_default()
    }

    pub(crate) async fn record_result(&self, run_id: RunId, result: StepResult) -> Result<(), PipelineError> {
        let step_id = result.step_id.clone();
        let mut store = self.store.lock().await;
        store.record_step_result(run_id, step_id.clone(), result.clone(), &self.clock)?;
        drop(store);
        self.emit(Event::RunStepCompleted { run_id, step_id, result, epoch_ms: self.clock.epoch_ms() });
        Ok(())
    }

    pub(crate) async fn update_context(&self, run_id: RunId, context: HashMap<String, Value>) -> Result<(), PipelineError> {
        let mut store = self.store.lock().await;
        store.update_run_context(run_id, context.clone(), &self.clock)?;
        drop(store);
        self.emit(Event::RunContextUpdated { run_id, context, epoch_ms: self.clock.epoch_ms() });
        Ok(())
    }

    pub(crate) async fn set_loop_depth(&self, run_id: RunId, depth: i64) -> Result<(), PipelineError> {
        let mut context = self.get_run(run_id).await.map(|r| r.context).unwrap_or_default();
        context.insert("__loopDepth".to_string(), serde_json::json!(depth));
        self.update_context(run_id, context).await
    }

    pub(crate) async fn request_approval(&self, run_id: RunId, step_id: &str, approvers: Vec<String>, min_approvals: u32, timeout_ms: u64) -> Result<(), PipelineError> {
        let timeout_at_epoch_ms = self.clock.epoch_ms() + timeout_ms;
        let mut store = self.store.lock().await;
        store.request_approval(run_id, step_id.to_string(), approvers.clone(), min_approvals, timeout_at_epoch_ms, &self.clock)?;
        drop(store);
        self.emit(Event::RunApprovalRequested {
            run_id,
            step_id: step_id.to_string(),
            approvers,
            min_approvals,
            timeout_at_epoch_ms,
            epoch_ms: self.clock.epoch_ms(),
        });
        Ok(())
    }

    pub(crate) async fn reject_approval(&self, run_id: RunId, step_id: &str, reason: &str) -> Result<(), PipelineError> {
        self.decide_approval(run_id, step_id, "system", false, Some(reason.to_string())).await
    }

    /// Starts the named pipeline as a child run and, if `wait_for_completion`
    /// is set, polls until it reaches a terminal status or `timeout_ms`
    /// elapses.
    pub(crate) async fn run_sub_pipeline(
        &self,
        pipeline_ref: &str,
        _version: Option<u32>,
        inputs: HashMap<String, Value>,
        wait_for_completion: bool,
        timeout_ms: u64,
        cancel: &CancellationToken,
    ) -> Result<Value, PipelineError> {
        let pipeline_id = PipelineId::from_string(pipeline_ref);
        let triggered_by = TriggeredBy { source_type: loom_core::TriggerSourceType::Api, id: None };
        let child = self.run_pipeline(pipeline_id, triggered_by, inputs).await?;
        if !wait_for_completion {
            return Ok(serde_json::json!({"run_id": child.id.to_string(), "status": child.status}));
        }

        let deadline = self.clock.epoch_ms() + timeout_ms;
        loop {
            if cancel.is_cancelled() {
                return Err(PipelineError::StepFailed("Execution cancelled".to_string()));
            }
            if let Some(run) = self.get_run(child.id).await {
                if run.status.is_terminal() {
                    return Ok(serde_json::json!({"run_id": run.id.to_string(), "status": run.status, "context": run.context}));
                }
            }
            if self.clock.epoch_ms() >= deadline {
                return Err(PipelineError::StepFailed("sub-pipeline timed out".to_string()));
            }
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(self.config.poll_interval_ms)) => {}
                _ = cancel.cancelled() => return Err(PipelineError::StepFailed("Execution cancelled".to_string())),
            }
        }
    }

    pub(crate) async fn finish_run(&self, run_id: RunId, status: RunStatus, error: Option<RunError>) {
        let mut store = self.store.lock().await;
        if store.complete_run(run_id, status, error.clone(), &self.clock).is_err() {
            return;
        }
        drop(store);
        self.cancellations.lock().await.remove(&run_id);
        self.emit(Event::RunCompleted { run_id, status, error, epoch_ms: self.clock.epoch_ms() });
    }

    fn emit(&self, event: Event) {
        self.publisher.publish(&event, &PublishContext::default());
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
