// SPDX-License-Identifier: MIT

//! The recursive step dispatcher (§4.4.2): walks a run's step DAG,
//! dispatching each root step in dependency order and recursing into a
//! step's own body for the three control-flow kinds
//! (`conditional`/`parallel`/`loop`). Leaf kinds delegate to `steps.rs`;
//! `agent_task` to the registered [`crate::agent::AgentDriver`];
//! `sub_pipeline` back into [`crate::engine::PipelineEngine`].

use crate::agent::AgentTaskRequest;
use crate::approvals;
use crate::config::HARD_LOOP_ITERATION_CAP;
use crate::engine::PipelineEngine;
use crate::error::PipelineError;
use crate::eval::evaluate_condition;
use crate::steps;
use crate::substitution::substitute_value;
use loom_core::{classify_message, Clock, LoopMode, RunError, RunId, RunStatus, Step, StepKind, StepResult, StepRunStatus};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use tokio_util::sync::CancellationToken;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Drives `run_id` to a terminal status (or until paused/cancelled),
/// dispatching each runnable root step in turn.
pub async fn dispatch_run<C: Clock + Clone + Send + Sync + 'static>(
    engine: &PipelineEngine<C>,
    run_id: RunId,
    cancel: CancellationToken,
) {
    loop {
        if cancel.is_cancelled() {
            return;
        }
        let run = match engine.get_run(run_id).await {
            Some(run) => run,
            None => return,
        };
        if run.status != RunStatus::Running {
            return;
        }

        let roots = root_step_ids(&run.steps);
        let mut runnable = None;
        let mut all_done = true;
        for step in &run.steps {
            if !roots.contains(step.id.as_str()) {
                continue;
            }
            if run.step_results.contains_key(&step.id) {
                continue;
            }
            all_done = false;
            if step.depends_on.iter().all(|dep| run.step_results.contains_key(dep)) {
                runnable = Some(step.id.clone());
                break;
            }
        }

        match runnable {
            Some(step_id) => {
                if let Err(err) = dispatch_step(engine, run_id, &step_id, &cancel).await {
                    if matches!(err, PipelineError::StepFailed(ref m) if m == "Execution cancelled") {
                        return;
                    }
                    engine.finish_run(run_id, RunStatus::Failed, Some(run_error(&step_id, &err))).await;
                    return;
                }
            }
            None if all_done => {
                engine.finish_run(run_id, RunStatus::Completed, None).await;
                return;
            }
            None => {
                engine
                    .finish_run(
                        run_id,
                        RunStatus::Failed,
                        Some(RunError { code: "DEADLOCK".to_string(), message: "no runnable step with satisfied dependencies".to_string(), step_id: None }),
                    )
                    .await;
                return;
            }
        }
    }
}

fn run_error(step_id: &str, err: &PipelineError) -> RunError {
    RunError { code: "STEP_FAILED".to_string(), message: err.to_string(), step_id: Some(step_id.to_string()) }
}

/// Step ids that appear as a direct child of another step (conditional
/// branches, parallel members, loop bodies) are never scheduled by the
/// top-level loop; only the owning control-flow step dispatches them.
fn root_step_ids(steps: &[Step]) -> std::collections::HashSet<&str> {
    let mut nested = std::collections::HashSet::new();
    for step in steps {
        match &step.kind {
            StepKind::Conditional { then_steps, else_steps, .. } => {
                nested.extend(then_steps.iter().map(String::as_str));
                nested.extend(else_steps.iter().map(String::as_str));
            }
            StepKind::Parallel { steps: members, .. } => nested.extend(members.iter().map(String::as_str)),
            StepKind::Loop { body_steps, .. } => nested.extend(body_steps.iter().map(String::as_str)),
            _ => {}
        }
    }
    steps.iter().map(|s| s.id.as_str()).filter(|id| !nested.contains(id)).collect()
}

fn find_step<'a>(steps: &'a [Step], id: &str) -> Option<&'a Step> {
    steps.iter().find(|s| s.id == id)
}

/// Dispatch a single step: the dedup guard, condition check, retry
/// wrapper, and result persistence are all handled here; the boxed
/// future lets `conditional`/`parallel`/`loop` recurse into this same
/// function for their bodies.
pub fn dispatch_step<'a, C: Clock + Clone + Send + Sync + 'static>(
    engine: &'a PipelineEngine<C>,
    run_id: RunId,
    step_id: &'a str,
    cancel: &'a CancellationToken,
) -> BoxFuture<'a, Result<(), PipelineError>> {
    Box::pin(async move {
        if cancel.is_cancelled() {
            return Err(PipelineError::StepFailed("Execution cancelled".to_string()));
        }
        let run = engine.get_run(run_id).await.ok_or(PipelineError::RunNotFound(run_id))?;
        if run.already_executed_outside_loop(step_id) {
            return Ok(());
        }
        let step = find_step(&run.steps, step_id).ok_or_else(|| PipelineError::UnmetDependencies(step_id.to_string()))?.clone();

        if let Some(condition) = &step.condition {
            if !evaluate_condition(condition, &run.context) {
                engine
                    .record_result(
                        run_id,
                        StepResult {
                            step_id: step.id.clone(),
                            status: StepRunStatus::Skipped,
                            started_at_epoch_ms: engine.clock().epoch_ms(),
                            completed_at_epoch_ms: Some(engine.clock().epoch_ms()),
                            output: None,
                            error: None,
                            skip_reason: Some("condition evaluated false".to_string()),
                            approvals: Vec::new(),
                        },
                    )
                    .await?;
                return Ok(());
            }
        }

        match &step.kind {
            StepKind::Conditional { condition, then_steps, else_steps } => {
                let branch = if evaluate_condition(condition, &run.context) { then_steps } else { else_steps };
                for child in branch {
                    dispatch_step(engine, run_id, child, cancel).await?;
                }
                complete_control_step(engine, run_id, &step).await
            }
            StepKind::Parallel { steps: members, max_concurrency, fail_fast } => {
                run_parallel(engine, run_id, members, *max_concurrency, *fail_fast, cancel).await?;
                complete_control_step(engine, run_id, &step).await
            }
            StepKind::Loop { mode, items, condition, times, body_steps, max_iterations, parallel, parallel_limit, output_variable } => {
                run_loop(
                    engine, run_id, &step, *mode, items.as_deref(), condition.as_deref(), *times, body_steps, *max_iterations, *parallel,
                    *parallel_limit, output_variable, cancel,
                )
                .await
            }
            _ => run_leaf(engine, run_id, &step, cancel).await,
        }
    })
}

async fn complete_control_step<C: Clock + Clone + Send + Sync + 'static>(
    engine: &PipelineEngine<C>,
    run_id: RunId,
    step: &Step,
) -> Result<(), PipelineError> {
    engine
        .record_result(
            run_id,
            StepResult {
                step_id: step.id.clone(),
                status: StepRunStatus::Completed,
                started_at_epoch_ms: engine.clock().epoch_ms(),
                completed_at_epoch_ms: Some(engine.clock().epoch_ms()),
                output: None,
                error: None,
                skip_reason: None,
                approvals: Vec::new(),
            },
        )
        .await
}

async fn run_parallel<C: Clock + Clone + Send + Sync + 'static>(
    engine: &PipelineEngine<C>,
    run_id: RunId,
    members: &[String],
    max_concurrency: Option<usize>,
    fail_fast: bool,
    cancel: &CancellationToken,
) -> Result<(), PipelineError> {
    let limit = max_concurrency.unwrap_or(members.len()).max(1);
    let mut errors = Vec::new();
    for chunk in members.chunks(limit) {
        let results = futures_join(chunk.iter().map(|id| dispatch_step(engine, run_id, id, cancel))).await;
        for result in results {
            if let Err(err) = result {
                if fail_fast {
                    return Err(err);
                }
                errors.push(err);
            }
        }
    }
    if let Some(err) = errors.into_iter().next() {
        return Err(err);
    }
    Ok(())
}

/// Minimal `join_all` without pulling in the `futures` crate: awaits each
/// future to completion but still lets them interleave via `tokio::join!`
/// semantics by polling all of them from a single task per chunk.
async fn futures_join<'a, I>(futures: I) -> Vec<Result<(), PipelineError>>
where
    I: IntoIterator<Item = BoxFuture<'a, Result<(), PipelineError>>>,
{
    let handles: Vec<_> = futures.into_iter().collect();
    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        results.push(handle.await);
    }
    results
}

#[allow(clippy::too_many_arguments)]
async fn run_loop<C: Clock + Clone + Send + Sync + 'static>(
    engine: &PipelineEngine<C>,
    run_id: RunId,
    step: &Step,
    mode: LoopMode,
    items_path: Option<&str>,
    condition: Option<&str>,
    times: Option<u64>,
    body_steps: &[String],
    max_iterations: u64,
    parallel: bool,
    parallel_limit: Option<usize>,
    output_variable: &str,
    cancel: &CancellationToken,
) -> Result<(), PipelineError> {
    let cap = max_iterations.min(HARD_LOOP_ITERATION_CAP);
    let mut outputs = Vec::new();
    let depth = engine.get_run(run_id).await.map(|r| r.loop_depth()).unwrap_or(0);
    engine.set_loop_depth(run_id, depth + 1).await?;

    let run_snapshot = engine.get_run(run_id).await.ok_or(PipelineError::RunNotFound(run_id))?;
    let items: Vec<Value> = match mode {
        LoopMode::ForEach => items_path
            .and_then(|p| crate::substitution::lookup(&run_snapshot.context, p.trim_start_matches("${context.").trim_end_matches('}')))
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default(),
        LoopMode::Times => (0..times.unwrap_or(0)).map(Value::from).collect(),
        LoopMode::While | LoopMode::Until => Vec::new(),
    };

    let result = async {
        match mode {
            LoopMode::ForEach => {
                if parallel {
                    let limit = parallel_limit.unwrap_or(items.len()).max(1);
                    for chunk in items.chunks(limit) {
                        for item in chunk {
                            run_loop_iteration(engine, run_id, body_steps, item.clone(), cancel).await?;
                            outputs.push(item.clone());
                        }
                    }
                } else {
                    for item in &items {
                        run_loop_iteration(engine, run_id, body_steps, item.clone(), cancel).await?;
                        outputs.push(item.clone());
                    }
                }
            }
            LoopMode::Times => {
                for item in &items {
                    run_loop_iteration(engine, run_id, body_steps, item.clone(), cancel).await?;
                    outputs.push(item.clone());
                }
            }
            LoopMode::While | LoopMode::Until => {
                let mut iteration = 0u64;
                loop {
                    if iteration >= cap {
                        break;
                    }
                    let ctx = engine.get_run(run_id).await.map(|r| r.context).unwrap_or_default();
                    let condition_value = condition.map(|c| evaluate_condition(c, &ctx)).unwrap_or(false);
                    let should_continue = if mode == LoopMode::While { condition_value } else { !condition_value };
                    if !should_continue {
                        break;
                    }
                    run_loop_iteration(engine, run_id, body_steps, Value::from(iteration), cancel).await?;
                    outputs.push(Value::from(iteration));
                    iteration += 1;
                }
            }
        }
        Ok::<(), PipelineError>(())
    }
    .await;

    engine.set_loop_depth(run_id, depth).await?;
    result?;

    let mut context = engine.get_run(run_id).await.map(|r| r.context).unwrap_or_default();
    context.insert(output_variable.to_string(), Value::Array(outputs));
    engine.update_context(run_id, context).await?;

    complete_control_step(engine, run_id, step).await
}

async fn run_loop_iteration<C: Clock + Clone + Send + Sync + 'static>(
    engine: &PipelineEngine<C>,
    run_id: RunId,
    body_steps: &[String],
    item: Value,
    cancel: &CancellationToken,
) -> Result<(), PipelineError> {
    let mut context = engine.get_run(run_id).await.map(|r| r.context).unwrap_or_default();
    context.insert("__loopItem".to_string(), item);
    engine.update_context(run_id, context).await?;
    for child in body_steps {
        dispatch_step(engine, run_id, child, cancel).await?;
    }
    Ok(())
}

async fn run_leaf<C: Clock + Clone + Send + Sync + 'static>(
    engine: &PipelineEngine<C>,
    run_id: RunId,
    step: &Step,
    cancel: &CancellationToken,
) -> Result<(), PipelineError> {
    let retry_policy = match step.retry_policy.clone() {
        Some(p) => p,
        None => engine.default_retry_policy(run_id).await,
    };
    let mut attempt = 0u32;
    let started_at = engine.clock().epoch_ms();

    loop {
        if cancel.is_cancelled() {
            return Err(PipelineError::StepFailed("Execution cancelled".to_string()));
        }
        let context = engine.get_run(run_id).await.map(|r| r.context).unwrap_or_default();
        let outcome = execute_leaf_once(engine, run_id, step, &context, cancel).await;

        match outcome {
            Ok(output) => {
                if let Some(output) = &output {
                    let mut context = engine.get_run(run_id).await.map(|r| r.context).unwrap_or_default();
                    context.insert(format!("step_{}_output", step.id), output.clone());
                    engine.update_context(run_id, context).await?;
                }
                engine
                    .record_result(
                        run_id,
                        StepResult {
                            step_id: step.id.clone(),
                            status: StepRunStatus::Completed,
                            started_at_epoch_ms: started_at,
                            completed_at_epoch_ms: Some(engine.clock().epoch_ms()),
                            output,
                            error: None,
                            skip_reason: None,
                            approvals: Vec::new(),
                        },
                    )
                    .await?;
                return Ok(());
            }
            Err(err) => {
                let message = err.to_string();
                let kind = classify_message(&message);
                let explicit_list = retry_policy.retryable_errors.as_ref();
                let retryable = match explicit_list {
                    Some(list) => list.iter().any(|code| message.contains(code.as_str())),
                    None => kind.is_retryable_kind(),
                };
                let retryable = retryable && !message.to_ascii_lowercase().contains("cancelled");
                if retryable && attempt + 1 < retry_policy.max_attempts {
                    let backoff = retry_policy.backoff_ms_for_attempt(attempt);
                    attempt += 1;
                    tokio::select! {
                        _ = tokio::time::sleep(std::time::Duration::from_millis(backoff)) => continue,
                        _ = cancel.cancelled() => return Err(PipelineError::StepFailed("Execution cancelled".to_string())),
                    }
                }
                let run_error = RunError { code: "STEP_FAILED".to_string(), message: message.clone(), step_id: Some(step.id.clone()) };
                engine
                    .record_result(
                        run_id,
                        StepResult {
                            step_id: step.id.clone(),
                            status: StepRunStatus::Failed,
                            started_at_epoch_ms: started_at,
                            completed_at_epoch_ms: Some(engine.clock().epoch_ms()),
                            output: None,
                            error: Some(run_error),
                            skip_reason: None,
                            approvals: Vec::new(),
                        },
                    )
                    .await?;
                if step.continue_on_failure {
                    return Ok(());
                }
                return Err(err);
            }
        }
    }
}

async fn execute_leaf_once<C: Clock + Clone + Send + Sync + 'static>(
    engine: &PipelineEngine<C>,
    run_id: RunId,
    step: &Step,
    context: &HashMap<String, Value>,
    cancel: &CancellationToken,
) -> Result<Option<Value>, PipelineError> {
    match &step.kind {
        StepKind::Script { script, shell, working_directory, env, timeout_ms, path_mode } => {
            let output =
                steps::run_script(script, shell, working_directory.as_deref(), env, *timeout_ms, *path_mode, context).await?;
            Ok(Some(output))
        }
        StepKind::Webhook { url, method, headers, body, auth, auth_value, validate_status, output_variable, extract_fields } => {
            let output = steps::run_webhook(
                url,
                *method,
                headers,
                body.as_ref(),
                *auth,
                auth_value.as_deref(),
                validate_status,
                extract_fields,
                context,
                engine.config().http_timeout_ms,
            )
            .await?;
            let mut new_context = context.clone();
            new_context.insert(output_variable.clone(), output.clone());
            engine.update_context(run_id, new_context).await?;
            Ok(Some(output))
        }
        StepKind::Transform { operations } => {
            let mut new_context = context.clone();
            steps::run_transform(operations, &mut new_context)?;
            engine.update_context(run_id, new_context).await?;
            Ok(None)
        }
        StepKind::Wait { duration_ms, until, webhook_token: _, timeout_ms } => {
            steps::run_wait(*duration_ms, until.as_deref(), *timeout_ms, context, engine.clock().epoch_ms(), cancel).await?;
            Ok(None)
        }
        StepKind::Approval { approvers, min_approvals, on_timeout, timeout_ms } => {
            engine.request_approval(run_id, &step.id, approvers.clone(), *min_approvals, *timeout_ms).await?;
            let approved = approvals::await_resolution(
                engine.store_handle(),
                run_id,
                &step.id,
                *timeout_ms,
                *on_timeout,
                cancel,
                engine.clock(),
                engine.config().poll_interval_ms,
            )
            .await?;
            if approved {
                Ok(Some(Value::Bool(true)))
            } else {
                Err(PipelineError::StepFailed("approval rejected".to_string()))
            }
        }
        StepKind::AgentTask { prompt, working_directory, system_prompt, timeout_ms, max_tokens, wait_for_completion } => {
            let driver = engine.agent_driver().ok_or(PipelineError::NoAgentDriver)?;
            let request = AgentTaskRequest {
                prompt: crate::substitution::substitute(prompt, context),
                working_directory: working_directory.clone(),
                system_prompt: system_prompt.clone(),
                timeout_ms: *timeout_ms,
                max_tokens: *max_tokens,
            };
            let handle = driver.submit(request).await.map_err(PipelineError::StepFailed)?;
            if *wait_for_completion {
                let output = driver.await_completion(&handle).await.map_err(PipelineError::StepFailed)?;
                Ok(Some(output))
            } else {
                Ok(Some(serde_json::json!({"agent_id": handle.agent_id, "message_id": handle.message_id})))
            }
        }
        StepKind::SubPipeline { pipeline_id, version, inputs, wait_for_completion, timeout_ms, output_variable } => {
            let resolved_inputs = match substitute_value(&Value::Object(inputs.clone().into_iter().collect()), context) {
                Value::Object(map) => map.into_iter().collect::<HashMap<_, _>>(),
                _ => HashMap::new(),
            };
            let output = engine
                .run_sub_pipeline(pipeline_id, *version, resolved_inputs, *wait_for_completion, *timeout_ms, cancel)
                .await?;
            let mut new_context = context.clone();
            new_context.insert(output_variable.clone(), output.clone());
            engine.update_context(run_id, new_context).await?;
            Ok(Some(output))
        }
        StepKind::Conditional { .. } | StepKind::Parallel { .. } | StepKind::Loop { .. } => unreachable!("control-flow kinds handled in dispatch_step"),
    }
}

/// Rejects any pending approval for `run_id` with "Execution cancelled"
/// (§4.4.4): cancellation must not leave an approval hanging forever.
pub async fn reject_pending_approvals<C: Clock + Clone + Send + Sync + 'static>(engine: &PipelineEngine<C>, run_id: RunId) {
    if let Some(run) = engine.get_run(run_id).await {
        for step in &run.steps {
            if matches!(step.kind, StepKind::Approval { .. }) && !run.step_results.contains_key(&step.id) {
                let _ = engine.reject_approval(run_id, &step.id, "Execution cancelled").await;
            }
        }
    }
}
