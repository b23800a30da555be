// SPDX-License-Identifier: MIT

//! Leaf step executors: the step kinds that do actual work rather than
//! recursing into other steps (`conditional`/`parallel`/`loop` stay in
//! `dispatcher.rs`, since they need to call back into the dispatcher).

use crate::error::PipelineError;
use crate::eval::evaluate_expression;
use crate::substitution::{substitute, substitute_value};
use loom_core::{HttpMethod, TransformOp, WebhookAuth};
use serde_json::Value;
use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

/// Runs an inline or path-mode script via the step's configured shell.
/// Inline bodies are passed through untouched — never substituted, since a
/// templated shell body is a command-injection hazard; only a path-mode
/// script path itself is substituted.
pub async fn run_script(
    script: &str,
    shell: &str,
    working_directory: Option<&str>,
    env: &HashMap<String, String>,
    timeout_ms: u64,
    path_mode: bool,
    context: &HashMap<String, Value>,
) -> Result<Value, PipelineError> {
    let resolved = if path_mode { substitute(script, context) } else { script.to_string() };

    let mut command = Command::new(shell);
    command.arg("-c").arg(&resolved);
    command.stdout(Stdio::piped()).stderr(Stdio::piped()).stdin(Stdio::null());
    if let Some(dir) = working_directory {
        command.current_dir(substitute(dir, context));
    }
    for (key, value) in env {
        command.env(key, value);
    }
    for (key, value) in context {
        if let Some(scalar) = scalar_env_value(value) {
            command.env(format!("PIPELINE_{}", key.to_uppercase()), scalar);
        }
    }

    let mut child = command.spawn().map_err(|e| PipelineError::StepFailed(format!("spawn failed: {e}")))?;
    let mut stdout = child.stdout.take();
    let mut stderr = child.stderr.take();

    let wait = async {
        let status = child.wait().await.map_err(|e| PipelineError::StepFailed(format!("wait failed: {e}")))?;
        let mut out = String::new();
        let mut err = String::new();
        if let Some(mut s) = stdout.take() {
            let _ = s.read_to_string(&mut out).await;
        }
        if let Some(mut s) = stderr.take() {
            let _ = s.read_to_string(&mut err).await;
        }
        if status.success() {
            Ok(Value::String(out.trim_end().to_string()))
        } else {
            Err(PipelineError::StepFailed(format!(
                "script exited with {}: {}",
                status.code().unwrap_or(-1),
                err.trim_end()
            )))
        }
    };

    match tokio::time::timeout(Duration::from_millis(timeout_ms), wait).await {
        Ok(result) => result,
        Err(_) => {
            let _ = child.start_kill();
            Err(PipelineError::StepFailed("script timed out".to_string()))
        }
    }
}

fn scalar_env_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Issues the HTTP call and validates the response status, returning the
/// (possibly field-extracted) body to be stashed under `output_variable`.
pub async fn run_webhook(
    url: &str,
    method: HttpMethod,
    headers: &HashMap<String, String>,
    body: Option<&Value>,
    auth: WebhookAuth,
    auth_value: Option<&str>,
    validate_status: &[u16],
    extract_fields: &HashMap<String, String>,
    context: &HashMap<String, Value>,
    http_timeout_ms: u64,
) -> Result<Value, PipelineError> {
    let client = reqwest::Client::new();
    let resolved_url = substitute(url, context);
    let mut request = match method {
        HttpMethod::Get => client.get(&resolved_url),
        HttpMethod::Post => client.post(&resolved_url),
        HttpMethod::Put => client.put(&resolved_url),
        HttpMethod::Patch => client.patch(&resolved_url),
        HttpMethod::Delete => client.delete(&resolved_url),
    };
    request = request.timeout(Duration::from_millis(http_timeout_ms));
    for (key, value) in headers {
        request = request.header(key, substitute(value, context));
    }
    request = match auth {
        WebhookAuth::None => request,
        WebhookAuth::Basic => {
            let value = auth_value.map(|v| substitute(v, context)).unwrap_or_default();
            let mut parts = value.splitn(2, ':');
            let user = parts.next().unwrap_or_default().to_string();
            let pass = parts.next().map(|p| p.to_string());
            request.basic_auth(user, pass)
        }
        WebhookAuth::Bearer => {
            let token = auth_value.map(|v| substitute(v, context)).unwrap_or_default();
            request.bearer_auth(token)
        }
        WebhookAuth::ApiKey => {
            let key = auth_value.map(|v| substitute(v, context)).unwrap_or_default();
            request.header("X-Api-Key", key)
        }
    };
    if let Some(body) = body {
        request = request.json(&substitute_value(body, context));
    }

    let response = request.send().await.map_err(|e| PipelineError::StepFailed(format!("request failed: {e}")))?;
    let status = response.status().as_u16();
    if !validate_status.contains(&status) {
        return Err(PipelineError::StepFailed(format!("unexpected status {status}")));
    }
    let parsed: Value = response.json().await.unwrap_or(Value::Null);

    if extract_fields.is_empty() {
        return Ok(parsed);
    }
    let mut extracted = serde_json::Map::new();
    for (name, path) in extract_fields {
        if let Some(value) = path.split('.').try_fold(&parsed, |acc, part| acc.get(part)) {
            extracted.insert(name.clone(), value.clone());
        }
    }
    Ok(Value::Object(extracted))
}

/// Applies the operations in order, each reading/writing directly against
/// `context` (so a later op in the same step sees an earlier op's write).
pub fn run_transform(operations: &[TransformOp], context: &mut HashMap<String, Value>) -> Result<(), PipelineError> {
    for op in operations {
        apply_transform_op(op, context)?;
    }
    Ok(())
}

fn apply_transform_op(op: &TransformOp, context: &mut HashMap<String, Value>) -> Result<(), PipelineError> {
    match op {
        TransformOp::Set { path, value } => {
            context.insert(path.clone(), substitute_value(value, context));
        }
        TransformOp::Delete { path } => {
            context.remove(path);
        }
        TransformOp::Merge { source, target } => {
            let source_value = context.get(source).cloned().unwrap_or(Value::Null);
            let target_value = context.entry(target.clone()).or_insert(Value::Object(Default::default()));
            merge_json(target_value, &source_value);
        }
        TransformOp::Map { source, expression, target } => {
            let items = context.get(source).and_then(|v| v.as_array()).cloned().unwrap_or_default();
            let mut out = Vec::with_capacity(items.len());
            for (index, item) in items.iter().enumerate() {
                let bindings = item_bindings(item, index, None);
                out.push(evaluate_expression(expression, &bindings).unwrap_or_else(|| item.clone()));
            }
            context.insert(target.clone(), Value::Array(out));
        }
        TransformOp::Filter { source, condition, target } => {
            let items = context.get(source).and_then(|v| v.as_array()).cloned().unwrap_or_default();
            let mut out = Vec::new();
            for (index, item) in items.iter().enumerate() {
                let bindings = item_bindings(item, index, None);
                let keep = matches!(evaluate_expression(condition, &bindings), Some(Value::Bool(true)));
                if keep {
                    out.push(item.clone());
                }
            }
            context.insert(target.clone(), Value::Array(out));
        }
        TransformOp::Reduce { source, expression, initial, target } => {
            let items = context.get(source).and_then(|v| v.as_array()).cloned().unwrap_or_default();
            let mut acc = initial.clone();
            for (index, item) in items.iter().enumerate() {
                let bindings = item_bindings(item, index, Some(acc.clone()));
                acc = evaluate_expression(expression, &bindings).unwrap_or(acc);
            }
            context.insert(target.clone(), acc);
        }
        TransformOp::Extract { source, query, target } => {
            let root = context.get(source).cloned().unwrap_or(Value::Null);
            let value = query.split('.').filter(|p| !p.is_empty()).try_fold(&root, |acc, part| acc.get(part));
            context.insert(target.clone(), value.cloned().unwrap_or(Value::Null));
        }
    }
    Ok(())
}

fn item_bindings(item: &Value, index: usize, acc: Option<Value>) -> HashMap<String, Value> {
    let mut bindings = HashMap::new();
    bindings.insert("item".to_string(), item.clone());
    bindings.insert("index".to_string(), Value::from(index));
    if let Some(acc) = acc {
        bindings.insert("acc".to_string(), acc);
    }
    bindings
}

fn merge_json(target: &mut Value, source: &Value) {
    match (target, source) {
        (Value::Object(t), Value::Object(s)) => {
            for (k, v) in s {
                merge_json(t.entry(k.clone()).or_insert(Value::Null), v);
            }
        }
        (t, s) => *t = s.clone(),
    }
}

/// Sleeps for `duration_ms`, or until `until` (an epoch-ms context value)
/// is reached, capped by `timeout_ms` and cancellable.
pub async fn run_wait(
    duration_ms: Option<u64>,
    until: Option<&str>,
    timeout_ms: u64,
    context: &HashMap<String, Value>,
    now_epoch_ms: u64,
    cancel: &CancellationToken,
) -> Result<(), PipelineError> {
    let target_ms = if let Some(until) = until {
        let resolved = substitute(until, context);
        resolved.parse::<u64>().unwrap_or(now_epoch_ms)
    } else {
        now_epoch_ms + duration_ms.unwrap_or(0)
    };
    let sleep_ms = target_ms.saturating_sub(now_epoch_ms).min(timeout_ms);

    tokio::select! {
        _ = tokio::time::sleep(Duration::from_millis(sleep_ms)) => Ok(()),
        _ = cancel.cancelled() => Err(PipelineError::StepFailed("Execution cancelled".to_string())),
    }
}

#[cfg(test)]
#[path = "steps_tests.rs"]
mod tests;
