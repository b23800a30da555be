// SPDX-License-Identifier: MIT

use super::*;
use loom_bus::InMemoryBus;
use loom_core::{FakeClock, HttpMethod, LoopMode, RetryPolicy, Step, StepKind, TransformOp, Trigger, TriggerSourceType, TriggerType};
use serde_json::json;
use std::time::Duration;
use tempfile::tempdir;

fn step(id: &str, kind: StepKind, depends_on: Vec<&str>) -> Step {
    Step {
        id: id.to_string(),
        name: id.to_string(),
        kind,
        depends_on: depends_on.into_iter().map(String::from).collect(),
        condition: None,
        retry_policy: Some(RetryPolicy { max_attempts: 1, ..Default::default() }),
        continue_on_failure: false,
        timeout_ms: None,
    }
}

fn script_step(id: &str, script: &str, depends_on: Vec<&str>) -> Step {
    step(
        id,
        StepKind::Script { script: script.to_string(), shell: "/bin/sh".to_string(), working_directory: None, env: Default::default(), timeout_ms: 5_000, path_mode: false },
        depends_on,
    )
}

async fn make_engine(dir: &std::path::Path) -> (PipelineEngine<FakeClock>, FakeClock) {
    let clock = FakeClock::new();
    let store = Store::open(dir).unwrap();
    let publisher = Publisher::new(std::sync::Arc::new(InMemoryBus::new()));
    let engine = PipelineEngine::new(std::sync::Arc::new(Mutex::new(store)), publisher, clock.clone(), PipelineConfig::default(), None);
    (engine, clock)
}

fn pipeline_with_steps(steps: Vec<Step>, clock: &FakeClock) -> Pipeline {
    Pipeline {
        id: PipelineId::new(),
        name: "test".to_string(),
        version: 1,
        enabled: true,
        trigger: Trigger { trigger_type: TriggerType::Manual, config: json!({}), enabled: true },
        steps,
        context_defaults: HashMap::new(),
        retry_policy: RetryPolicy::default(),
        stats: Default::default(),
        created_at_epoch_ms: clock.epoch_ms(),
        updated_at_epoch_ms: clock.epoch_ms(),
        owner_id: None,
        tags: Vec::new(),
    }
}

fn manual_trigger() -> TriggeredBy {
    TriggeredBy { source_type: TriggerSourceType::User, id: None }
}

async fn wait_terminal(engine: &PipelineEngine<FakeClock>, run_id: RunId) -> PipelineRun {
    for _ in 0..500 {
        if let Some(run) = engine.get_run(run_id).await {
            if run.status.is_terminal() {
                return run;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("run {run_id} never reached a terminal status");
}

#[tokio::test]
async fn sequential_steps_run_in_dependency_order() {
    let dir = tempdir().unwrap();
    let (engine, clock) = make_engine(dir.path()).await;
    let steps = vec![script_step("a", "echo a", vec![]), script_step("b", "echo b", vec!["a"])];
    let pipeline = engine.create_pipeline(pipeline_with_steps(steps, &clock)).await.unwrap();

    let run = engine.run_pipeline(pipeline.id, manual_trigger(), HashMap::new()).await.unwrap();
    let finished = wait_terminal(&engine, run.id).await;

    assert_eq!(finished.status, RunStatus::Completed);
    assert!(finished.step_results.contains_key("a"));
    assert!(finished.step_results.contains_key("b"));
}

#[tokio::test]
async fn parallel_fail_fast_marks_run_failed() {
    let dir = tempdir().unwrap();
    let (engine, clock) = make_engine(dir.path()).await;
    let steps = vec![
        script_step("ok", "echo ok", vec![]),
        script_step("boom", "exit 1", vec![]),
        step("gate", StepKind::Parallel { steps: vec!["ok".to_string(), "boom".to_string()], max_concurrency: None, fail_fast: true }, vec![]),
    ];
    let pipeline = engine.create_pipeline(pipeline_with_steps(steps, &clock)).await.unwrap();

    let run = engine.run_pipeline(pipeline.id, manual_trigger(), HashMap::new()).await.unwrap();
    let finished = wait_terminal(&engine, run.id).await;

    assert_eq!(finished.status, RunStatus::Failed);
}

#[tokio::test]
async fn approval_gate_blocks_until_decided() {
    let dir = tempdir().unwrap();
    let (engine, clock) = make_engine(dir.path()).await;
    let steps = vec![
        step("gate", StepKind::Approval { approvers: vec!["ada".to_string()], min_approvals: 1, on_timeout: loom_core::OnTimeout::Fail, timeout_ms: 60_000 }, vec![]),
        script_step("after", "echo go", vec!["gate"]),
    ];
    let pipeline = engine.create_pipeline(pipeline_with_steps(steps, &clock)).await.unwrap();

    let run = engine.run_pipeline(pipeline.id, manual_trigger(), HashMap::new()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(engine.get_run(run.id).await.unwrap().status, RunStatus::Running);

    engine.decide_approval(run.id, "gate", "ada", true, None).await.unwrap();
    let finished = wait_terminal(&engine, run.id).await;

    assert_eq!(finished.status, RunStatus::Completed);
}

#[tokio::test]
async fn loop_for_each_collects_all_items_into_output_variable() {
    let dir = tempdir().unwrap();
    let (engine, clock) = make_engine(dir.path()).await;
    let steps = vec![step(
        "over-numbers",
        StepKind::Loop {
            mode: LoopMode::ForEach,
            items: Some("${context.numbers}".to_string()),
            condition: None,
            times: None,
            body_steps: Vec::new(),
            max_iterations: 10,
            parallel: false,
            parallel_limit: None,
            output_variable: "collected".to_string(),
        },
        vec![],
    )];
    let mut pipeline = pipeline_with_steps(steps, &clock);
    pipeline.context_defaults.insert("numbers".to_string(), json!([1, 2, 3]));
    let pipeline = engine.create_pipeline(pipeline).await.unwrap();

    let run = engine.run_pipeline(pipeline.id, manual_trigger(), HashMap::new()).await.unwrap();
    let finished = wait_terminal(&engine, run.id).await;

    assert_eq!(finished.status, RunStatus::Completed);
    assert_eq!(finished.context.get("collected"), Some(&json!([1, 2, 3])));
}

#[tokio::test]
async fn pause_then_resume_continues_execution() {
    let dir = tempdir().unwrap();
    let (engine, clock) = make_engine(dir.path()).await;
    let steps = vec![
        step("wait", StepKind::Wait { duration_ms: Some(40), until: None, webhook_token: None, timeout_ms: 5_000 }, vec![]),
        script_step("after", "echo done", vec!["wait"]),
    ];
    let pipeline = engine.create_pipeline(pipeline_with_steps(steps, &clock)).await.unwrap();

    let run = engine.run_pipeline(pipeline.id, manual_trigger(), HashMap::new()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    engine.pause_run(run.id).await.unwrap();
    assert_eq!(engine.get_run(run.id).await.unwrap().status, RunStatus::Paused);

    engine.resume_run(run.id).await.unwrap();
    let finished = wait_terminal(&engine, run.id).await;
    assert_eq!(finished.status, RunStatus::Completed);
}

#[tokio::test]
async fn webhook_step_kind_is_accepted_by_validation() {
    let dir = tempdir().unwrap();
    let (engine, clock) = make_engine(dir.path()).await;
    let steps = vec![step(
        "call",
        StepKind::Webhook {
            url: "http://127.0.0.1:1/unreachable".to_string(),
            method: HttpMethod::Get,
            headers: HashMap::new(),
            body: None,
            auth: loom_core::WebhookAuth::None,
            auth_value: None,
            validate_status: vec![200],
            output_variable: "resp".to_string(),
            extract_fields: HashMap::new(),
        },
        vec![],
    )];
    let pipeline = engine.create_pipeline(pipeline_with_steps(steps, &clock)).await.unwrap();

    let run = engine.run_pipeline(pipeline.id, manual_trigger(), HashMap::new()).await.unwrap();
    let finished = wait_terminal(&engine, run.id).await;

    // unreachable host: the request fails and, with no retryable-error
    // allowlist, classifies as transient-but-exhausted after one attempt.
    assert_eq!(finished.status, RunStatus::Failed);
}
