// SPDX-License-Identifier: MIT

use super::*;
use loom_core::{
    ApprovalDecision, Decision, FakeClock, JobSpec, Pipeline, PipelineId, PipelineRun, RunId,
    RunStatus, StepRunStatus, TriggerSourceType, TriggeredBy,
};
use std::collections::HashMap;
use tempfile::tempdir;

fn spec(job_type: &str, priority: i64) -> JobSpec {
    JobSpec::builder(job_type, serde_json::json!({})).priority(priority).build()
}

fn pipeline(name: &str, clock: &FakeClock) -> Pipeline {
    Pipeline {
        id: PipelineId::new(),
        name: name.to_string(),
        version: 1,
        enabled: true,
        trigger: loom_core::Trigger { trigger_type: loom_core::TriggerType::Manual, config: serde_json::json!({}), enabled: true },
        steps: Vec::new(),
        context_defaults: HashMap::new(),
        retry_policy: Default::default(),
        stats: Default::default(),
        created_at_epoch_ms: clock.epoch_ms(),
        updated_at_epoch_ms: clock.epoch_ms(),
        owner_id: None,
        tags: Vec::new(),
    }
}

fn run_of(pipeline_id: PipelineId, clock: &FakeClock) -> PipelineRun {
    PipelineRun {
        id: RunId::new(),
        pipeline_id,
        status: RunStatus::Running,
        steps: Vec::new(),
        executed_step_ids: Vec::new(),
        context: HashMap::new(),
        triggered_by: TriggeredBy { source_type: TriggerSourceType::User, id: None },
        created_at_epoch_ms: clock.epoch_ms(),
        started_at_epoch_ms: Some(clock.epoch_ms()),
        completed_at_epoch_ms: None,
        error: None,
        step_results: HashMap::new(),
    }
}

#[test]
fn create_then_get_roundtrips() {
    let dir = tempdir().unwrap();
    let clock = FakeClock::new();
    let mut store = Store::open(dir.path()).unwrap();

    let job = store.create_job(spec("send_email", 0), &clock).unwrap();
    let fetched = store.get_job(job.id).unwrap();
    assert_eq!(fetched.job_type, "send_email");
}

#[test]
fn lifecycle_events_fold_into_state() {
    let dir = tempdir().unwrap();
    let clock = FakeClock::new();
    let mut store = Store::open(dir.path()).unwrap();

    let job = store.create_job(spec("t", 0), &clock).unwrap();
    store.start_job(job.id, &clock).unwrap();
    store.update_progress(job.id, 3, 10, Some("working".to_string()), &clock).unwrap();
    store.complete_job(job.id, serde_json::json!({"ok": true}), 500, &clock).unwrap();

    let job = store.get_job(job.id).unwrap();
    assert_eq!(job.status, loom_core::JobStatus::Completed);
    assert_eq!(job.output, Some(serde_json::json!({"ok": true})));
}

#[test]
fn reopen_after_restart_replays_the_wal() {
    let dir = tempdir().unwrap();
    let clock = FakeClock::new();
    let job_id;
    {
        let mut store = Store::open(dir.path()).unwrap();
        let job = store.create_job(spec("t", 0), &clock).unwrap();
        job_id = job.id;
        store.start_job(job_id, &clock).unwrap();
    }

    let store = Store::open(dir.path()).unwrap();
    let job = store.get_job(job_id).unwrap();
    assert_eq!(job.status, loom_core::JobStatus::Running);
}

#[test]
fn snapshot_then_reopen_skips_replayed_events() {
    let dir = tempdir().unwrap();
    let clock = FakeClock::new();
    let job_id;
    {
        let mut store = Store::open(dir.path()).unwrap();
        let job = store.create_job(spec("t", 0), &clock).unwrap();
        job_id = job.id;
        store.start_job(job_id, &clock).unwrap();
        store.snapshot().unwrap();
        store.complete_job(job_id, serde_json::json!(null), 10, &clock).unwrap();
    }

    let store = Store::open(dir.path()).unwrap();
    let job = store.get_job(job_id).unwrap();
    assert_eq!(job.status, loom_core::JobStatus::Completed);
}

#[test]
fn append_log_and_get_logs() {
    let dir = tempdir().unwrap();
    let clock = FakeClock::new();
    let mut store = Store::open(dir.path()).unwrap();
    let job = store.create_job(spec("t", 0), &clock).unwrap();

    store.append_log(job.id, loom_core::LogLevel::Info, "step 1", None, &clock).unwrap();
    store.append_log(job.id, loom_core::LogLevel::Error, "boom", Some(serde_json::json!({"x": 1})), &clock).unwrap();

    let logs = store.get_logs(job.id);
    assert_eq!(logs.len(), 2);
    assert_eq!(logs[1].level, loom_core::LogLevel::Error);
}

#[test]
fn list_jobs_paginates_without_duplicates() {
    let dir = tempdir().unwrap();
    let clock = FakeClock::new();
    let mut store = Store::open(dir.path()).unwrap();
    for i in 0..5 {
        store.create_job(spec("t", i), &clock).unwrap();
        clock.advance(std::time::Duration::from_millis(1));
    }

    let mut seen = std::collections::HashSet::new();
    let mut cursor = None;
    loop {
        let page = store.list_jobs(&JobFilter::default(), SortOrder::SchedulingOrder, 2, cursor.as_deref()).unwrap();
        if page.jobs.is_empty() {
            break;
        }
        for job in &page.jobs {
            assert!(seen.insert(job.id), "duplicate page entry");
        }
        cursor = page.next_cursor;
        if cursor.is_none() {
            break;
        }
    }
    assert_eq!(seen.len(), 5);
}

#[test]
fn cleanup_deletes_only_expired_terminal_jobs() {
    let dir = tempdir().unwrap();
    let clock = FakeClock::new();
    let mut store = Store::open(dir.path()).unwrap();

    let old = store.create_job(spec("t", 0), &clock).unwrap();
    store.complete_job(old.id, serde_json::json!(null), 1, &clock).unwrap();

    clock.advance(std::time::Duration::from_secs(3600));
    let fresh = store.create_job(spec("t", 0), &clock).unwrap();
    store.complete_job(fresh.id, serde_json::json!(null), 1, &clock).unwrap();

    let retention = RetentionConfig { completed_retention_ms: 1_800_000, failed_retention_ms: 1_800_000 };
    let removed = store.cleanup(retention, clock.epoch_ms(), &clock).unwrap();

    assert_eq!(removed, 1);
    assert!(store.get_job(old.id).is_none());
    assert!(store.get_job(fresh.id).is_some());
}

#[test]
fn create_update_delete_pipeline_roundtrips() {
    let dir = tempdir().unwrap();
    let clock = FakeClock::new();
    let mut store = Store::open(dir.path()).unwrap();

    let created = store.create_pipeline(pipeline("deploy", &clock), &clock).unwrap();
    assert_eq!(store.get_pipeline(created.id).unwrap().name, "deploy");

    let mut updated = created.clone();
    updated.version = 2;
    updated.enabled = false;
    store.update_pipeline(updated, &clock).unwrap();
    assert!(!store.get_pipeline(created.id).unwrap().enabled);

    let mut stale = created.clone();
    stale.version = 1;
    stale.name = "stale-write".to_string();
    store.update_pipeline(stale, &clock).unwrap();
    assert_eq!(store.get_pipeline(created.id).unwrap().name, "deploy", "a lower-version update must not regress state");

    store.delete_pipeline(created.id, &clock).unwrap();
    assert!(store.get_pipeline(created.id).is_none());
}

#[test]
fn list_pipelines_filters_by_tag_and_enabled() {
    let dir = tempdir().unwrap();
    let clock = FakeClock::new();
    let mut store = Store::open(dir.path()).unwrap();

    let mut tagged = pipeline("with-tag", &clock);
    tagged.tags = vec!["nightly".to_string()];
    store.create_pipeline(tagged, &clock).unwrap();
    clock.advance(std::time::Duration::from_millis(1));

    let mut disabled = pipeline("off", &clock);
    disabled.enabled = false;
    store.create_pipeline(disabled, &clock).unwrap();
    clock.advance(std::time::Duration::from_millis(1));

    store.create_pipeline(pipeline("plain", &clock), &clock).unwrap();

    let filter = PipelineFilter { tags: vec!["nightly".to_string()], ..Default::default() };
    let page = store.list_pipelines(&filter, SortOrder::UserListingOrder, 10, None).unwrap();
    assert_eq!(page.pipelines.len(), 1);
    assert_eq!(page.pipelines[0].name, "with-tag");

    let filter = PipelineFilter { enabled: Some(false), ..Default::default() };
    let page = store.list_pipelines(&filter, SortOrder::UserListingOrder, 10, None).unwrap();
    assert_eq!(page.pipelines.len(), 1);
    assert_eq!(page.pipelines[0].name, "off");
}

#[test]
fn run_lifecycle_events_fold_into_state() {
    let dir = tempdir().unwrap();
    let clock = FakeClock::new();
    let mut store = Store::open(dir.path()).unwrap();

    let pipeline = store.create_pipeline(pipeline("sync", &clock), &clock).unwrap();
    let run = store.start_run(run_of(pipeline.id, &clock), &clock).unwrap();

    let result = loom_core::StepResult {
        step_id: "fetch".to_string(),
        status: StepRunStatus::Completed,
        started_at_epoch_ms: clock.epoch_ms(),
        completed_at_epoch_ms: Some(clock.epoch_ms()),
        output: Some(serde_json::json!({"rows": 3})),
        error: None,
        skip_reason: None,
        approvals: Vec::new(),
    };
    store.record_step_result(run.id, "fetch", result, &clock).unwrap();
    store.pause_run(run.id, &clock).unwrap();
    assert_eq!(store.get_run(run.id).unwrap().status, RunStatus::Paused);

    store.resume_run(run.id, &clock).unwrap();
    assert_eq!(store.get_run(run.id).unwrap().status, RunStatus::Running);

    store.complete_run(run.id, RunStatus::Completed, None, &clock).unwrap();
    let fetched = store.get_run(run.id).unwrap();
    assert_eq!(fetched.status, RunStatus::Completed);
    assert_eq!(fetched.step_results.get("fetch").unwrap().status, StepRunStatus::Completed);

    // a cancel after completion must not overwrite a terminal status
    store.cancel_run(run.id, &clock).unwrap();
    assert_eq!(store.get_run(run.id).unwrap().status, RunStatus::Completed);
}

#[test]
fn approval_resolves_once_min_approvals_is_met() {
    let dir = tempdir().unwrap();
    let clock = FakeClock::new();
    let mut store = Store::open(dir.path()).unwrap();

    let pipeline = store.create_pipeline(pipeline("release", &clock), &clock).unwrap();
    let run = store.start_run(run_of(pipeline.id, &clock), &clock).unwrap();

    store
        .request_approval(run.id, "ship", vec!["alice".to_string(), "bob".to_string()], 2, clock.epoch_ms() + 60_000, &clock)
        .unwrap();
    assert!(store.get_approval(run.id, "ship").unwrap().resolution().is_none());

    store
        .decide_approval(
            run.id,
            "ship",
            ApprovalDecision { user_id: "alice".to_string(), decision: Decision::Approved, comment: None, timestamp_epoch_ms: clock.epoch_ms() },
            &clock,
        )
        .unwrap();
    assert!(store.get_approval(run.id, "ship").unwrap().resolution().is_none());

    store
        .decide_approval(
            run.id,
            "ship",
            ApprovalDecision { user_id: "bob".to_string(), decision: Decision::Approved, comment: None, timestamp_epoch_ms: clock.epoch_ms() },
            &clock,
        )
        .unwrap();
    assert_eq!(store.get_approval(run.id, "ship").unwrap().resolution(), Some(true));
}
