// SPDX-License-Identifier: MIT

use super::*;
use loom_core::{Job, JobId, JobSpec};

#[test]
fn apply_event_routes_job_events_to_the_jobs_projection() {
    let mut state = MaterializedState::default();
    let job_id = JobId::new();
    let job = Job::new_with_epoch_ms(job_id, JobSpec::builder("t", serde_json::Value::Null).build(), 0);
    state.apply_event(&Event::JobCreated { job, epoch_ms: 0 });

    assert!(state.jobs.contains_key(&job_id));
}

#[test]
fn approval_key_combines_run_and_step() {
    let run_id = loom_core::RunId::new();
    assert_eq!(MaterializedState::approval_key(run_id, "deploy"), format!("{run_id}:deploy"));
}
