// SPDX-License-Identifier: MIT

use super::*;
use crate::job::{Job, JobId, JobSpec};

#[test]
fn type_name_matches_wire_tag() {
    let event = Event::JobStarted { job_id: JobId::new(), epoch_ms: 1 };
    assert_eq!(event.type_name(), "job.started");

    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["type"], "job.started");
}

#[test]
fn job_id_extracted_for_job_events_only() {
    let job = Job::new_with_epoch_ms(JobId::new(), JobSpec::builder("t", serde_json::Value::Null).build(), 0);
    let job_id = job.id;
    let event = Event::JobCreated { job, epoch_ms: 1 };
    assert_eq!(event.job_id(), Some(job_id));

    let pipeline_event = Event::PipelineDeleted { pipeline_id: crate::pipeline::PipelineId::new(), epoch_ms: 1 };
    assert_eq!(pipeline_event.job_id(), None);
}

#[test]
fn event_serde_roundtrip() {
    let event = Event::JobProgress {
        job_id: JobId::new(),
        current: 5,
        total: 10,
        message: Some("halfway".to_string()),
        epoch_ms: 42,
    };
    let json = serde_json::to_string(&event).unwrap();
    let back: Event = serde_json::from_str(&json).unwrap();
    assert_eq!(back, event);
}
