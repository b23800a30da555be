// SPDX-License-Identifier: MIT

//! Job lifecycle event handlers.

use loom_core::{Event, JobStatus};

use super::MaterializedState;

pub(crate) fn apply(state: &mut MaterializedState, event: &Event) {
    match event {
        Event::JobCreated { job, .. } => {
            // Idempotent: replaying the same creation twice is a no-op.
            state.jobs.entry(job.id).or_insert_with(|| job.clone());
        }

        Event::JobStarted { job_id, epoch_ms } => {
            if let Some(job) = state.jobs.get_mut(job_id) {
                if job.status != JobStatus::Running {
                    job.status = JobStatus::Running;
                    job.started_at_epoch_ms = Some(*epoch_ms);
                    job.progress.message = "Starting".to_string();
                }
            }
        }

        Event::JobProgress { job_id, current, total, message, .. } => {
            if let Some(job) = state.jobs.get_mut(job_id) {
                job.progress.update(*current, *total, message.clone());
            }
        }

        Event::JobPaused { job_id, .. } => {
            if let Some(job) = state.jobs.get_mut(job_id) {
                job.status = JobStatus::Paused;
            }
        }

        Event::JobResumed { job_id, .. } => {
            if let Some(job) = state.jobs.get_mut(job_id) {
                if job.status == JobStatus::Paused {
                    job.status = JobStatus::Pending;
                }
            }
        }

        Event::JobCancelled { job_id, cancellation, epoch_ms } => {
            if let Some(job) = state.jobs.get_mut(job_id) {
                if job.status != JobStatus::Cancelled {
                    job.status = JobStatus::Cancelled;
                    job.cancellation = Some(cancellation.clone());
                    job.completed_at_epoch_ms = Some(*epoch_ms);
                }
            }
        }

        Event::JobFailed { job_id, error, will_retry, next_retry_at_epoch_ms, epoch_ms } => {
            if let Some(job) = state.jobs.get_mut(job_id) {
                if *will_retry {
                    job.status = JobStatus::Pending;
                    job.retry.attempts += 1;
                    job.retry.next_retry_at_epoch_ms = *next_retry_at_epoch_ms;
                    job.error = Some(error.clone());
                } else if job.status != JobStatus::Failed {
                    job.status = JobStatus::Failed;
                    job.error = Some(error.clone());
                    job.completed_at_epoch_ms = Some(*epoch_ms);
                }
            }
        }

        Event::JobCompleted { job_id, output, duration_ms, epoch_ms } => {
            if let Some(job) = state.jobs.get_mut(job_id) {
                if job.status != JobStatus::Completed {
                    job.status = JobStatus::Completed;
                    job.output = Some(output.clone());
                    job.progress.current = job.progress.total;
                    job.progress.percentage = 100;
                    job.completed_at_epoch_ms = Some(*epoch_ms);
                    job.actual_duration_ms = Some(*duration_ms);
                }
            }
        }

        Event::JobTimeout { job_id, epoch_ms } => {
            if let Some(job) = state.jobs.get_mut(job_id) {
                if job.status != JobStatus::Timeout {
                    job.status = JobStatus::Timeout;
                    job.completed_at_epoch_ms = Some(*epoch_ms);
                }
            }
        }

        Event::JobCheckpointed { job_id, state: checkpoint_state, epoch_ms } => {
            if let Some(job) = state.jobs.get_mut(job_id) {
                job.checkpoint =
                    Some(loom_core::Checkpoint { state: checkpoint_state.clone(), saved_at_epoch_ms: *epoch_ms });
            }
        }

        Event::JobRetried { job_id, .. } => {
            if let Some(job) = state.jobs.get_mut(job_id) {
                if job.is_terminal() {
                    job.reset_for_retry();
                }
            }
        }

        Event::JobLogAppended { job_id, log, .. } => {
            let logs = state.job_logs.entry(*job_id).or_default();
            if !logs.iter().any(|l| l.id == log.id) {
                logs.push(log.clone());
            }
        }

        Event::JobDeleted { job_id, .. } => {
            state.jobs.remove(job_id);
            state.job_logs.remove(job_id);
        }

        _ => {}
    }
}

#[cfg(test)]
#[path = "jobs_tests.rs"]
mod tests;
