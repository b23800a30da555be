// SPDX-License-Identifier: MIT

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! loom-core: shared domain types for the job queue and pipeline engine —
//! ids, clocks, the error taxonomy, and the event log that every other
//! crate in the workspace builds on.

pub mod macros;

pub mod clock;
pub mod error;
pub mod event;
pub mod id;
pub mod job;
pub mod job_log;
pub mod pipeline;
pub mod run;
pub mod step;

pub use clock::{Clock, FakeClock, SystemClock};
pub use error::{classify_message, ErrorKind};
pub use event::Event;
pub use id::short;
#[cfg(any(test, feature = "test-support"))]
pub use job::JobBuilder;
pub use job::{
    CancellationInfo, Checkpoint, Job, JobError, JobId, JobSpec, JobSpecBuilder, JobStatus, Progress,
    RetryState, DEFAULT_INITIAL_BACKOFF_MS, DEFAULT_MAX_ATTEMPTS,
};
pub use job_log::{JobLog, JobLogId, LogLevel};
pub use pipeline::{Pipeline, PipelineDefinitionError, PipelineId, PipelineStats, Trigger, TriggerType};
pub use run::{
    ApprovalDecision, ApprovalId, ApprovalRecord, Decision, PipelineRun, RunError, RunId, RunStatus,
    StepResult, StepRunStatus, TriggerSourceType, TriggeredBy,
};
pub use step::{HttpMethod, LoopMode, OnTimeout, RetryPolicy, Step, StepKind, TransformOp, WebhookAuth};
