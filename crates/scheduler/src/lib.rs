// SPDX-License-Identifier: MIT

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! loom-scheduler: the Job Scheduler (C2) and Job Executor (C3). Jobs are
//! admitted off the pending queue under global/per-type/per-session
//! concurrency ceilings (§4.2), then driven through
//! `running → {completed | failed | cancelled | timeout}` by a handler
//! registered for the job's type (§4.3, §6).

mod cancellation;
mod config;
mod error;
mod executor;
mod handler;
mod inflight;
mod registry;
mod scheduler;

pub use cancellation::{CancellationToken, Cancelled, SHUTDOWN_REASON, TIMEOUT_REASON};
pub use config::{CleanupConfig, ConcurrencyConfig, RetryConfig, SchedulerConfig, TimeoutConfig, WorkerConfig};
pub use error::SchedulerError;
pub use executor::{execute_job, ExecutorDeps, StoreSink};
pub use handler::{stamp_checkpoint, ExecutionContext, ExecutorSink, Handler, ValidationResult};
pub use inflight::InFlightSet;
pub use registry::HandlerRegistry;
pub use scheduler::Scheduler;
