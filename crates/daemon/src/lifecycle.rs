// SPDX-License-Identifier: MIT

//! Daemon startup and shutdown (§1 "graceful shutdown lock/PID file"):
//! acquire an exclusive lock on the state directory first — before any
//! other startup work — so two `loomd` processes never share one WAL.

use crate::config::Config;
use crate::error::LifecycleError;
use fs2::FileExt;
use loom_bus::{InMemoryBus, Publisher};
use loom_core::SystemClock;
use loom_pipeline::{AgentDriver, PipelineEngine};
use loom_scheduler::{HandlerRegistry, Scheduler};
use loom_storage::Store;
use std::fs::File;
use std::io::Write;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

/// A running daemon: the two orchestration-core entry points
/// (`loom-scheduler`'s poll loop, `loom-pipeline`'s run dispatcher) wired
/// to one shared store and event bus. The lock file is held for the
/// struct's lifetime and released on drop.
pub struct Daemon {
    pub scheduler: Scheduler<SystemClock>,
    pub pipelines: PipelineEngine<SystemClock>,
    lock_file: File,
}

impl std::fmt::Debug for Daemon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Daemon").finish_non_exhaustive()
    }
}

impl Daemon {
    /// Acquires the state directory's lock, opens the store (replaying its
    /// WAL since the last snapshot), and wires the scheduler and pipeline
    /// engine to one shared store/publisher pair.
    pub fn start(config: Config, registry: HandlerRegistry, agent_driver: Option<Arc<dyn AgentDriver>>) -> Result<Self, LifecycleError> {
        std::fs::create_dir_all(&config.state_dir)?;

        let lock_path = config.lock_path();
        let lock_file = std::fs::OpenOptions::new().write(true).create(true).truncate(false).open(&lock_path)?;
        lock_file.try_lock_exclusive().map_err(LifecycleError::LockFailed)?;
        let mut lock_file = lock_file;
        lock_file.set_len(0)?;
        writeln!(lock_file, "{}", std::process::id())?;

        let store = Store::open(&config.state_dir)?;
        info!(state_dir = %config.state_dir.display(), "loomd state recovered");

        let publisher = Publisher::new(Arc::new(InMemoryBus::new()));
        let store = Arc::new(Mutex::new(store));
        let clock = SystemClock;

        let scheduler = Scheduler::new(store.clone(), publisher.clone(), registry, config.scheduler, clock.clone());
        let pipelines = PipelineEngine::new(store, publisher, clock, config.pipeline, agent_driver);

        Ok(Self { scheduler, pipelines, lock_file })
    }

    /// Runs the scheduler's poll loop until `shutdown` is tripped, then
    /// waits for in-flight jobs under `worker.shutdownTimeoutMs`. Pipeline
    /// runs dispatch themselves via spawned tasks and are not driven here;
    /// `PipelineEngine::cancel_run` is the caller's tool for stopping one.
    pub async fn run(&self, shutdown: loom_scheduler::CancellationToken) {
        self.scheduler.run(shutdown).await;
        self.scheduler.shutdown().await;
    }
}

impl Drop for Daemon {
    fn drop(&mut self) {
        let _ = self.lock_file.unlock();
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
