// SPDX-License-Identifier: MIT

//! `loomd`: runs the orchestration core standalone against a state
//! directory with no job handlers registered, for smoke-testing the
//! scheduler/pipeline wiring. An embedder linking `loom-daemon` as a
//! library registers its own handlers via [`loom_daemon::Daemon::start`]
//! instead of running this binary.

use loom_daemon::{Config, Daemon};
use loom_scheduler::{CancellationToken, HandlerRegistry, SHUTDOWN_REASON};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let state_dir = std::env::var("LOOMD_STATE_DIR").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from("./loomd-state"));
    let config = Config::new(state_dir);

    let daemon = match Daemon::start(config, HandlerRegistry::new(), None) {
        Ok(daemon) => daemon,
        Err(err) => {
            tracing::error!(error = %err, "loomd failed to start");
            std::process::exit(1);
        }
    };

    let shutdown = CancellationToken::new();
    let run_shutdown = shutdown.clone();
    let run = tokio::spawn(async move { daemon.run(run_shutdown).await });

    tokio::signal::ctrl_c().await.expect("failed to listen for ctrl_c");
    tracing::info!("shutdown requested");
    shutdown.cancel(SHUTDOWN_REASON);
    let _ = run.await;
}
