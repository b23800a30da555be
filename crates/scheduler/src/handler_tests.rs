// SPDX-License-Identifier: MIT

use super::*;
use loom_core::{FakeClock, JobSpec};
use std::sync::Mutex as StdMutex;

#[derive(Default)]
struct RecordingSink {
    progress: StdMutex<Vec<(u64, u64)>>,
    checkpoint: StdMutex<Option<serde_json::Value>>,
}

#[async_trait]
impl ExecutorSink for RecordingSink {
    async fn update_progress(&self, current: u64, total: u64, _message: Option<String>) {
        self.progress.lock().unwrap().push((current, total));
    }

    async fn checkpoint(&self, state: serde_json::Value) {
        *self.checkpoint.lock().unwrap() = Some(state);
    }

    async fn get_checkpoint(&self) -> Option<Checkpoint> {
        self.checkpoint.lock().unwrap().clone().map(|state| Checkpoint { state, saved_at_epoch_ms: 0 })
    }

    async fn log(&self, _level: LogLevel, _message: String, _data: Option<serde_json::Value>) {}
}

fn job() -> Job {
    Job::new_with_epoch_ms(loom_core::JobId::new(), JobSpec::builder("t", serde_json::json!({"x": 1})).build(), 0)
}

#[test]
fn valid_result_has_no_errors() {
    assert!(ValidationResult::ok().is_valid());
    assert!(!ValidationResult::invalid(vec!["bad".to_string()]).is_valid());
}

#[tokio::test]
async fn context_forwards_progress_and_checkpoint_through_sink() {
    let sink = Arc::new(RecordingSink::default());
    let ctx = ExecutionContext::new(job(), sink.clone(), CancellationToken::new());

    ctx.update_progress(3, 10, Some("working".to_string())).await;
    ctx.checkpoint(serde_json::json!({"offset": 3})).await;

    assert_eq!(*sink.progress.lock().unwrap(), vec![(3, 10)]);
    assert_eq!(ctx.get_checkpoint().await.unwrap().state, serde_json::json!({"offset": 3}));
}

#[tokio::test]
async fn context_reflects_cancellation_token() {
    let sink = Arc::new(RecordingSink::default());
    let cancel = CancellationToken::new();
    let ctx = ExecutionContext::new(job(), sink, cancel.clone());

    assert!(ctx.throw_if_cancelled().is_ok());
    cancel.cancel("user request");
    assert!(ctx.is_cancelled());
    assert_eq!(ctx.throw_if_cancelled().unwrap_err().0, "user request");
}

#[test]
fn stamp_checkpoint_uses_clock_epoch() {
    let clock = FakeClock::new();
    clock.set_epoch_ms(42);
    let checkpoint = stamp_checkpoint(serde_json::json!(null), &clock);
    assert_eq!(checkpoint.saved_at_epoch_ms, 42);
}
