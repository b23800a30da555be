// SPDX-License-Identifier: MIT

//! Cooperative cancellation: a token the executor sets and the handler's
//! `isCancelled()`/`throwIfCancelled()` consult. Timeout is modeled as a
//! cancellation with reason `"timeout"`, distinct from a user-requested
//! cancel only by that reason string.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

pub const TIMEOUT_REASON: &str = "timeout";
pub const SHUTDOWN_REASON: &str = "service shutdown";

#[derive(Debug, Error)]
#[error("cancelled: {0}")]
pub struct Cancelled(pub String);

#[derive(Clone, Default)]
pub struct CancellationToken {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    cancelled: AtomicBool,
    reason: RwLock<Option<String>>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self, reason: impl Into<String>) {
        *self.inner.reason.write() = Some(reason.into());
        self.inner.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    pub fn reason(&self) -> Option<String> {
        self.inner.reason.read().clone()
    }

    pub fn throw_if_cancelled(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            Err(Cancelled(self.reason().unwrap_or_else(|| "cancelled".to_string())))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
#[path = "cancellation_tests.rs"]
mod tests;
