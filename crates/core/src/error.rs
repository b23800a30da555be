// SPDX-License-Identifier: MIT

//! Shared error taxonomy.
//!
//! Every crate boundary (`loom-storage`, `loom-scheduler`, `loom-pipeline`)
//! defines its own `thiserror` enum for its public API, but classifies each
//! variant into one of these kinds so callers can apply the dispatch rules
//! in the orchestration contract uniformly: *not-found* and *state* errors
//! surface immediately, *validation* never retries, *transient* retries up
//! to `maxAttempts`, *timeout* is cancellation with a distinct terminal
//! status, *cancelled* never retries automatically.

/// Coarse classification of an error for retry/propagation decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Validation,
    State,
    Transient,
    Timeout,
    Cancelled,
    FatalShutdown,
}

impl ErrorKind {
    /// Whether an error of this kind is ever eligible for automatic retry.
    pub fn is_retryable_kind(&self) -> bool {
        matches!(self, ErrorKind::Transient | ErrorKind::Timeout)
    }
}

/// Classify an error message the way the job executor does at the
/// handler boundary: default retryable unless the message names validation
/// or cancellation explicitly. Flagged in spec as a smell (string
/// matching instead of typed error codes) but required behavior.
pub fn classify_message(message: &str) -> ErrorKind {
    let lower = message.to_ascii_lowercase();
    if lower.contains("validation") {
        ErrorKind::Validation
    } else if lower.contains("cancelled") || lower.contains("canceled") {
        ErrorKind::Cancelled
    } else {
        ErrorKind::Transient
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
