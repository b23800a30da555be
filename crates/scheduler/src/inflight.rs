// SPDX-License-Identifier: MIT

//! The in-flight admission set (§5): mutated only by the scheduler loop on
//! admit and by the executor task on completion. Admission checks read a
//! snapshot of counts rather than touching the store, per the "no hidden
//! globals, explicit counts" design note.

use crate::cancellation::CancellationToken;
use loom_core::JobId;
use std::collections::HashMap;

struct Entry {
    job_type: String,
    session_id: Option<String>,
    cancel: CancellationToken,
}

#[derive(Default)]
pub struct InFlightSet {
    entries: HashMap<JobId, Entry>,
}

impl InFlightSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn count_for_type(&self, job_type: &str) -> usize {
        self.entries.values().filter(|e| e.job_type == job_type).count()
    }

    pub fn count_for_session(&self, session_id: &str) -> usize {
        self.entries.values().filter(|e| e.session_id.as_deref() == Some(session_id)).count()
    }

    /// Whether admitting one more job of `job_type`/`session_id` would stay
    /// within every concurrency ceiling.
    pub fn can_admit(
        &self,
        job_type: &str,
        session_id: Option<&str>,
        config: &crate::config::ConcurrencyConfig,
    ) -> bool {
        if self.len() >= config.global {
            return false;
        }
        if self.count_for_type(job_type) >= config.limit_for_type(job_type) {
            return false;
        }
        if let Some(session_id) = session_id {
            if self.count_for_session(session_id) >= config.per_session {
                return false;
            }
        }
        true
    }

    pub fn insert(&mut self, job_id: JobId, job_type: String, session_id: Option<String>, cancel: CancellationToken) {
        self.entries.insert(job_id, Entry { job_type, session_id, cancel });
    }

    pub fn remove(&mut self, job_id: JobId) {
        self.entries.remove(&job_id);
    }

    pub fn cancel_token(&self, job_id: JobId) -> Option<CancellationToken> {
        self.entries.get(&job_id).map(|e| e.cancel.clone())
    }

    pub fn cancel_all(&self, reason: &str) {
        for entry in self.entries.values() {
            entry.cancel.cancel(reason.to_string());
        }
    }

    pub fn job_ids(&self) -> Vec<JobId> {
        self.entries.keys().copied().collect()
    }
}

#[cfg(test)]
#[path = "inflight_tests.rs"]
mod tests;
