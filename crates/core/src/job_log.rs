// SPDX-License-Identifier: MIT

//! Append-only execution log attached to a job.

use crate::job::JobId;
use serde::{Deserialize, Serialize};

crate::define_id! {
    /// Unique identifier for a job log entry.
    pub struct JobLogId("jlg-");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

crate::simple_display! {
    LogLevel {
        Debug => "debug",
        Info => "info",
        Warn => "warn",
        Error => "error",
    }
}

/// A single append-only record in a job's execution log. Logs are never
/// mutated after creation and are ordered by `timestampEpochMs` then `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobLog {
    pub id: JobLogId,
    pub job_id: JobId,
    pub level: LogLevel,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    pub timestamp_epoch_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl JobLog {
    pub fn new(job_id: JobId, level: LogLevel, message: impl Into<String>, timestamp_epoch_ms: u64) -> Self {
        Self {
            id: JobLogId::new(),
            job_id,
            level,
            message: message.into(),
            data: None,
            timestamp_epoch_ms,
            duration_ms: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }
}

#[cfg(test)]
#[path = "job_log_tests.rs"]
mod tests;
