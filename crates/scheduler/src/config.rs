// SPDX-License-Identifier: MIT

//! Scheduler configuration: every option named in the orchestration
//! contract, `Default`-able so a deployment only overrides what it needs.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConcurrencyConfig {
    pub global: usize,
    pub per_type: HashMap<String, usize>,
    pub per_session: usize,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self { global: 10, per_type: HashMap::new(), per_session: usize::MAX }
    }
}

impl ConcurrencyConfig {
    pub fn limit_for_type(&self, job_type: &str) -> usize {
        self.per_type.get(job_type).copied().unwrap_or(self.global)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { max_attempts: 3, initial_backoff_ms: 1_000, max_backoff_ms: 30_000, backoff_multiplier: 2.0 }
    }
}

impl RetryConfig {
    pub fn backoff_ms_for_attempt(&self, attempt: u32) -> u64 {
        let raw = self.initial_backoff_ms as f64 * self.backoff_multiplier.powi(attempt as i32);
        (raw as u64).min(self.max_backoff_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub poll_interval_ms: u64,
    pub shutdown_timeout_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self { poll_interval_ms: 200, shutdown_timeout_ms: 5_000 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub default_ms: u64,
    pub per_type: HashMap<String, u64>,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { default_ms: 5 * 60 * 1_000, per_type: HashMap::new() }
    }
}

impl TimeoutConfig {
    pub fn ms_for_type(&self, job_type: &str) -> u64 {
        self.per_type.get(job_type).copied().unwrap_or(self.default_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanupConfig {
    pub completed_retention_hours: u64,
    pub failed_retention_hours: u64,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self { completed_retention_hours: 24, failed_retention_hours: 24 * 7 }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub concurrency: ConcurrencyConfig,
    pub retry: RetryConfig,
    pub worker: WorkerConfig,
    pub timeouts: TimeoutConfig,
    pub cleanup: CleanupConfig,
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
