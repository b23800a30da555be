// SPDX-License-Identifier: MIT

//! Pipeline engine configuration: the handful of defaults not already
//! carried per-step on [`loom_core::Step`] itself.

/// Hard ceiling on loop iterations regardless of a step's own
/// `maxIterations`, a circuit breaker generalized from per-step visit
/// limits to a much larger bound appropriate for a loop body rather
/// than a retry.
pub const HARD_LOOP_ITERATION_CAP: u64 = 100_000;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Poll interval while waiting on a sub-pipeline child run or a
    /// pending approval's timeout clock.
    pub poll_interval_ms: u64,
    /// Timeout applied to the HTTP client backing the webhook step.
    pub http_timeout_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { poll_interval_ms: 50, http_timeout_ms: 30_000 }
    }
}
