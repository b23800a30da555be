// SPDX-License-Identifier: MIT

//! Pipeline definitions: DAGs of steps, owned by the Pipeline Engine.

use crate::step::{RetryPolicy, Step};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};

crate::define_id! {
    /// Unique identifier for a pipeline definition.
    pub struct PipelineId("pln-");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    Manual,
    Schedule,
    Webhook,
    BeadEvent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trigger {
    #[serde(rename = "type")]
    pub trigger_type: TriggerType,
    #[serde(default)]
    pub config: serde_json::Value,
    pub enabled: bool,
}

/// Running totals maintained by the engine as runs complete.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineStats {
    pub total_runs: u64,
    pub successful_runs: u64,
    pub failed_runs: u64,
    pub average_duration_ms: f64,
}

impl PipelineStats {
    /// Fold one more completed run's duration into the running average.
    pub fn record_run(&mut self, succeeded: bool, duration_ms: u64) {
        let prior_total = self.total_runs;
        self.total_runs += 1;
        if succeeded {
            self.successful_runs += 1;
        } else {
            self.failed_runs += 1;
        }
        self.average_duration_ms =
            (self.average_duration_ms * prior_total as f64 + duration_ms as f64) / self.total_runs as f64;
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineDefinitionError {
    #[error("duplicate step id '{0}'")]
    DuplicateStepId(String),
    #[error("step '{0}' depends on unknown step '{1}'")]
    UnknownDependency(String, String),
    #[error("dependency cycle detected involving step '{0}'")]
    DependencyCycle(String),
}

/// A pipeline definition. `steps` forms a DAG validated at create/update
/// time; a [`crate::run::PipelineRun`] clones the step list so later
/// updates never mutate an in-flight run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pipeline {
    pub id: PipelineId,
    pub name: String,
    pub version: u32,
    pub enabled: bool,
    pub trigger: Trigger,
    pub steps: Vec<Step>,
    #[serde(default)]
    pub context_defaults: HashMap<String, serde_json::Value>,
    pub retry_policy: RetryPolicy,
    #[serde(default)]
    pub stats: PipelineStats,
    pub created_at_epoch_ms: u64,
    pub updated_at_epoch_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Pipeline {
    /// Validate the step DAG: unique ids, all `dependsOn` targets exist,
    /// and no dependency cycles (Kahn's algorithm).
    pub fn validate_steps(steps: &[Step]) -> Result<(), PipelineDefinitionError> {
        let mut seen = HashSet::new();
        for step in steps {
            if !seen.insert(step.id.as_str()) {
                return Err(PipelineDefinitionError::DuplicateStepId(step.id.clone()));
            }
        }
        for step in steps {
            for dep in &step.depends_on {
                if !seen.contains(dep.as_str()) {
                    return Err(PipelineDefinitionError::UnknownDependency(step.id.clone(), dep.clone()));
                }
            }
        }

        let mut indegree: HashMap<&str, usize> = steps.iter().map(|s| (s.id.as_str(), 0)).collect();
        let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
        for step in steps {
            for dep in &step.depends_on {
                *indegree.get_mut(step.id.as_str()).unwrap() += 1;
                dependents.entry(dep.as_str()).or_default().push(step.id.as_str());
            }
        }

        let mut queue: VecDeque<&str> =
            indegree.iter().filter(|(_, &deg)| deg == 0).map(|(id, _)| *id).collect();
        let mut visited = 0;
        while let Some(id) = queue.pop_front() {
            visited += 1;
            if let Some(next) = dependents.get(id) {
                for &n in next {
                    let deg = indegree.get_mut(n).unwrap();
                    *deg -= 1;
                    if *deg == 0 {
                        queue.push_back(n);
                    }
                }
            }
        }

        if visited != steps.len() {
            let cyclic = indegree.iter().find(|(_, &deg)| deg > 0).map(|(id, _)| id.to_string()).unwrap_or_default();
            return Err(PipelineDefinitionError::DependencyCycle(cyclic));
        }

        Ok(())
    }
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
