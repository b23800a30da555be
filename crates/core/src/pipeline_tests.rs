// SPDX-License-Identifier: MIT

use super::*;
use crate::step::StepKind;

fn script_step(id: &str, depends_on: &[&str]) -> Step {
    Step {
        id: id.to_string(),
        name: id.to_string(),
        kind: StepKind::Script {
            script: "echo hi".to_string(),
            shell: "/bin/bash".to_string(),
            working_directory: None,
            env: HashMap::new(),
            timeout_ms: 5_000,
            path_mode: false,
        },
        depends_on: depends_on.iter().map(|s| s.to_string()).collect(),
        condition: None,
        retry_policy: None,
        continue_on_failure: false,
        timeout_ms: None,
    }
}

#[test]
fn validate_steps_accepts_linear_chain() {
    let steps = vec![script_step("a", &[]), script_step("b", &["a"]), script_step("c", &["b"])];
    assert!(Pipeline::validate_steps(&steps).is_ok());
}

#[test]
fn validate_steps_rejects_duplicate_ids() {
    let steps = vec![script_step("a", &[]), script_step("a", &[])];
    assert!(matches!(
        Pipeline::validate_steps(&steps),
        Err(PipelineDefinitionError::DuplicateStepId(id)) if id == "a"
    ));
}

#[test]
fn validate_steps_rejects_unknown_dependency() {
    let steps = vec![script_step("a", &["ghost"])];
    assert!(matches!(
        Pipeline::validate_steps(&steps),
        Err(PipelineDefinitionError::UnknownDependency(step, dep)) if step == "a" && dep == "ghost"
    ));
}

#[test]
fn validate_steps_rejects_cycle() {
    let steps = vec![script_step("a", &["b"]), script_step("b", &["a"])];
    assert!(matches!(Pipeline::validate_steps(&steps), Err(PipelineDefinitionError::DependencyCycle(_))));
}

#[test]
fn stats_record_run_updates_running_average() {
    let mut stats = PipelineStats::default();
    stats.record_run(true, 100);
    assert_eq!(stats.total_runs, 1);
    assert_eq!(stats.successful_runs, 1);
    assert_eq!(stats.average_duration_ms, 100.0);

    stats.record_run(false, 300);
    assert_eq!(stats.total_runs, 2);
    assert_eq!(stats.failed_runs, 1);
    assert_eq!(stats.average_duration_ms, 200.0);
}
