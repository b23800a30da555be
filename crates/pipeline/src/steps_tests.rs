// SPDX-License-Identifier: MIT

use super::*;
use loom_core::TransformOp;
use serde_json::json;
use tokio_util::sync::CancellationToken;

fn ctx() -> HashMap<String, Value> {
    let mut m = HashMap::new();
    m.insert("numbers".to_string(), json!([1, 2, 3, 4]));
    m.insert("name".to_string(), json!("ada"));
    m
}

#[tokio::test]
async fn script_captures_stdout_on_success() {
    let context = ctx();
    let out = run_script("echo -n hello", "/bin/sh", None, &HashMap::new(), 5_000, false, &context).await.unwrap();
    assert_eq!(out, json!("hello"));
}

#[tokio::test]
async fn script_errors_on_nonzero_exit() {
    let context = ctx();
    let err = run_script("exit 3", "/bin/sh", None, &HashMap::new(), 5_000, false, &context).await;
    assert!(err.is_err());
}

#[tokio::test]
async fn script_times_out() {
    let context = ctx();
    let err = run_script("sleep 5", "/bin/sh", None, &HashMap::new(), 20, false, &context).await;
    assert!(err.is_err());
}

#[test]
fn transform_set_and_delete() {
    let mut context = ctx();
    run_transform(&[TransformOp::Set { path: "greeting".to_string(), value: json!("hi ${context.name}") }], &mut context).unwrap();
    assert_eq!(context.get("greeting"), Some(&json!("hi ada")));
    run_transform(&[TransformOp::Delete { path: "greeting".to_string() }], &mut context).unwrap();
    assert!(!context.contains_key("greeting"));
}

#[test]
fn transform_map_doubles_items() {
    let mut context = ctx();
    run_transform(
        &[TransformOp::Map { source: "numbers".to_string(), expression: "$item * 2".to_string(), target: "doubled".to_string() }],
        &mut context,
    )
    .unwrap();
    assert_eq!(context.get("doubled"), Some(&json!([2.0, 4.0, 6.0, 8.0])));
}

#[test]
fn transform_filter_keeps_matching_items() {
    let mut context = ctx();
    run_transform(
        &[TransformOp::Filter { source: "numbers".to_string(), condition: "$item > 2".to_string(), target: "big".to_string() }],
        &mut context,
    )
    .unwrap();
    assert_eq!(context.get("big"), Some(&json!([3, 4])));
}

#[test]
fn transform_reduce_sums_items() {
    let mut context = ctx();
    run_transform(
        &[TransformOp::Reduce {
            source: "numbers".to_string(),
            expression: "$acc + $item".to_string(),
            initial: json!(0),
            target: "total".to_string(),
        }],
        &mut context,
    )
    .unwrap();
    assert_eq!(context.get("total"), Some(&json!(10.0)));
}

#[test]
fn transform_merge_combines_objects() {
    let mut context = ctx();
    context.insert("base".to_string(), json!({"a": 1}));
    context.insert("patch".to_string(), json!({"b": 2}));
    run_transform(&[TransformOp::Merge { source: "patch".to_string(), target: "base".to_string() }], &mut context).unwrap();
    assert_eq!(context.get("base"), Some(&json!({"a": 1, "b": 2})));
}

#[test]
fn transform_extract_navigates_dotted_path() {
    let mut context = ctx();
    context.insert("payload".to_string(), json!({"user": {"name": "grace"}}));
    run_transform(
        &[TransformOp::Extract { source: "payload".to_string(), query: "user.name".to_string(), target: "extracted".to_string() }],
        &mut context,
    )
    .unwrap();
    assert_eq!(context.get("extracted"), Some(&json!("grace")));
}

#[tokio::test]
async fn wait_resolves_after_duration() {
    let cancel = CancellationToken::new();
    let result = run_wait(Some(5), None, 1_000, &ctx(), 1_000_000, &cancel).await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn wait_is_interrupted_by_cancellation() {
    let cancel = CancellationToken::new();
    cancel.cancel();
    let result = run_wait(Some(60_000), None, 60_000, &ctx(), 1_000_000, &cancel).await;
    assert!(result.is_err());
}
