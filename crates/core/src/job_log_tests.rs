// SPDX-License-Identifier: MIT

use super::*;
use crate::job::JobId;

#[test]
fn new_log_has_no_data_or_duration() {
    let log = JobLog::new(JobId::new(), LogLevel::Info, "started", 1_000);
    assert!(log.data.is_none());
    assert!(log.duration_ms.is_none());
    assert_eq!(log.message, "started");
}

#[test]
fn builder_methods_attach_data_and_duration() {
    let log = JobLog::new(JobId::new(), LogLevel::Error, "failed", 1_000)
        .with_data(serde_json::json!({"code": "E_TIMEOUT"}))
        .with_duration_ms(250);
    assert_eq!(log.data, Some(serde_json::json!({"code": "E_TIMEOUT"})));
    assert_eq!(log.duration_ms, Some(250));
}

#[test]
fn log_level_display_is_lowercase() {
    assert_eq!(LogLevel::Warn.to_string(), "warn");
}
