// SPDX-License-Identifier: MIT

use super::*;

#[test]
fn fresh_token_is_not_cancelled() {
    let token = CancellationToken::new();
    assert!(!token.is_cancelled());
    assert!(token.throw_if_cancelled().is_ok());
}

#[test]
fn cancel_records_reason_and_trips_throw_if_cancelled() {
    let token = CancellationToken::new();
    token.cancel("user request");
    assert!(token.is_cancelled());
    assert_eq!(token.reason().as_deref(), Some("user request"));
    assert_eq!(token.throw_if_cancelled().unwrap_err().0, "user request");
}

#[test]
fn clones_share_cancellation_state() {
    let token = CancellationToken::new();
    let clone = token.clone();
    clone.cancel(TIMEOUT_REASON);
    assert!(token.is_cancelled());
    assert_eq!(token.reason().as_deref(), Some(TIMEOUT_REASON));
}
