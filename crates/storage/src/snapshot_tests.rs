// SPDX-License-Identifier: MIT

use super::*;
use loom_core::{Job, JobId, JobSpec};
use tempfile::tempdir;

fn sample_snapshot(seq: u64) -> Snapshot {
    let mut state = MaterializedState::default();
    let job = Job::new_with_epoch_ms(JobId::new(), JobSpec::builder("t", serde_json::Value::Null).build(), 0);
    state.jobs.insert(job.id, job);
    Snapshot { version: CURRENT_SNAPSHOT_VERSION, seq, state, created_at: Utc::now() }
}

#[test]
fn load_missing_file_returns_none() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("snap.zst");
    assert!(load(&path).unwrap().is_none());
}

#[test]
fn save_then_load_roundtrips() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("snap.zst");
    let snapshot = sample_snapshot(42);

    save(&path, &snapshot).unwrap();
    let loaded = load(&path).unwrap().unwrap();

    assert_eq!(loaded.seq, 42);
    assert_eq!(loaded.state.jobs.len(), 1);
}

#[test]
fn save_rotates_previous_snapshot_into_bak() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("snap.zst");

    save(&path, &sample_snapshot(1)).unwrap();
    save(&path, &sample_snapshot(2)).unwrap();

    let bak = path.with_extension("bak");
    assert!(bak.exists());
    let bak_snapshot = load(&bak).unwrap().unwrap();
    assert_eq!(bak_snapshot.seq, 1);

    let current = load(&path).unwrap().unwrap();
    assert_eq!(current.seq, 2);
}

#[test]
fn rejects_unsupported_version() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("snap.zst");
    let mut snapshot = sample_snapshot(1);
    snapshot.version = 99;
    save(&path, &snapshot).unwrap();

    assert!(matches!(load(&path), Err(SnapshotError::UnsupportedVersion(99))));
}
