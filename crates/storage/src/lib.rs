// SPDX-License-Identifier: MIT

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! loom-storage: the Job Store (C1) and the pipeline/run persistence layer
//! (C4). A write-ahead log of [`loom_core::Event`]s is the durable source of
//! truth; [`state::MaterializedState`] is the in-memory projection rebuilt
//! from it, periodically checkpointed to a compressed [`snapshot::Snapshot`]
//! so recovery never replays from genesis.

pub mod pagination;
pub mod snapshot;
pub mod state;
pub mod store;
pub mod wal;

pub use pagination::{CursorError, SortOrder};
pub use snapshot::{Snapshot, SnapshotError, CURRENT_SNAPSHOT_VERSION};
pub use state::MaterializedState;
pub use store::{JobFilter, JobPage, PipelineFilter, PipelinePage, RetentionConfig, Store, StoreError};
pub use wal::{Entry as WalEntry, Wal, WalError};
