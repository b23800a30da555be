// SPDX-License-Identifier: MIT

//! Event normalization and channel-based publish/subscribe (C5). Durable
//! facts produced by `loom-storage` are flattened into wire envelopes and
//! fanned out on a best-effort basis; nothing here is durable, and a
//! subscriber that misses an event must fall back to polling the store.

mod bus;
mod channel;
mod envelope;
mod publisher;

pub use bus::{EventBus, InMemoryBus};
pub use channel::{session_job_channel, workspace_graph_channel, SYSTEM_JOBS, SYSTEM_PIPELINES};
pub use envelope::{Envelope, Metadata};
pub use publisher::{PublishContext, Publisher};
