// SPDX-License-Identifier: MIT

//! The publisher contract: `publish(channel, envelope)`, non-blocking,
//! best-effort. A failed publish is swallowed — the store, not the bus,
//! is the source of truth.

use crate::envelope::Envelope;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 1024;

pub trait EventBus: Send + Sync {
    /// Publish `envelope` to `channel`. Implementations MUST NOT block and
    /// MUST NOT propagate delivery failures to the caller.
    fn publish(&self, channel: &str, envelope: Envelope);
}

/// In-process pub/sub over `tokio::sync::broadcast`, one channel per topic
/// name, created lazily on first publish or subscribe.
#[derive(Default)]
pub struct InMemoryBus {
    channels: Mutex<HashMap<String, broadcast::Sender<Envelope>>>,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn sender_for(&self, channel: &str) -> broadcast::Sender<Envelope> {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        channels.entry(channel.to_string()).or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0).clone()
    }

    /// Subscribe to `channel`, creating it if it does not exist yet.
    /// Events published before this call are not replayed.
    pub fn subscribe(&self, channel: &str) -> broadcast::Receiver<Envelope> {
        self.sender_for(channel).subscribe()
    }
}

impl EventBus for InMemoryBus {
    fn publish(&self, channel: &str, envelope: Envelope) {
        // No receivers is not an error: delivery is best-effort.
        let _ = self.sender_for(channel).send(envelope);
    }
}

#[cfg(test)]
#[path = "bus_tests.rs"]
mod tests;
