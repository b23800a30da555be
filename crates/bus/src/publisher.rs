// SPDX-License-Identifier: MIT

//! Normalizes durable [`loom_core::Event`]s into wire [`Envelope`]s and
//! fans each out to the channel(s) the C5 taxonomy assigns it to.

use crate::bus::EventBus;
use crate::channel::{self, SYSTEM_JOBS, SYSTEM_PIPELINES};
use crate::envelope::Envelope;
use loom_core::Event;
use std::sync::Arc;

/// Per-publish context the caller supplies alongside the event, since the
/// event log itself doesn't always carry the routing hints (session id on
/// a job is known to the store; a correlation id is known to the request
/// that triggered the mutation).
#[derive(Debug, Clone, Default)]
pub struct PublishContext {
    pub session_id: Option<String>,
    pub correlation_id: Option<String>,
}

/// Routes events to channels and hands them to an [`EventBus`]. Cloning a
/// `Publisher` is cheap; it only holds a shared handle to the bus.
#[derive(Clone)]
pub struct Publisher {
    bus: Arc<dyn EventBus>,
}

impl Publisher {
    pub fn new(bus: Arc<dyn EventBus>) -> Self {
        Self { bus }
    }

    /// Publish `event` to every channel it belongs to. Never returns an
    /// error: a bus with no subscribers, or one whose send fails, is not
    /// a caller-visible failure.
    pub fn publish(&self, event: &Event, ctx: &PublishContext) {
        let payload = match serde_json::to_value(event) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "dropping event that failed to serialize");
                return;
            }
        };
        let envelope = Envelope::new(event.type_name(), payload, ctx.correlation_id.clone());

        for ch in self.target_channels(event, ctx) {
            self.bus.publish(&ch, envelope.clone());
        }
    }

    fn target_channels(&self, event: &Event, ctx: &PublishContext) -> Vec<String> {
        let mut channels = Vec::new();
        if event.job_id().is_some() {
            channels.push(SYSTEM_JOBS.to_string());
            if let Some(session_id) = &ctx.session_id {
                channels.push(channel::session_job_channel(session_id));
            }
        } else {
            channels.push(SYSTEM_PIPELINES.to_string());
        }
        channels
    }
}

#[cfg(test)]
#[path = "publisher_tests.rs"]
mod tests;
