// SPDX-License-Identifier: MIT

//! Channel name taxonomy. These strings form the wire contract — changing
//! them is a breaking change for any subscriber.

pub const SYSTEM_JOBS: &str = "system:jobs";
pub const SYSTEM_PIPELINES: &str = "system:pipelines";

pub fn session_job_channel(session_id: &str) -> String {
    format!("session:job:{session_id}")
}

pub fn workspace_graph_channel(workspace_id: &str) -> String {
    format!("workspace:graph:{workspace_id}")
}
