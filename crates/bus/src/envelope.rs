// SPDX-License-Identifier: MIT

//! The normalized wire shape every event is flattened into before it
//! reaches a channel: `{type, payload, metadata}`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub type_name: String,
    pub payload: serde_json::Value,
    pub metadata: Metadata,
}

impl Envelope {
    pub fn new(type_name: impl Into<String>, payload: serde_json::Value, correlation_id: Option<String>) -> Self {
        Self { type_name: type_name.into(), payload, metadata: Metadata { correlation_id } }
    }
}
