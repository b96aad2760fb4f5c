use serde::{Deserialize, Serialize};

use crate::node::NodeDto;

/// Notifications delivered to registered listeners.
///
/// Serializes as `{"type": "node.update", "payload": {...}}`, the envelope
/// the websocket hub forwards to browsers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum EngineEvent {
    #[serde(rename = "node.update")]
    NodeUpdate(NodeDto),
    #[serde(rename = "node.offline")]
    NodeOffline { node_id: String },
    #[serde(rename = "apply.ack")]
    ApplyAck { node_id: String, success: bool },
    #[serde(rename = "error")]
    Error { message: String },
}

impl EngineEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            EngineEvent::NodeUpdate(_) => "node.update",
            EngineEvent::NodeOffline { .. } => "node.offline",
            EngineEvent::ApplyAck { .. } => "apply.ack",
            EngineEvent::Error { .. } => "error",
        }
    }
}
