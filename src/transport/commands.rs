use crate::error::TransportError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Destination that addresses every target on the link
pub const BROADCAST_DEST: &str = "all";

const FORWARD_ACTION: &str = "netlink_forward";

/// A command forwarded to one target or to all of them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportCommand {
    pub action: String,
    pub dest: String,
    pub content: Value,
}

impl TransportCommand {
    fn forward(dest: impl Into<String>, content: Value) -> Self {
        Self {
            action: FORWARD_ACTION.to_string(),
            dest: dest.into(),
            content,
        }
    }

    /// Readiness query for a single target
    pub fn ready(
        dest: &str,
        repeat: u32,
        is_first: bool,
        is_last: bool,
        mode: &str,
        target_type: Option<&str>,
    ) -> Self {
        let mut content = json!({
            "command": "ready",
            "delay": 0.0,
            "repeat": repeat,
            "isFirst": is_first,
            "isLast": is_last,
            "mode": mode,
        });
        if let Some(target_type) = target_type {
            content["targetType"] = Value::String(target_type.to_string());
        }
        Self::forward(dest, content)
    }

    /// Start signal, sent to every target when the beep fires
    pub fn start(repeat: u32) -> Self {
        Self::forward(
            BROADCAST_DEST,
            json!({ "command": "start", "repeat": repeat }),
        )
    }

    /// End signal, sent to every target when a repeat is stopped
    pub fn end() -> Self {
        Self::forward(BROADCAST_DEST, json!({ "command": "end" }))
    }

    /// The `command` field of the content, if any
    pub fn command_name(&self) -> Option<&str> {
        self.content.get("command").and_then(Value::as_str)
    }

    /// Encode as the JSON text written to the link
    pub fn to_json(&self) -> Result<String, TransportError> {
        serde_json::to_string(self).map_err(|e| TransportError::Encode {
            details: e.to_string(),
        })
    }
}
