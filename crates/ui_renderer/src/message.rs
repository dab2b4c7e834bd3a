use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Named event with an opaque JSON payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventData {
    pub name: String,
    #[serde(default)]
    pub data: Value,
}

impl EventData {
    #[must_use]
    pub fn new(name: impl Into<String>, data: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }
}

/// Inbound, UI-originated message: a routing key and its raw payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpcMessage {
    pub key: String,
    #[serde(default)]
    pub payload: String,
}

impl IpcMessage {
    #[must_use]
    pub fn new(key: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            payload: payload.into(),
        }
    }
}

/// Handler for one IPC message key. Receives the raw payload.
pub type CallbackFunc = Arc<dyn Fn(&str) -> Result<(), String> + Send + Sync>;

/// Backend listener for a named event.
pub type EventHandler = Arc<dyn Fn(&EventData) + Send + Sync>;
