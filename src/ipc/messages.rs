//! Wire shapes for the UI-facing message channel.
//!
//! Inbound: one `CommandEnvelope` per message. Outbound: one
//! `ChannelMessage` per worker event or list reply. Field names are
//! camelCase to match the JS side of the channel.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::service::UnitEvent;

/// Command sent by the UI over a service channel.
///
/// `command` is an open string so an unrecognized value can be echoed back
/// in the resulting error event instead of failing deserialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandEnvelope {
    pub unit_id: String,
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// Payload of an outbound `error` message. `ipcevent` carries the inbound
/// envelope that triggered the error, when there was one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipcevent: Option<CommandEnvelope>,
}

/// Message sent to the UI over a service channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ChannelMessage {
    /// One newline-terminated record from a worker's stdout.
    Data { unit_id: String, payload: String },
    /// Worker diagnostic or command failure, scoped to a unit.
    Error { unit_id: String, payload: ErrorPayload },
    /// Worker exited; `payload` is the exit code (`null` when killed or
    /// never spawned). Terminal for the unit.
    Close { unit_id: String, payload: Option<i32> },
    /// Reply to a `list` command.
    List { unit_ids: Vec<String> },
}

impl ChannelMessage {
    pub fn from_event(unit_id: &str, event: UnitEvent) -> Self {
        match event {
            UnitEvent::Data(payload) => ChannelMessage::Data {
                unit_id: unit_id.to_string(),
                payload,
            },
            UnitEvent::Error(message) => ChannelMessage::Error {
                unit_id: unit_id.to_string(),
                payload: ErrorPayload {
                    error: message,
                    ipcevent: None,
                },
            },
            UnitEvent::Close(code) => ChannelMessage::Close {
                unit_id: unit_id.to_string(),
                payload: code,
            },
        }
    }
}
