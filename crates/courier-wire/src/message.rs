//! Typed protocol messages exchanged with the command router.
//!
//! # Purpose
//! Defines both directions of the subscriber stream (client-push and
//! server-push) plus the unary dispatch request/response pair, and maps each
//! message to and from a [`Frame`](crate::Frame) with the matching direction
//! flag.
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::{Direction, Error, Frame, Result};

/// Keys understood in a command's processing instruction list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstructionKey {
    RoutingKey,
    Priority,
    Timeout,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingInstruction {
    pub key: InstructionKey,
    pub value: serde_json::Value,
}

impl ProcessingInstruction {
    pub fn routing_key(key: impl Into<String>) -> Self {
        Self {
            key: InstructionKey::RoutingKey,
            value: serde_json::Value::String(key.into()),
        }
    }

    pub fn priority(priority: i64) -> Self {
        Self {
            key: InstructionKey::Priority,
            value: serde_json::Value::from(priority),
        }
    }
}

/// Opaque payload with enough typing information to deserialize it again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedPayload {
    pub type_name: String,
    #[serde(default)]
    pub revision: String,
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

/// Error detail carried inside an exceptional command response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub message: String,
    /// Identifier of the client that produced the error.
    pub location: String,
    #[serde(default)]
    pub details: Vec<String>,
}

/// Command as it travels to and from the router.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireCommand {
    pub message_id: String,
    pub name: String,
    pub payload: SerializedPayload,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub processing_instructions: Vec<ProcessingInstruction>,
}

impl WireCommand {
    pub fn routing_key(&self) -> Option<&str> {
        self.processing_instructions
            .iter()
            .find(|instruction| instruction.key == InstructionKey::RoutingKey)
            .and_then(|instruction| instruction.value.as_str())
    }

    /// Priority instruction value; commands without one sort at 0.
    pub fn priority(&self) -> i64 {
        self.processing_instructions
            .iter()
            .find(|instruction| instruction.key == InstructionKey::Priority)
            .and_then(|instruction| instruction.value.as_i64())
            .unwrap_or(0)
    }
}

/// Reply to a single dispatched command, carrying either a payload or an
/// error envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireCommandResponse {
    pub message_id: String,
    pub request_id: String,
    #[serde(default)]
    pub payload: Option<SerializedPayload>,
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub error_message: Option<ErrorEnvelope>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSubscription {
    pub command_name: String,
    pub client_id: String,
    #[serde(default)]
    pub component_name: String,
    pub message_id: String,
}

/// Client-push side of the subscriber stream. Exactly one of these per frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Subscribe(CommandSubscription),
    Unsubscribe(CommandSubscription),
    CommandResponse(WireCommandResponse),
    FlowControl { permits: u64 },
}

impl ClientMessage {
    pub fn encode(&self) -> Result<Frame> {
        let body = serde_json::to_vec(self)?;
        Frame::new(Direction::ToRouter, body.into())
    }

    pub fn decode(frame: &Frame) -> Result<Self> {
        if frame.direction() != Direction::ToRouter {
            return Err(Error::DirectionMismatch);
        }
        Ok(serde_json::from_slice(frame.payload())?)
    }
}

/// Server-push side of the subscriber stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Command(WireCommand),
    Confirmation { message_id: String, success: bool },
}

impl ServerMessage {
    pub fn encode(&self) -> Result<Frame> {
        let body = serde_json::to_vec(self)?;
        Frame::new(Direction::FromRouter, body.into())
    }

    pub fn decode(frame: &Frame) -> Result<Self> {
        if frame.direction() != Direction::FromRouter {
            return Err(Error::DirectionMismatch);
        }
        Ok(serde_json::from_slice(frame.payload())?)
    }
}

mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(&encoded).map_err(serde::de::Error::custom)
    }
}
