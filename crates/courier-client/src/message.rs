// Local command message and result types carried through the bus.
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::CommandError;

pub type MetaData = HashMap<String, serde_json::Value>;

/// Command as the application sees it: a named payload plus metadata.
#[derive(Debug, Clone)]
pub struct CommandMessage {
    identifier: String,
    name: String,
    payload: serde_json::Value,
    metadata: MetaData,
}

impl CommandMessage {
    pub fn new(name: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            identifier: Uuid::new_v4().to_string(),
            name: name.into(),
            payload,
            metadata: MetaData::new(),
        }
    }

    /// Rebuild a message received from the wire, keeping its identifier.
    pub fn restore(
        identifier: impl Into<String>,
        name: impl Into<String>,
        payload: serde_json::Value,
        metadata: MetaData,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            name: name.into(),
            payload,
            metadata,
        }
    }

    pub fn and_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn payload(&self) -> &serde_json::Value {
        &self.payload
    }

    pub fn metadata(&self) -> &MetaData {
        &self.metadata
    }
}

/// Outcome of a command: a payload on success, a [`CommandError`] otherwise.
#[derive(Debug)]
pub struct CommandResult {
    message_id: String,
    payload: Option<serde_json::Value>,
    exception: Option<CommandError>,
}

impl CommandResult {
    pub fn success(payload: serde_json::Value) -> Self {
        Self {
            message_id: Uuid::new_v4().to_string(),
            payload: Some(payload),
            exception: None,
        }
    }

    pub fn exceptional(exception: CommandError) -> Self {
        Self {
            message_id: Uuid::new_v4().to_string(),
            payload: None,
            exception: Some(exception),
        }
    }

    pub fn from_parts(
        message_id: impl Into<String>,
        payload: Option<serde_json::Value>,
        exception: Option<CommandError>,
    ) -> Self {
        Self {
            message_id: message_id.into(),
            payload,
            exception,
        }
    }

    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    pub fn is_exceptional(&self) -> bool {
        self.exception.is_some()
    }

    pub fn payload(&self) -> Option<&serde_json::Value> {
        self.payload.as_ref()
    }

    pub fn exception(&self) -> Option<&CommandError> {
        self.exception.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_messages_get_unique_identifiers() {
        let first = CommandMessage::new("createOrder", serde_json::json!({"qty": 1}));
        let second = CommandMessage::new("createOrder", serde_json::json!({"qty": 1}));
        assert_ne!(first.identifier(), second.identifier());
    }

    #[test]
    fn restore_keeps_the_wire_identifier() {
        let message = CommandMessage::restore(
            "c-1",
            "createOrder",
            serde_json::json!(null),
            MetaData::new(),
        );
        assert_eq!(message.identifier(), "c-1");
    }

    #[test]
    fn exceptional_results_carry_the_error() {
        let result = CommandResult::exceptional(CommandError::Execution("boom".to_string()));
        assert!(result.is_exceptional());
        assert!(result.payload().is_none());
        assert!(matches!(
            result.exception(),
            Some(CommandError::Execution(message)) if message == "boom"
        ));
    }
}
