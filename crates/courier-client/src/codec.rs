// Encoding between local command types and wire messages.
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use courier_wire::{
    ErrorEnvelope, ProcessingInstruction, WireCommand, WireCommandResponse,
};

use crate::error::{CommandError, ErrorCode};
use crate::message::{CommandMessage, CommandResult};
use crate::serializer::PayloadSerializer;

/// Stateless translation layer; one instance is shared by the dispatcher and
/// the inbound workers.
#[derive(Clone)]
pub(crate) struct CommandCodec {
    serializer: Arc<dyn PayloadSerializer>,
    client_id: String,
}

impl CommandCodec {
    pub(crate) fn new(serializer: Arc<dyn PayloadSerializer>, client_id: String) -> Self {
        Self {
            serializer,
            client_id,
        }
    }

    pub(crate) fn encode_command(
        &self,
        message: &CommandMessage,
        routing_key: &str,
        priority: i64,
    ) -> Result<WireCommand, CommandError> {
        let payload = self
            .serializer
            .serialize(message.payload())
            .map_err(|err| CommandError::Serialization(err.to_string()))?;
        Ok(WireCommand {
            message_id: message.identifier().to_string(),
            name: message.name().to_string(),
            payload,
            metadata: message.metadata().clone(),
            processing_instructions: vec![
                ProcessingInstruction::routing_key(routing_key),
                ProcessingInstruction::priority(priority),
            ],
        })
    }

    pub(crate) fn decode_command(
        &self,
        command: &WireCommand,
    ) -> Result<CommandMessage, CommandError> {
        let payload = self
            .serializer
            .deserialize(&command.payload)
            .map_err(|err| CommandError::Serialization(err.to_string()))?;
        Ok(CommandMessage::restore(
            command.message_id.clone(),
            command.name.clone(),
            payload,
            command.metadata.clone(),
        ))
    }

    pub(crate) fn encode_result(
        &self,
        result: &CommandResult,
        request_id: &str,
    ) -> Result<WireCommandResponse, CommandError> {
        let payload = match result.payload() {
            Some(value) => Some(
                self.serializer
                    .serialize(value)
                    .map_err(|err| CommandError::Serialization(err.to_string()))?,
            ),
            None => None,
        };
        Ok(WireCommandResponse {
            message_id: Uuid::new_v4().to_string(),
            request_id: request_id.to_string(),
            payload,
            error_code: None,
            error_message: None,
        })
    }

    pub(crate) fn error_response(
        &self,
        request_id: &str,
        code: ErrorCode,
        error: &CommandError,
    ) -> WireCommandResponse {
        WireCommandResponse {
            message_id: Uuid::new_v4().to_string(),
            request_id: request_id.to_string(),
            payload: None,
            error_code: Some(code.as_str().to_string()),
            error_message: Some(ErrorEnvelope {
                message: error.to_string(),
                location: self.client_id.clone(),
                details: Vec::new(),
            }),
        }
    }

    /// Total by design: a malformed reply becomes an exceptional result
    /// rather than an error propagated to the transport callback.
    pub(crate) fn decode_result(&self, response: &WireCommandResponse) -> CommandResult {
        if let Some(code) = &response.error_code {
            let (message, location) = match &response.error_message {
                Some(envelope) => (envelope.message.clone(), envelope.location.clone()),
                None => (String::new(), String::new()),
            };
            return CommandResult::from_parts(
                response.message_id.clone(),
                None,
                Some(CommandError::Remote {
                    code: code.clone(),
                    message,
                    location,
                }),
            );
        }
        match &response.payload {
            Some(payload) => match self.serializer.deserialize(payload) {
                Ok(value) => {
                    CommandResult::from_parts(response.message_id.clone(), Some(value), None)
                }
                Err(err) => {
                    info!(
                        request_id = %response.request_id,
                        error = %err,
                        "failed to deserialize command response payload"
                    );
                    CommandResult::from_parts(
                        response.message_id.clone(),
                        None,
                        Some(CommandError::Serialization(err.to_string())),
                    )
                }
            },
            None => CommandResult::from_parts(response.message_id.clone(), None, None),
        }
    }
}
