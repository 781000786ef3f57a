// Payload serialization seam between the local model and the wire.
use courier_wire::SerializedPayload;

#[derive(thiserror::Error, Debug)]
pub enum SerializeError {
    #[error("encode payload: {0}")]
    Encode(String),
    #[error("decode payload [{type_name}]: {reason}")]
    Decode { type_name: String, reason: String },
}

/// Converts local payload values to and from their wire representation.
pub trait PayloadSerializer: Send + Sync {
    fn serialize(&self, payload: &serde_json::Value) -> Result<SerializedPayload, SerializeError>;
    fn deserialize(&self, payload: &SerializedPayload) -> Result<serde_json::Value, SerializeError>;
}

/// Default serializer: payloads travel as UTF-8 JSON bytes tagged `json`.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonSerializer;

impl JsonSerializer {
    pub const TYPE_NAME: &'static str = "json";
}

impl PayloadSerializer for JsonSerializer {
    fn serialize(&self, payload: &serde_json::Value) -> Result<SerializedPayload, SerializeError> {
        let data = serde_json::to_vec(payload).map_err(|err| SerializeError::Encode(err.to_string()))?;
        Ok(SerializedPayload {
            type_name: Self::TYPE_NAME.to_string(),
            revision: String::new(),
            data,
        })
    }

    fn deserialize(&self, payload: &SerializedPayload) -> Result<serde_json::Value, SerializeError> {
        if payload.type_name != Self::TYPE_NAME {
            return Err(SerializeError::Decode {
                type_name: payload.type_name.clone(),
                reason: "unknown payload type".to_string(),
            });
        }
        serde_json::from_slice(&payload.data).map_err(|err| SerializeError::Decode {
            type_name: payload.type_name.clone(),
            reason: err.to_string(),
        })
    }
}
