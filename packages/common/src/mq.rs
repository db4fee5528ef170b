use chrono::{DateTime, Utc};
use serde::{Serialize, de::DeserializeOwned};
use std::fmt::Debug;
use thiserror::Error;
use tracing::{debug, error};

/// MIME type of every message body produced by [`EncodedMessage::from_message`].
pub const CONTENT_TYPE_JSON: &str = "application/json";

/// Core trait for all MQ messages
pub trait Message: Serialize + DeserializeOwned + Debug + Send + Sync + Clone {
    fn message_type() -> &'static str
    where
        Self: Sized;

    fn message_id(&self) -> String;

    /// Routing key attached on publish. Fan-out exchanges ignore it, but
    /// consumers may log it.
    fn routing_key(&self) -> String
    where
        Self: Sized,
    {
        Self::message_type().to_string()
    }

    fn timestamp(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A message ready for the wire: JSON body plus the properties the broker
/// carries alongside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedMessage {
    pub message_type: String,
    pub message_id: String,
    pub routing_key: String,
    pub content_type: &'static str,
    pub timestamp: DateTime<Utc>,
    pub body: Vec<u8>,
}

impl EncodedMessage {
    /// Encode a typed message.
    pub fn from_message<M: Message>(message: &M) -> Result<Self, MessageError> {
        let message_type = M::message_type().to_string();
        let message_id = message.message_id();
        let routing_key = message.routing_key();

        debug!(
            message_type = %message_type,
            message_id = %message_id,
            routing_key = %routing_key,
            "Encoding message"
        );

        Ok(Self {
            message_type,
            message_id,
            routing_key,
            content_type: CONTENT_TYPE_JSON,
            timestamp: message.timestamp(),
            body: serde_json::to_vec(message)?,
        })
    }

    /// Decode back into a typed message.
    pub fn decode<M: Message>(&self) -> Result<M, MessageError> {
        decode(&self.message_type, &self.body)
    }
}

/// Decode a received body, checking the `type` property first.
pub fn decode<M: Message>(message_type: &str, body: &[u8]) -> Result<M, MessageError> {
    if message_type != M::message_type() {
        error!(
            expected = M::message_type(),
            actual = %message_type,
            "Message type mismatch"
        );
        return Err(MessageError::TypeMismatch {
            expected: M::message_type().to_string(),
            actual: message_type.to_string(),
        });
    }

    serde_json::from_slice(body).map_err(|e| {
        error!(error = %e, message_type, "Deserialization failed");
        MessageError::Serialization(e)
    })
}

#[derive(Debug, Error)]
pub enum MessageError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Message type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },
}
