use common::MessageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MqError {
    #[error("Connection error: {0}")]
    Connection(String),

    /// The broker refused a declaration or binding.
    #[error("Failed to declare {entity}: {reason}")]
    Declaration { entity: String, reason: String },

    /// Topology setup stopped at `step`. Fatal at startup.
    #[error("Provisioning failed at {step}: {source}")]
    Provisioning {
        step: String,
        #[source]
        source: Box<MqError>,
    },

    #[error("Publish to '{exchange}' failed: {reason}")]
    Publish { exchange: String, reason: String },

    #[error("Broker rejected message published to '{exchange}'")]
    Nacked { exchange: String },

    #[error("Message error: {0}")]
    Message(#[from] MessageError),
}

impl MqError {
    pub fn declaration(entity: impl Into<String>, reason: impl ToString) -> Self {
        MqError::Declaration {
            entity: entity.into(),
            reason: reason.to_string(),
        }
    }

    pub fn publish(exchange: impl Into<String>, reason: impl ToString) -> Self {
        MqError::Publish {
            exchange: exchange.into(),
            reason: reason.to_string(),
        }
    }
}
