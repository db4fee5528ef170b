use std::sync::Arc;

use common::{EncodedMessage, Message};
use tracing::{debug, instrument};

use crate::broker::Broker;
use crate::error::MqError;

/// Publishes messages to the primary fan-out exchange.
///
/// Holds the shared broker handle created at startup. Cloning is cheap and
/// all clones publish through the same channel.
#[derive(Clone)]
pub struct EventPublisher {
    broker: Arc<dyn Broker>,
    exchange: String,
}

impl EventPublisher {
    pub fn new(broker: Arc<dyn Broker>, exchange: impl Into<String>) -> Self {
        Self {
            broker,
            exchange: exchange.into(),
        }
    }

    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    pub fn broker(&self) -> &Arc<dyn Broker> {
        &self.broker
    }

    /// Encode `message` and publish it. Returns once the broker has accepted
    /// the message; consumption happens independently.
    #[instrument(skip(self, message), fields(exchange = %self.exchange, message_type = M::message_type()))]
    pub async fn publish<M: Message>(&self, message: &M) -> Result<(), MqError> {
        let encoded = EncodedMessage::from_message(message)?;

        self.broker
            .publish(&self.exchange, &encoded.routing_key, &encoded)
            .await?;

        debug!(
            message_id = %encoded.message_id,
            routing_key = %encoded.routing_key,
            "Published message"
        );
        Ok(())
    }
}
