use async_trait::async_trait;
use common::EncodedMessage;
use lapin::{
    BasicProperties, Channel, Connection, ConnectionProperties,
    options::{
        BasicPublishOptions, ConfirmSelectOptions, ExchangeDeclareOptions, QueueBindOptions,
        QueueDeclareOptions,
    },
    types::{AMQPValue, FieldTable, LongString, ShortString},
};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::broker::{BindingSpec, Broker, ExchangeKind, ExchangeSpec, QueueSpec};
use crate::error::MqError;

const DEAD_LETTER_EXCHANGE_ARG: &str = "x-dead-letter-exchange";
const MESSAGE_TTL_ARG: &str = "x-message-ttl";
/// AMQP delivery mode for messages that survive a broker restart.
const PERSISTENT: u8 = 2;
const REPLY_SUCCESS: u16 = 200;

pub struct AmqpConfig {
    pub url: String,
    pub connection_name: String,
}

/// RabbitMQ-backed [`Broker`] holding the process-wide connection and channel.
pub struct AmqpBroker {
    connection: Connection,
    channel: Channel,
    publish_lock: Mutex<()>,
}

/// Connect, open the shared channel and enable publisher confirms.
pub async fn init_mq(config: AmqpConfig) -> Result<AmqpBroker, MqError> {
    let properties =
        ConnectionProperties::default().with_connection_name(config.connection_name.into());
    let connection = Connection::connect(&config.url, properties)
        .await
        .map_err(|e| MqError::Connection(format!("failed to connect: {e}")))?;

    let channel = connection
        .create_channel()
        .await
        .map_err(|e| MqError::Connection(format!("failed to open channel: {e}")))?;

    channel
        .confirm_select(ConfirmSelectOptions::default())
        .await
        .map_err(|e| MqError::Connection(format!("failed to enable publisher confirms: {e}")))?;

    info!(channel_id = channel.id(), "AMQP channel opened");

    Ok(AmqpBroker {
        connection,
        channel,
        publish_lock: Mutex::new(()),
    })
}

/// Connect and open a channel, then close both. Used by health checks.
pub async fn ping(url: &str) -> Result<(), MqError> {
    let connection = Connection::connect(url, ConnectionProperties::default())
        .await
        .map_err(|e| MqError::Connection(format!("failed to connect: {e}")))?;

    let result = match connection.create_channel().await {
        Ok(channel) => {
            let _ = channel.close(REPLY_SUCCESS, "OK").await;
            Ok(())
        }
        Err(e) => Err(MqError::Connection(format!("failed to open channel: {e}"))),
    };

    let _ = connection.close(REPLY_SUCCESS, "OK").await;
    result
}

fn lapin_kind(kind: ExchangeKind) -> lapin::ExchangeKind {
    match kind {
        ExchangeKind::Fanout => lapin::ExchangeKind::Fanout,
    }
}

fn queue_arguments(spec: &QueueSpec) -> FieldTable {
    let mut args = FieldTable::default();
    if let Some(exchange) = &spec.dead_letter_exchange {
        args.insert(
            ShortString::from(DEAD_LETTER_EXCHANGE_ARG),
            AMQPValue::LongString(LongString::from(exchange.as_str())),
        );
    }
    if let Some(ttl) = spec.message_ttl {
        let millis = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        args.insert(
            ShortString::from(MESSAGE_TTL_ARG),
            AMQPValue::LongLongInt(millis),
        );
    }
    args
}

fn message_properties(message: &EncodedMessage) -> BasicProperties {
    let timestamp = u64::try_from(message.timestamp.timestamp()).unwrap_or_default();
    BasicProperties::default()
        .with_content_type(ShortString::from(message.content_type))
        .with_delivery_mode(PERSISTENT)
        .with_type(ShortString::from(message.message_type.as_str()))
        .with_message_id(ShortString::from(message.message_id.as_str()))
        .with_timestamp(timestamp)
}

#[async_trait]
impl Broker for AmqpBroker {
    async fn declare_exchange(&self, spec: &ExchangeSpec) -> Result<(), MqError> {
        let options = ExchangeDeclareOptions {
            durable: spec.durable,
            ..Default::default()
        };
        self.channel
            .exchange_declare(
                &spec.name,
                lapin_kind(spec.kind),
                options,
                FieldTable::default(),
            )
            .await
            .map_err(|e| MqError::declaration(format!("exchange '{}'", spec.name), e))
    }

    async fn declare_queue(&self, spec: &QueueSpec) -> Result<(), MqError> {
        let options = QueueDeclareOptions {
            durable: spec.durable,
            exclusive: spec.exclusive,
            auto_delete: spec.auto_delete,
            ..Default::default()
        };
        let queue = self
            .channel
            .queue_declare(&spec.name, options, queue_arguments(spec))
            .await
            .map_err(|e| MqError::declaration(format!("queue '{}'", spec.name), e))?;

        debug!(
            queue = %spec.name,
            messages = queue.message_count(),
            consumers = queue.consumer_count(),
            "Queue declared"
        );
        Ok(())
    }

    async fn bind_queue(&self, binding: &BindingSpec) -> Result<(), MqError> {
        self.channel
            .queue_bind(
                &binding.queue,
                &binding.exchange,
                &binding.routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| {
                MqError::declaration(
                    format!("binding '{}' <- '{}'", binding.queue, binding.exchange),
                    e,
                )
            })
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        message: &EncodedMessage,
    ) -> Result<(), MqError> {
        // Sends go out one at a time so a caller's publishes keep their order
        // on the channel; confirmations are awaited outside the lock.
        let confirm = {
            let _guard = self.publish_lock.lock().await;
            self.channel
                .basic_publish(
                    exchange,
                    routing_key,
                    BasicPublishOptions::default(),
                    &message.body,
                    message_properties(message),
                )
                .await
                .map_err(|e| MqError::publish(exchange, e))?
        };

        let confirmation = confirm.await.map_err(|e| MqError::publish(exchange, e))?;
        if confirmation.is_nack() {
            warn!(exchange, message_id = %message.message_id, "Broker nacked message");
            return Err(MqError::Nacked {
                exchange: exchange.to_string(),
            });
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), MqError> {
        self.channel
            .close(REPLY_SUCCESS, "OK")
            .await
            .map_err(|e| MqError::Connection(format!("failed to close channel: {e}")))?;
        self.connection
            .close(REPLY_SUCCESS, "OK")
            .await
            .map_err(|e| MqError::Connection(format!("failed to close connection: {e}")))?;
        info!("AMQP connection closed");
        Ok(())
    }
}
