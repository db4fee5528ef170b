use std::time::Duration;

use async_trait::async_trait;
use common::EncodedMessage;

use crate::error::MqError;

/// Exchange routing behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ExchangeKind {
    /// Copies every message to every bound queue, ignoring routing keys.
    Fanout,
}

impl ExchangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fanout => "fanout",
        }
    }
}

impl std::fmt::Display for ExchangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeSpec {
    pub name: String,
    pub kind: ExchangeKind,
    pub durable: bool,
}

impl ExchangeSpec {
    pub fn durable_fanout(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ExchangeKind::Fanout,
            durable: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSpec {
    pub name: String,
    pub durable: bool,
    pub exclusive: bool,
    pub auto_delete: bool,
    /// `x-dead-letter-exchange`: where rejected or expired messages go.
    pub dead_letter_exchange: Option<String>,
    /// `x-message-ttl`: how long a message may wait in the queue.
    pub message_ttl: Option<Duration>,
}

impl QueueSpec {
    /// Durable, shared, never auto-deleted queue without arguments.
    pub fn durable(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            durable: true,
            exclusive: false,
            auto_delete: false,
            dead_letter_exchange: None,
            message_ttl: None,
        }
    }

    pub fn with_dead_letter_exchange(mut self, exchange: impl Into<String>) -> Self {
        self.dead_letter_exchange = Some(exchange.into());
        self
    }

    pub fn with_message_ttl(mut self, ttl: Duration) -> Self {
        self.message_ttl = Some(ttl);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct BindingSpec {
    pub queue: String,
    pub exchange: String,
    pub routing_key: String,
}

/// The operations the service needs from a message broker.
///
/// Every declaration must be idempotent: declaring an entity that already
/// exists with identical settings succeeds without changing anything, and
/// binding an already bound queue adds no second binding.
#[async_trait]
pub trait Broker: Send + Sync {
    async fn declare_exchange(&self, spec: &ExchangeSpec) -> Result<(), MqError>;

    async fn declare_queue(&self, spec: &QueueSpec) -> Result<(), MqError>;

    async fn bind_queue(&self, binding: &BindingSpec) -> Result<(), MqError>;

    /// Publish and wait for the broker to accept the message. Says nothing
    /// about whether a consumer ever processes it.
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        message: &EncodedMessage,
    ) -> Result<(), MqError>;

    async fn close(&self) -> Result<(), MqError>;
}
