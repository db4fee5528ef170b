pub mod amqp;
pub mod broker;
pub mod error;
#[cfg(any(test, feature = "memory"))]
pub mod memory;
pub mod publisher;
pub mod topology;

pub use amqp::{AmqpBroker, AmqpConfig, init_mq};
pub use broker::{BindingSpec, Broker, ExchangeKind, ExchangeSpec, QueueSpec};
pub use error::MqError;
pub use publisher::EventPublisher;
pub use topology::{Declaration, Topology};
