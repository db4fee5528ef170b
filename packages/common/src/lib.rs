pub mod config;
pub mod event;
pub mod mq;

pub use config::{MqAppConfig, TopologyConfig};
pub use event::{EventKind, RequestEvent};
pub use mq::{EncodedMessage, Message, MessageError};
