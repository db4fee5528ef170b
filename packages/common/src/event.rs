use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::mq::Message;

/// Lifecycle transition that produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Created,
    Updated,
    Deleted,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(Self::Created),
            "updated" => Ok(Self::Updated),
            "deleted" => Ok(Self::Deleted),
            _ => Err(format!(
                "Invalid event kind '{}'. Must be 'created', 'updated' or 'deleted'",
                s
            )),
        }
    }
}

/// Event published for every successful mutation of a request record.
///
/// This is the body the worker and the archiver decode, so field names are
/// part of the wire contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEvent {
    pub event_id: Uuid,
    /// Name of the request record.
    pub name: String,
    pub kind: EventKind,
    /// Payload snapshot after the mutation. `null` for deletions.
    pub payload: serde_json::Value,
    /// Status after the mutation. `None` for deletions.
    pub status: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl RequestEvent {
    pub fn created(name: impl Into<String>, payload: serde_json::Value, status: String) -> Self {
        Self::new(name, EventKind::Created, payload, Some(status))
    }

    pub fn updated(name: impl Into<String>, payload: serde_json::Value, status: String) -> Self {
        Self::new(name, EventKind::Updated, payload, Some(status))
    }

    pub fn deleted(name: impl Into<String>) -> Self {
        Self::new(name, EventKind::Deleted, serde_json::Value::Null, None)
    }

    fn new(
        name: impl Into<String>,
        kind: EventKind,
        payload: serde_json::Value,
        status: Option<String>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            name: name.into(),
            kind,
            payload,
            status,
            timestamp: Utc::now(),
        }
    }
}

impl Message for RequestEvent {
    fn message_type() -> &'static str {
        "request_event"
    }

    fn message_id(&self) -> String {
        self.event_id.to_string()
    }

    fn routing_key(&self) -> String {
        format!("request.{}", self.kind)
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}
