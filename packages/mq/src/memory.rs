//! In-process broker with the RabbitMQ semantics the topology relies on.
//!
//! Declarations follow AMQP equivalence rules, exchanges fan out to every
//! bound queue, rejected and expired messages are dead-lettered, and message TTL runs on
//! `tokio::time` so tests can pause and advance the clock.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use async_trait::async_trait;
use common::EncodedMessage;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::broker::{BindingSpec, Broker, ExchangeSpec, QueueSpec};
use crate::error::MqError;

/// Why a message left a queue through its dead-letter exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeathReason {
    Rejected,
    Expired,
}

/// Equivalent of one `x-death` header entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeathRecord {
    pub queue: String,
    pub reason: DeathReason,
}

/// A message taken from a queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Queue the message was taken from.
    pub queue: String,
    /// Exchange the message was last routed through.
    pub exchange: String,
    pub routing_key: String,
    pub message: EncodedMessage,
    /// Dead-letter history, oldest first.
    pub deaths: Vec<DeathRecord>,
}

impl Delivery {
    pub fn redelivered(&self) -> bool {
        !self.deaths.is_empty()
    }
}

/// Declared entities, sorted by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopologySnapshot {
    pub exchanges: Vec<ExchangeSpec>,
    pub queues: Vec<QueueSpec>,
    pub bindings: Vec<BindingSpec>,
}

struct Stored {
    delivery: Delivery,
    enqueued_at: Instant,
}

struct MemoryQueue {
    spec: QueueSpec,
    messages: VecDeque<Stored>,
}

#[derive(Default)]
struct State {
    exchanges: BTreeMap<String, ExchangeSpec>,
    queues: BTreeMap<String, MemoryQueue>,
    bindings: BTreeSet<BindingSpec>,
    closed: bool,
    publish_failure: Option<String>,
}

#[derive(Default)]
pub struct MemoryBroker {
    state: Mutex<State>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following publish fail with `reason`, or succeed again
    /// with `None`.
    pub async fn fail_publishes(&self, reason: Option<&str>) {
        self.state.lock().await.publish_failure = reason.map(str::to_string);
    }

    pub async fn is_closed(&self) -> bool {
        self.state.lock().await.closed
    }

    pub async fn snapshot(&self) -> TopologySnapshot {
        let state = self.state.lock().await;
        TopologySnapshot {
            exchanges: state.exchanges.values().cloned().collect(),
            queues: state.queues.values().map(|q| q.spec.clone()).collect(),
            bindings: state.bindings.iter().cloned().collect(),
        }
    }

    /// Number of ready messages in `queue` after expiring due messages.
    pub async fn depth(&self, queue: &str) -> Result<usize, MqError> {
        let mut state = self.state.lock().await;
        state.expire(Instant::now());
        Ok(state.queue(queue)?.messages.len())
    }

    /// Take the oldest ready message from `queue`.
    pub async fn get(&self, queue: &str) -> Result<Option<Delivery>, MqError> {
        let mut state = self.state.lock().await;
        state.expire(Instant::now());
        Ok(state
            .queue_mut(queue)?
            .messages
            .pop_front()
            .map(|stored| stored.delivery))
    }

    /// Take every ready message from `queue`.
    pub async fn drain(&self, queue: &str) -> Result<Vec<Delivery>, MqError> {
        let mut state = self.state.lock().await;
        state.expire(Instant::now());
        Ok(state
            .queue_mut(queue)?
            .messages
            .drain(..)
            .map(|stored| stored.delivery)
            .collect())
    }

    /// Negatively acknowledge a delivery. With `requeue` it goes back to the
    /// head of its queue; otherwise it is dead-lettered, or dropped when the
    /// queue has no dead-letter exchange.
    pub async fn reject(&self, delivery: Delivery, requeue: bool) -> Result<(), MqError> {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        let queue = state.queue_mut(&delivery.queue)?;

        if requeue {
            queue.messages.push_front(Stored {
                delivery,
                enqueued_at: now,
            });
            return Ok(());
        }

        if let Some(dlx) = queue.spec.dead_letter_exchange.clone() {
            state.dead_letter(delivery, &dlx, DeathReason::Rejected, now);
        }
        Ok(())
    }
}

impl State {
    fn queue(&self, name: &str) -> Result<&MemoryQueue, MqError> {
        self.queues
            .get(name)
            .ok_or_else(|| MqError::Connection(format!("NOT_FOUND - no queue '{name}'")))
    }

    fn queue_mut(&mut self, name: &str) -> Result<&mut MemoryQueue, MqError> {
        self.queues
            .get_mut(name)
            .ok_or_else(|| MqError::Connection(format!("NOT_FOUND - no queue '{name}'")))
    }

    fn ensure_open(&self) -> Result<(), MqError> {
        if self.closed {
            return Err(MqError::Connection("channel closed".into()));
        }
        Ok(())
    }

    /// Copy a message to every queue bound to `exchange`. The routing key is
    /// carried along but does not select queues. Unroutable messages are
    /// dropped.
    fn route(
        &mut self,
        exchange: &str,
        routing_key: &str,
        message: &EncodedMessage,
        deaths: &[DeathRecord],
        now: Instant,
    ) {
        if !self.exchanges.contains_key(exchange) {
            return;
        }

        let targets: Vec<String> = self
            .bindings
            .iter()
            .filter(|b| b.exchange == exchange)
            .map(|b| b.queue.clone())
            .collect();

        for target in targets {
            if let Some(queue) = self.queues.get_mut(&target) {
                queue.messages.push_back(Stored {
                    delivery: Delivery {
                        queue: target.clone(),
                        exchange: exchange.to_string(),
                        routing_key: routing_key.to_string(),
                        message: message.clone(),
                        deaths: deaths.to_vec(),
                    },
                    enqueued_at: now,
                });
            }
        }
    }

    fn dead_letter(&mut self, delivery: Delivery, dlx: &str, reason: DeathReason, now: Instant) {
        let mut deaths = delivery.deaths;
        deaths.push(DeathRecord {
            queue: delivery.queue,
            reason,
        });
        self.route(dlx, &delivery.routing_key, &delivery.message, &deaths, now);
    }

    /// Dead-letter every message whose TTL has elapsed, repeating until no
    /// queue has an expired head.
    fn expire(&mut self, now: Instant) {
        loop {
            let mut expired = Vec::new();
            for queue in self.queues.values_mut() {
                let Some(ttl) = queue.spec.message_ttl else {
                    continue;
                };
                while queue
                    .messages
                    .front()
                    .is_some_and(|m| m.enqueued_at + ttl <= now)
                {
                    if let Some(stored) = queue.messages.pop_front() {
                        expired.push((queue.spec.dead_letter_exchange.clone(), stored.delivery));
                    }
                }
            }

            if expired.is_empty() {
                return;
            }

            for (dlx, delivery) in expired {
                if let Some(dlx) = dlx {
                    self.dead_letter(delivery, &dlx, DeathReason::Expired, now);
                }
            }
        }
    }
}

fn inequivalent(entity: String, field: &str) -> MqError {
    MqError::declaration(
        entity,
        format!("PRECONDITION_FAILED - inequivalent arg '{field}'"),
    )
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn declare_exchange(&self, spec: &ExchangeSpec) -> Result<(), MqError> {
        let mut state = self.state.lock().await;
        state.ensure_open()?;

        match state.exchanges.get(&spec.name) {
            Some(existing) if existing.durable != spec.durable => {
                Err(inequivalent(format!("exchange '{}'", spec.name), "durable"))
            }
            Some(_) => Ok(()),
            None => {
                state.exchanges.insert(spec.name.clone(), spec.clone());
                Ok(())
            }
        }
    }

    async fn declare_queue(&self, spec: &QueueSpec) -> Result<(), MqError> {
        let mut state = self.state.lock().await;
        state.ensure_open()?;

        if let Some(existing) = state.queues.get(&spec.name) {
            let entity = format!("queue '{}'", spec.name);
            let existing = &existing.spec;
            if existing.durable != spec.durable {
                return Err(inequivalent(entity, "durable"));
            }
            if existing.exclusive != spec.exclusive {
                return Err(inequivalent(entity, "exclusive"));
            }
            if existing.auto_delete != spec.auto_delete {
                return Err(inequivalent(entity, "auto_delete"));
            }
            if existing.dead_letter_exchange != spec.dead_letter_exchange {
                return Err(inequivalent(entity, "x-dead-letter-exchange"));
            }
            if existing.message_ttl != spec.message_ttl {
                return Err(inequivalent(entity, "x-message-ttl"));
            }
            return Ok(());
        }

        state.queues.insert(
            spec.name.clone(),
            MemoryQueue {
                spec: spec.clone(),
                messages: VecDeque::new(),
            },
        );
        Ok(())
    }

    async fn bind_queue(&self, binding: &BindingSpec) -> Result<(), MqError> {
        let mut state = self.state.lock().await;
        state.ensure_open()?;

        let entity = format!("binding '{}' <- '{}'", binding.queue, binding.exchange);
        if !state.exchanges.contains_key(&binding.exchange) {
            return Err(MqError::declaration(
                entity,
                format!("NOT_FOUND - no exchange '{}'", binding.exchange),
            ));
        }
        if !state.queues.contains_key(&binding.queue) {
            return Err(MqError::declaration(
                entity,
                format!("NOT_FOUND - no queue '{}'", binding.queue),
            ));
        }

        state.bindings.insert(binding.clone());
        Ok(())
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        message: &EncodedMessage,
    ) -> Result<(), MqError> {
        let mut state = self.state.lock().await;
        state.ensure_open()?;

        if let Some(reason) = &state.publish_failure {
            return Err(MqError::publish(exchange, reason));
        }
        if !state.exchanges.contains_key(exchange) {
            return Err(MqError::publish(
                exchange,
                format!("NOT_FOUND - no exchange '{exchange}'"),
            ));
        }

        let now = Instant::now();
        state.expire(now);
        state.route(exchange, routing_key, message, &[], now);
        Ok(())
    }

    async fn close(&self) -> Result<(), MqError> {
        self.state.lock().await.closed = true;
        Ok(())
    }
}
