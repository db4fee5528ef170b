//! Exchanges, queues and bindings behind reliable event delivery.
//!
//! Every event goes to the primary fan-out exchange, which copies it to the
//! worker queue and the archive queue. When the worker rejects a message the
//! worker queue dead-letters it to the retry exchange, whose only queue holds
//! it for the configured delay and then dead-letters it back to the primary
//! exchange. The delay therefore lives in the broker and fires even while
//! this process is down.
//!
//! ```text
//!  publish ──▶ PrimaryExchange ──┬──▶ WorkerQueue ──(reject)──▶ RetryExchange
//!                  ▲             └──▶ ArchiveQueue                   │
//!                  │                                                 ▼
//!                  └──────────────(ttl expired)─────────────── RetryQueue
//! ```

use std::time::Duration;

use common::TopologyConfig;
use tracing::{debug, info};

use crate::broker::{BindingSpec, Broker, ExchangeSpec, QueueSpec};
use crate::error::MqError;

/// One step of the provisioning plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Declaration {
    Exchange(ExchangeSpec),
    Queue(QueueSpec),
    Binding(BindingSpec),
}

impl Declaration {
    /// Short label used in logs and provisioning errors.
    pub fn describe(&self) -> String {
        match self {
            Declaration::Exchange(spec) => format!("exchange '{}'", spec.name),
            Declaration::Queue(spec) => format!("queue '{}'", spec.name),
            Declaration::Binding(spec) => {
                format!("binding '{}' <- '{}'", spec.queue, spec.exchange)
            }
        }
    }

    async fn apply(&self, broker: &dyn Broker) -> Result<(), MqError> {
        match self {
            Declaration::Exchange(spec) => broker.declare_exchange(spec).await,
            Declaration::Queue(spec) => broker.declare_queue(spec).await,
            Declaration::Binding(spec) => broker.bind_queue(spec).await,
        }
    }
}

/// The delayed-retry fan-out topology, resolved from configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    config: TopologyConfig,
}

impl Topology {
    pub fn from_config(config: &TopologyConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    pub fn primary_exchange(&self) -> &str {
        &self.config.primary_exchange
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(u64::from(self.config.retry_delay_ms))
    }

    /// Declarations in dependency order: exchanges, then queues whose
    /// dead-letter targets already exist, then bindings.
    pub fn plan(&self) -> Vec<Declaration> {
        let c = &self.config;

        vec![
            Declaration::Exchange(ExchangeSpec::durable_fanout(&c.primary_exchange)),
            Declaration::Exchange(ExchangeSpec::durable_fanout(&c.retry_exchange)),
            Declaration::Queue(
                QueueSpec::durable(&c.worker_queue).with_dead_letter_exchange(&c.retry_exchange),
            ),
            Declaration::Queue(
                QueueSpec::durable(&c.retry_queue)
                    .with_dead_letter_exchange(&c.primary_exchange)
                    .with_message_ttl(self.retry_delay()),
            ),
            Declaration::Queue(QueueSpec::durable(&c.archive_queue)),
            Declaration::Binding(self.binding(&c.worker_queue, &c.primary_exchange)),
            Declaration::Binding(self.binding(&c.archive_queue, &c.primary_exchange)),
            Declaration::Binding(self.binding(&c.retry_queue, &c.retry_exchange)),
        ]
    }

    fn binding(&self, queue: &str, exchange: &str) -> BindingSpec {
        BindingSpec {
            queue: queue.to_string(),
            exchange: exchange.to_string(),
            routing_key: self.config.binding_key.clone(),
        }
    }

    /// Declare the whole topology. Safe to run on every start; the first
    /// failing step aborts and the caller must not serve traffic.
    pub async fn provision(&self, broker: &dyn Broker) -> Result<(), MqError> {
        let plan = self.plan();

        for declaration in &plan {
            declaration
                .apply(broker)
                .await
                .map_err(|source| MqError::Provisioning {
                    step: declaration.describe(),
                    source: Box::new(source),
                })?;
            debug!(step = %declaration.describe(), "Declared");
        }

        info!(
            primary_exchange = %self.config.primary_exchange,
            retry_exchange = %self.config.retry_exchange,
            retry_delay_ms = self.config.retry_delay_ms,
            steps = plan.len(),
            "Broker topology provisioned"
        );
        Ok(())
    }
}
