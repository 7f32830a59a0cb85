//! Broker engine
//!
//! This module contains the in-memory broker implementation responsible for:
//! - declaring exchanges and queues, rejecting inequivalent redeclarations
//! - binding queues to exchanges and routing published messages
//! - delivering queued messages to consumers in order
//! - removing auto-delete entities when they lose their last binding or consumer
//!
//! The API is synchronous and designed to be held behind a lock
//! (`Arc<Mutex<Broker>>`) by the memory transport.

use std::collections::HashMap;

use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::debug;

use crate::broker::exchange::Exchange;
use crate::broker::message::Message;
use crate::broker::queue::Queue;
use crate::transport::{ExchangeKind, ExchangeOptions, QueueOptions};
use crate::utils::{Error, Result};

/// Name of the default exchange. Every queue is implicitly bound to it
/// under its own name.
pub const DEFAULT_EXCHANGE: &str = "";

/// Prefix the broker keeps for its own exchanges and queues.
pub const RESERVED_PREFIX: &str = "amq.";

#[derive(Debug)]
pub struct Broker {
    pub vhost: String,
    pub exchanges: HashMap<String, Exchange>,
    pub queues: HashMap<String, Queue>,
}

impl Default for Broker {
    fn default() -> Self {
        Self::new()
    }
}

impl Broker {
    /// Creates a broker serving the `/` vhost with the standard `amq.*`
    /// exchanges already declared.
    pub fn new() -> Self {
        let mut broker = Self {
            vhost: "/".to_string(),
            exchanges: HashMap::new(),
            queues: HashMap::new(),
        };
        broker.declare_builtin_exchanges();
        broker
    }

    fn declare_builtin_exchanges(&mut self) {
        let builtin = [
            ("amq.direct", ExchangeKind::Direct),
            ("amq.fanout", ExchangeKind::Fanout),
            ("amq.topic", ExchangeKind::Topic),
            ("amq.headers", ExchangeKind::Headers),
        ];
        for (name, kind) in builtin {
            self.exchanges.entry(name.to_string()).or_insert_with(|| {
                Exchange::new(
                    name,
                    ExchangeOptions {
                        kind,
                        durable: true,
                        auto_delete: false,
                    },
                )
            });
        }
    }

    /// Declares an exchange, or confirms an existing one with the same
    /// parameters.
    pub fn declare_exchange(&mut self, name: &str, options: ExchangeOptions) -> Result<()> {
        if name == DEFAULT_EXCHANGE {
            return Err(Error::TopologyConflict(format!(
                "exchange name '{name}' is reserved in vhost '{}'",
                self.vhost
            )));
        }

        if let Some(existing) = self.exchanges.get(name) {
            let current = existing.options;
            let mismatch = if current.kind != options.kind {
                Some(("type", options.kind.to_string(), current.kind.to_string()))
            } else if current.durable != options.durable {
                Some(("durable", options.durable.to_string(), current.durable.to_string()))
            } else if current.auto_delete != options.auto_delete {
                Some((
                    "auto_delete",
                    options.auto_delete.to_string(),
                    current.auto_delete.to_string(),
                ))
            } else {
                None
            };
            return match mismatch {
                Some((arg, received, current)) => Err(Error::TopologyConflict(format!(
                    "inequivalent arg '{arg}' for exchange '{name}' in vhost '{}': received '{received}' but current is '{current}'",
                    self.vhost
                ))),
                None => Ok(()),
            };
        }

        if name.starts_with(RESERVED_PREFIX) {
            return Err(Error::TopologyConflict(format!(
                "exchange name '{name}' is reserved in vhost '{}'",
                self.vhost
            )));
        }
        self.exchanges
            .insert(name.to_string(), Exchange::new(name, options));
        debug!("Declared exchange {} ({})", name, options.kind);
        Ok(())
    }

    /// Declares a queue, or confirms an existing one with the same parameters.
    pub fn declare_queue(&mut self, name: &str, options: QueueOptions) -> Result<()> {
        if name.is_empty() {
            return Err(Error::TopologyConflict(format!(
                "queue name '{name}' is reserved in vhost '{}'",
                self.vhost
            )));
        }

        if let Some(existing) = self.queues.get(name) {
            let current = existing.options;
            let mismatch = if current.durable != options.durable {
                Some(("durable", options.durable, current.durable))
            } else if current.auto_delete != options.auto_delete {
                Some(("auto_delete", options.auto_delete, current.auto_delete))
            } else {
                None
            };
            return match mismatch {
                Some((arg, received, current)) => Err(Error::TopologyConflict(format!(
                    "inequivalent arg '{arg}' for queue '{name}' in vhost '{}': received '{received}' but current is '{current}'",
                    self.vhost
                ))),
                None => Ok(()),
            };
        }

        if name.starts_with(RESERVED_PREFIX) {
            return Err(Error::TopologyConflict(format!(
                "queue name '{name}' is reserved in vhost '{}'",
                self.vhost
            )));
        }
        self.queues.insert(name.to_string(), Queue::new(name, options));
        debug!("Declared queue {}", name);
        Ok(())
    }

    /// Binds `queue` to `exchange` under `routing_key`. Repeating an existing
    /// binding is a no-op.
    pub fn bind(&mut self, queue: &str, exchange: &str, routing_key: &str) -> Result<()> {
        if exchange == DEFAULT_EXCHANGE {
            return Err(Error::TopologyConflict(format!(
                "operation not permitted on the default exchange (binding queue '{queue}')"
            )));
        }
        if !self.queues.contains_key(queue) {
            return Err(Error::TopologyConflict(format!(
                "no queue '{queue}' in vhost '{}'",
                self.vhost
            )));
        }
        let vhost = &self.vhost;
        let target = self.exchanges.get_mut(exchange).ok_or_else(|| {
            Error::TopologyConflict(format!("no exchange '{exchange}' in vhost '{vhost}'"))
        })?;

        if target.bind(queue, routing_key) {
            debug!("Bound queue {} to {} with key '{}'", queue, exchange, routing_key);
        }
        Ok(())
    }

    /// Removes one binding. Unbinding something that is not bound is a no-op.
    pub fn unbind(&mut self, queue: &str, exchange: &str, routing_key: &str) -> Result<()> {
        let vhost = &self.vhost;
        let target = self.exchanges.get_mut(exchange).ok_or_else(|| {
            Error::TopologyConflict(format!("no exchange '{exchange}' in vhost '{vhost}'"))
        })?;

        if target.unbind(queue, routing_key) {
            self.collect_exchange(exchange);
        }
        Ok(())
    }

    /// Deletes a queue, its messages, its consumers and every binding to it.
    pub fn delete_queue(&mut self, name: &str) -> bool {
        if self.queues.remove(name).is_none() {
            return false;
        }

        let mut emptied = Vec::new();
        for (exchange_name, exchange) in self.exchanges.iter_mut() {
            if exchange.unbind_queue(name) {
                emptied.push(exchange_name.clone());
            }
        }
        for exchange_name in emptied {
            self.collect_exchange(&exchange_name);
        }

        debug!("Deleted queue {}", name);
        true
    }

    /// Drops an auto-delete exchange that has just lost its last binding.
    fn collect_exchange(&mut self, name: &str) {
        let unused = self
            .exchanges
            .get(name)
            .is_some_and(|e| e.options.auto_delete && e.bindings.is_empty());
        if unused {
            self.exchanges.remove(name);
            debug!("Auto-deleted exchange {}", name);
        }
    }

    /// Routes a message through `exchange` and returns how many queues
    /// received it. A message that matches no binding is dropped.
    pub fn publish(
        &mut self,
        exchange: &str,
        routing_key: &str,
        content_type: Option<&str>,
        payload: &[u8],
    ) -> Result<usize> {
        let targets = if exchange == DEFAULT_EXCHANGE {
            if self.queues.contains_key(routing_key) {
                vec![routing_key.to_string()]
            } else {
                Vec::new()
            }
        } else {
            match self.exchanges.get(exchange) {
                Some(e) => e.route(routing_key),
                None => {
                    return Err(Error::Publish(format!(
                        "no exchange '{exchange}' in vhost '{}'",
                        self.vhost
                    )));
                }
            }
        };

        let msg = Message {
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
            content_type: content_type.map(str::to_string),
            payload: payload.to_vec(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        };

        let mut routed = 0;
        for name in &targets {
            if let Some(queue) = self.queues.get_mut(name) {
                queue.push(msg.clone());
                routed += 1;
            }
        }

        if routed == 0 {
            debug!(
                "Message to '{}' with key '{}' matched no queue",
                exchange, routing_key
            );
        }
        Ok(routed)
    }

    /// Attaches a consumer to `queue` and returns the receiving side of its
    /// delivery channel.
    pub fn subscribe(&mut self, queue: &str, tag: &str) -> Result<UnboundedReceiver<Message>> {
        let vhost = &self.vhost;
        let target = self.queues.get_mut(queue).ok_or_else(|| {
            Error::TopologyConflict(format!("no queue '{queue}' in vhost '{vhost}'"))
        })?;

        let (tx, rx) = mpsc::unbounded_channel();
        target.attach(tag, tx);
        debug!("Consumer {} attached to {}", tag, queue);
        Ok(rx)
    }

    /// Detaches a consumer. An auto-delete queue goes away with its last
    /// consumer.
    pub fn cancel(&mut self, queue: &str, tag: &str) {
        let delete = match self.queues.get_mut(queue) {
            Some(q) => q.detach(tag) && q.options.auto_delete && q.consumers.is_empty(),
            None => false,
        };
        if delete {
            self.delete_queue(queue);
        }
    }

    /// Simulates a broker restart: consumers are disconnected, transient
    /// entities and all queued messages are lost, durable entities remain.
    pub fn restart(&mut self) {
        self.exchanges.retain(|_, e| e.options.durable);
        self.queues.retain(|_, q| q.options.durable);

        for exchange in self.exchanges.values_mut() {
            exchange
                .bindings
                .retain(|b| self.queues.contains_key(&b.queue));
        }

        for queue in self.queues.values_mut() {
            queue.consumers.clear();
            queue.messages.clear();
        }
        self.declare_builtin_exchanges();
        debug!("Broker restarted");
    }
}
