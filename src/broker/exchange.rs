use crate::broker::routing::topic_matches;
use crate::transport::{ExchangeKind, ExchangeOptions};

/// A queue bound to an exchange under a routing key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub queue: String,
    pub routing_key: String,
}

/// Represents an exchange in the broker.
///
/// Holds its declaration parameters and the bindings that decide which
/// queues receive a published message.
#[derive(Debug, Clone)]
pub struct Exchange {
    pub name: String,
    pub options: ExchangeOptions,
    pub bindings: Vec<Binding>,
}

impl Exchange {
    pub fn new(name: &str, options: ExchangeOptions) -> Self {
        Self {
            name: name.to_string(),
            options,
            bindings: Vec::new(),
        }
    }

    /// Adds a binding. Returns false if an identical one already exists.
    pub fn bind(&mut self, queue: &str, routing_key: &str) -> bool {
        let binding = Binding {
            queue: queue.to_string(),
            routing_key: routing_key.to_string(),
        };
        if self.bindings.contains(&binding) {
            return false;
        }
        self.bindings.push(binding);
        true
    }

    /// Removes one binding. Returns true if it existed.
    pub fn unbind(&mut self, queue: &str, routing_key: &str) -> bool {
        let before = self.bindings.len();
        self.bindings
            .retain(|b| !(b.queue == queue && b.routing_key == routing_key));
        self.bindings.len() != before
    }

    /// Removes every binding to `queue`. Returns true if any existed.
    pub fn unbind_queue(&mut self, queue: &str) -> bool {
        let before = self.bindings.len();
        self.bindings.retain(|b| b.queue != queue);
        self.bindings.len() != before
    }

    /// Names of the queues a message with `routing_key` is routed to, each
    /// at most once, in binding order.
    pub fn route(&self, routing_key: &str) -> Vec<String> {
        let mut queues: Vec<String> = Vec::new();
        for binding in &self.bindings {
            let matched = match self.options.kind {
                ExchangeKind::Direct => binding.routing_key == routing_key,
                ExchangeKind::Fanout => true,
                ExchangeKind::Topic => topic_matches(&binding.routing_key, routing_key),
                // Bindings carry no header arguments here, so every message matches.
                ExchangeKind::Headers => true,
            };
            if matched && !queues.contains(&binding.queue) {
                queues.push(binding.queue.clone());
            }
        }
        queues
    }
}
