use std::collections::VecDeque;

use tokio::sync::mpsc::UnboundedSender;

use crate::broker::message::Message;
use crate::transport::QueueOptions;

/// A consumer attached to a queue.
#[derive(Debug)]
pub struct Consumer {
    pub tag: String,
    pub sender: UnboundedSender<Message>,
}

/// Represents a queue in the broker.
///
/// Messages wait in `messages` until a consumer is attached; consumers take
/// turns in round-robin order. Order is preserved per queue.
#[derive(Debug)]
pub struct Queue {
    pub name: String,
    pub options: QueueOptions,
    pub messages: VecDeque<Message>,
    pub consumers: Vec<Consumer>,
    next_consumer: usize,
}

impl Queue {
    pub fn new(name: &str, options: QueueOptions) -> Self {
        Self {
            name: name.to_string(),
            options,
            messages: VecDeque::new(),
            consumers: Vec::new(),
            next_consumer: 0,
        }
    }

    /// Hands `msg` to the next consumer, or keeps it if none can take it.
    pub fn push(&mut self, msg: Message) {
        if let Some(msg) = self.deliver(msg) {
            self.messages.push_back(msg);
        }
    }

    /// Attaches a consumer and hands it any backlog, oldest first.
    pub fn attach(&mut self, tag: &str, sender: UnboundedSender<Message>) {
        self.consumers.push(Consumer {
            tag: tag.to_string(),
            sender,
        });
        while let Some(msg) = self.messages.pop_front() {
            if let Some(msg) = self.deliver(msg) {
                self.messages.push_front(msg);
                break;
            }
        }
    }

    /// Round-robin delivery. Consumers whose receiving side is gone are
    /// dropped on the way; the message comes back if nobody is left.
    fn deliver(&mut self, mut msg: Message) -> Option<Message> {
        while !self.consumers.is_empty() {
            let idx = self.next_consumer % self.consumers.len();
            match self.consumers[idx].sender.send(msg) {
                Ok(()) => {
                    self.next_consumer = idx + 1;
                    return None;
                }
                Err(returned) => {
                    msg = returned.0;
                    self.consumers.remove(idx);
                }
            }
        }
        Some(msg)
    }

    /// Detaches a consumer. Returns true if it was attached.
    pub fn detach(&mut self, tag: &str) -> bool {
        let before = self.consumers.len();
        self.consumers.retain(|c| c.tag != tag);
        self.consumers.len() != before
    }
}
