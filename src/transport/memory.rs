//! In-process transport backed by [`Broker`].
//!
//! A [`MemoryConnector`] stands in for a broker listening on one endpoint:
//! it refuses other `host:port` pairs, unknown vhosts and wrong credentials
//! the way a real server would, which keeps the failure paths of the
//! connection layer testable without a network.

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use tokio::sync::mpsc::UnboundedReceiver;

use crate::broker::Broker;
use crate::broker::message::Message;
use crate::connection::BrokerUrl;
use crate::transport::{
    Connector, Delivery, DeliveryStream, ExchangeOptions, QueueOptions, Transport,
};
use crate::utils::{Error, Result};

#[derive(Debug, Clone)]
pub struct MemoryConnector {
    broker: Arc<Mutex<Broker>>,
    host: String,
    port: u16,
    username: String,
    password: String,
}

impl MemoryConnector {
    /// Serves `broker` on `localhost:5672` for `guest`/`guest`.
    pub fn new(broker: Arc<Mutex<Broker>>) -> Self {
        Self {
            broker,
            host: "localhost".to_string(),
            port: 5672,
            username: "guest".to_string(),
            password: "guest".to_string(),
        }
    }

    pub fn listening_on(mut self, host: &str, port: u16) -> Self {
        self.host = host.to_string();
        self.port = port;
        self
    }

    pub fn with_credentials(mut self, username: &str, password: &str) -> Self {
        self.username = username.to_string();
        self.password = password.to_string();
        self
    }

    pub fn broker(&self) -> Arc<Mutex<Broker>> {
        self.broker.clone()
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn open(&self, url: &BrokerUrl) -> Result<Box<dyn Transport>> {
        if url.host != self.host || url.port != self.port {
            return Err(Error::Connection(format!(
                "could not reach {}: connection refused",
                url.authority()
            )));
        }
        if url.username != self.username || url.password != self.password {
            return Err(Error::Connection(format!(
                "ACCESS_REFUSED - login refused for user '{}'",
                url.username
            )));
        }

        let vhost = lock(&self.broker)?.vhost.clone();
        if url.vhost != vhost {
            return Err(Error::Connection(format!(
                "NOT_ALLOWED - vhost '{}' not found",
                url.vhost
            )));
        }

        Ok(Box::new(MemoryTransport {
            broker: self.broker.clone(),
            consumers: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }))
    }
}

pub struct MemoryTransport {
    broker: Arc<Mutex<Broker>>,
    /// (queue, consumer tag) pairs started on this session.
    consumers: Mutex<Vec<(String, String)>>,
    closed: AtomicBool,
}

impl MemoryTransport {
    fn broker(&self) -> Result<MutexGuard<'_, Broker>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::Connection("connection closed".to_string()));
        }
        lock(&self.broker)
    }
}

fn lock(broker: &Mutex<Broker>) -> Result<MutexGuard<'_, Broker>> {
    broker
        .lock()
        .map_err(|_| Error::Connection("broker state poisoned".to_string()))
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn declare_exchange(&self, name: &str, options: &ExchangeOptions) -> Result<()> {
        self.broker()?.declare_exchange(name, *options)
    }

    async fn declare_queue(&self, name: &str, options: &QueueOptions) -> Result<()> {
        self.broker()?.declare_queue(name, *options)
    }

    async fn bind(&self, queue: &str, exchange: &str, routing_key: &str) -> Result<()> {
        self.broker()?.bind(queue, exchange, routing_key)
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &[u8],
        content_type: &str,
    ) -> Result<()> {
        self.broker()?
            .publish(exchange, routing_key, Some(content_type), payload)
            .map(|_| ())
    }

    async fn subscribe(&self, queue: &str, consumer_tag: &str) -> Result<DeliveryStream> {
        let receiver = self.broker()?.subscribe(queue, consumer_tag)?;
        if let Ok(mut consumers) = self.consumers.lock() {
            consumers.push((queue.to_string(), consumer_tag.to_string()));
        }

        Ok(MemoryConsumer {
            receiver,
            _cancel: CancelOnDrop {
                broker: self.broker.clone(),
                queue: queue.to_string(),
                tag: consumer_tag.to_string(),
            },
        }
        .boxed())
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let started = match self.consumers.lock() {
            Ok(mut consumers) => std::mem::take(&mut *consumers),
            Err(_) => Vec::new(),
        };
        let mut broker = lock(&self.broker)?;
        for (queue, tag) in started {
            broker.cancel(&queue, &tag);
        }
        Ok(())
    }
}

/// Deliveries for one consumer. The consumer is cancelled on the broker
/// when this stream is dropped.
struct MemoryConsumer {
    receiver: UnboundedReceiver<Message>,
    _cancel: CancelOnDrop,
}

impl Stream for MemoryConsumer {
    type Item = Result<Delivery>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx).map(|msg| {
            msg.map(|m| {
                Ok(Delivery {
                    exchange: m.exchange,
                    routing_key: m.routing_key,
                    content_type: m.content_type,
                    payload: m.payload,
                })
            })
        })
    }
}

struct CancelOnDrop {
    broker: Arc<Mutex<Broker>>,
    queue: String,
    tag: String,
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if let Ok(mut broker) = self.broker.lock() {
            broker.cancel(&self.queue, &self.tag);
        }
    }
}
