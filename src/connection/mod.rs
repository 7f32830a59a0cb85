//! The `connection` module owns the single broker session used by an
//! invocation.
//!
//! A [`BrokerConnection`] is opened from a URL through a [`Connector`] and
//! must be closed explicitly with [`BrokerConnection::close`]. Declarations
//! hand back lightweight handles naming the exchange or queue they refer to;
//! the data-plane calls take those handles so nothing is published to, or
//! consumed from, an entity this connection never declared.

pub mod endpoint;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::transport::{Connector, DeliveryStream, ExchangeOptions, QueueOptions, Transport};
use crate::utils::Result;

pub use endpoint::{BrokerUrl, Scheme};

/// Exchange that queues bind to when no exchange is named. Its topic
/// routing makes the default `#` pattern match every routing key.
pub const DEFAULT_BIND_EXCHANGE: &str = "amq.topic";

/// A declared exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeHandle {
    pub name: String,
    pub options: ExchangeOptions,
}

/// A declared queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueHandle {
    pub name: String,
    pub options: QueueOptions,
}

/// Where a queue binding points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindTarget {
    /// The broker's topic exchange, [`DEFAULT_BIND_EXCHANGE`].
    Default,
    /// An exchange declared elsewhere, referenced by name.
    Exchange(String),
}

impl BindTarget {
    pub fn exchange_name(&self) -> &str {
        match self {
            BindTarget::Default => DEFAULT_BIND_EXCHANGE,
            BindTarget::Exchange(name) => name,
        }
    }
}

impl From<&ExchangeHandle> for BindTarget {
    fn from(handle: &ExchangeHandle) -> Self {
        BindTarget::Exchange(handle.name.clone())
    }
}

pub struct BrokerConnection {
    url: BrokerUrl,
    transport: Box<dyn Transport>,
    closed: bool,
}

impl BrokerConnection {
    /// Parses `url` and opens a session. A malformed URL fails before any
    /// network activity.
    pub async fn connect(connector: &dyn Connector, url: &str) -> Result<Self> {
        let url = BrokerUrl::parse(url)?;
        let transport = connector.open(&url).await?;
        info!("Connected to broker at {}", url);
        Ok(Self {
            url,
            transport,
            closed: false,
        })
    }

    pub fn url(&self) -> &BrokerUrl {
        &self.url
    }

    pub async fn declare_exchange(
        &self,
        name: &str,
        options: ExchangeOptions,
    ) -> Result<ExchangeHandle> {
        self.transport.declare_exchange(name, &options).await?;
        debug!(
            "Declared exchange {} (type={}, durable={}, auto_delete={})",
            name, options.kind, options.durable, options.auto_delete
        );
        Ok(ExchangeHandle {
            name: name.to_string(),
            options,
        })
    }

    pub async fn declare_queue(&self, name: &str, options: QueueOptions) -> Result<QueueHandle> {
        self.transport.declare_queue(name, &options).await?;
        debug!(
            "Declared queue {} (durable={}, auto_delete={})",
            name, options.durable, options.auto_delete
        );
        Ok(QueueHandle {
            name: name.to_string(),
            options,
        })
    }

    /// Creates the binding, or confirms it if it already exists.
    pub async fn bind(
        &self,
        queue: &QueueHandle,
        target: &BindTarget,
        routing_key: &str,
    ) -> Result<()> {
        let exchange = target.exchange_name();
        self.transport.bind(&queue.name, exchange, routing_key).await?;
        debug!(
            "Bound queue {} to exchange {} with routing key '{}'",
            queue.name, exchange, routing_key
        );
        Ok(())
    }

    /// Publishes one message and waits for the broker to confirm it.
    pub async fn publish(
        &self,
        exchange: &ExchangeHandle,
        routing_key: &str,
        payload: &[u8],
        content_type: &str,
    ) -> Result<()> {
        self.transport
            .publish(&exchange.name, routing_key, payload, content_type)
            .await?;
        debug!(
            "Published {} bytes to {} ({}) with routing key '{}'",
            payload.len(),
            exchange.name,
            exchange.options.kind,
            routing_key
        );
        Ok(())
    }

    /// Starts consuming `queue` under a fresh consumer tag.
    pub async fn subscribe(&self, queue: &QueueHandle) -> Result<DeliveryStream> {
        let consumer_tag = format!("{}-{}", env!("CARGO_PKG_NAME"), Uuid::new_v4());
        let deliveries = self.transport.subscribe(&queue.name, &consumer_tag).await?;
        debug!("Consuming {} as {}", queue.name, consumer_tag);
        Ok(deliveries)
    }

    pub async fn close(mut self) -> Result<()> {
        self.closed = true;
        self.transport.close().await?;
        info!("Closed connection to {}", self.url);
        Ok(())
    }
}

impl Drop for BrokerConnection {
    fn drop(&mut self) {
        if !self.closed {
            warn!("Connection to {} dropped without being closed", self.url);
        }
    }
}

impl std::fmt::Debug for BrokerConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerConnection")
            .field("url", &self.url)
            .field("closed", &self.closed)
            .finish()
    }
}

#[cfg(test)]
mod tests;
