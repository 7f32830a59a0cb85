//! Topology manager
//!
//! Owns the connector, the broker URL and the injected log sink. The
//! connection is opened on the first verb and released by [`close`], which
//! callers run on every exit path.
//!
//! Routing keys are optional at this boundary: `produce` publishes with an
//! empty key when none is given, `consume` binds with `#`.
//!
//! [`close`]: TopologyManager::close

use std::sync::Arc;

use futures::StreamExt;
use tracing::{debug, warn};

use crate::connection::{BindTarget, BrokerConnection};
use crate::transport::{Connector, DeliveryStream, ExchangeOptions, QueueOptions, TEXT_PLAIN};
use crate::utils::{Error, LogSink, Result};

/// Binding pattern used by `consume` when no routing key is given.
pub const DEFAULT_CONSUME_PATTERN: &str = "#";

pub struct TopologyManager {
    connector: Arc<dyn Connector>,
    url: String,
    sink: Arc<dyn LogSink>,
    connection: Option<BrokerConnection>,
}

impl TopologyManager {
    pub fn new(
        connector: Arc<dyn Connector>,
        url: impl Into<String>,
        sink: Arc<dyn LogSink>,
    ) -> Self {
        Self {
            connector,
            url: url.into(),
            sink,
            connection: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    async fn connection(&mut self) -> Result<&BrokerConnection> {
        if self.connection.is_none() {
            let connection = BrokerConnection::connect(self.connector.as_ref(), &self.url).await?;
            self.connection = Some(connection);
        }
        self.connection
            .as_ref()
            .ok_or_else(|| Error::Connection("not connected".to_string()))
    }

    /// Declares `exchange` and publishes `message` to it as `text/plain`.
    ///
    /// Returns once the broker confirmed the message. Nothing is retried.
    pub async fn produce(
        &mut self,
        exchange: &str,
        options: ExchangeOptions,
        message: &str,
        routing_key: Option<&str>,
    ) -> Result<()> {
        let routing_key = routing_key.unwrap_or_default();
        let connection = self.connection().await?;

        let handle = connection.declare_exchange(exchange, options).await?;
        connection
            .publish(&handle, routing_key, message.as_bytes(), TEXT_PLAIN)
            .await?;

        debug!("Produced message to {} with routing key '{}'", exchange, routing_key);
        Ok(())
    }

    /// Declares `queue`, binds it under `routing_key` (default `#`) to the
    /// default binding exchange, and logs every message until the broker
    /// ends the subscription.
    pub async fn consume(
        &mut self,
        queue: &str,
        options: QueueOptions,
        routing_key: Option<&str>,
    ) -> Result<()> {
        let deliveries = self
            .subscribe(queue, options, &BindTarget::Default, routing_key)
            .await?;
        self.drain(deliveries).await;
        Ok(())
    }

    /// Like [`consume`](Self::consume), bound to a named exchange instead.
    pub async fn consume_from(
        &mut self,
        queue: &str,
        options: QueueOptions,
        exchange: &str,
        routing_key: Option<&str>,
    ) -> Result<()> {
        let target = BindTarget::Exchange(exchange.to_string());
        let deliveries = self.subscribe(queue, options, &target, routing_key).await?;
        self.drain(deliveries).await;
        Ok(())
    }

    /// Setup half of `consume`: declare, bind, start the consumer. No
    /// subscription exists if any step fails.
    pub async fn subscribe(
        &mut self,
        queue: &str,
        options: QueueOptions,
        target: &BindTarget,
        routing_key: Option<&str>,
    ) -> Result<DeliveryStream> {
        let routing_key = routing_key.unwrap_or(DEFAULT_CONSUME_PATTERN);
        let connection = self.connection().await?;

        let handle = connection.declare_queue(queue, options).await?;
        connection.bind(&handle, target, routing_key).await?;
        connection.subscribe(&handle).await
    }

    /// Delivery half of `consume`: hands each payload to the sink in arrival
    /// order. Undecodable deliveries are logged and skipped. Returns the
    /// number of messages passed to the sink once the stream ends.
    pub async fn drain(&self, mut deliveries: DeliveryStream) -> u64 {
        let mut downloaded = 0;
        while let Some(item) = deliveries.next().await {
            let line =
                item.and_then(|d| d.text().map(|text| format!("Message downloaded: {text}")));
            match line {
                Ok(line) => {
                    self.sink.log(&line);
                    downloaded += 1;
                }
                Err(e) => warn!("Skipping delivery: {}", e),
            }
        }
        debug!("Subscription ended after {} messages", downloaded);
        downloaded
    }

    /// Closes the connection if one was opened.
    pub async fn close(mut self) -> Result<()> {
        match self.connection.take() {
            Some(connection) => connection.close().await,
            None => Ok(()),
        }
    }
}
