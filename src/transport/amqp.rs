//! AMQP 0-9-1 transport using lapin
//!
//! Each operation runs on its own channel. A soft error such as an
//! inequivalent redeclaration closes the channel that caused it, so a fresh
//! channel per operation keeps one failure from poisoning the next call.
//! Publishes use publisher confirms; consumers run in `no_ack` mode.

use async_trait::async_trait;
use futures::StreamExt;
use lapin::{
    BasicProperties, Channel, Connection, ConnectionProperties,
    options::*,
    protocol::{AMQPErrorKind, AMQPSoftError},
    types::FieldTable,
};
use tracing::{debug, info};

use crate::connection::BrokerUrl;
use crate::transport::{
    Connector, Delivery, DeliveryStream, ExchangeKind, ExchangeOptions, QueueOptions, Transport,
};
use crate::utils::{Error, Result};

/// Reply code sent when closing normally.
const REPLY_SUCCESS: u16 = 200;

/// Opens lapin connections.
#[derive(Debug, Clone)]
pub struct AmqpConnector {
    /// Shown in the broker's management UI.
    pub connection_name: String,
}

impl Default for AmqpConnector {
    fn default() -> Self {
        Self {
            connection_name: env!("CARGO_PKG_NAME").to_string(),
        }
    }
}

#[async_trait]
impl Connector for AmqpConnector {
    async fn open(&self, url: &BrokerUrl) -> Result<Box<dyn Transport>> {
        let properties =
            ConnectionProperties::default().with_connection_name(self.connection_name.clone().into());

        let connection = Connection::connect(url.as_str(), properties)
            .await
            .map_err(|e| Error::Connection(format!("{url}: {e}")))?;

        info!("AMQP session open to {}", url);
        Ok(Box::new(AmqpTransport { connection }))
    }
}

pub struct AmqpTransport {
    connection: Connection,
}

/// Which error a failed broker call surfaces as.
#[derive(Debug, Clone, Copy)]
enum Stage {
    Topology,
    Publish,
}

fn classify(stage: Stage, err: lapin::Error) -> Error {
    let message = err.to_string();
    match stage {
        Stage::Publish => Error::Publish(message),
        Stage::Topology => match &err {
            lapin::Error::ProtocolError(amqp) => match amqp.kind() {
                AMQPErrorKind::Soft(
                    AMQPSoftError::PRECONDITIONFAILED
                    | AMQPSoftError::ACCESSREFUSED
                    | AMQPSoftError::NOTFOUND,
                ) => Error::TopologyConflict(message),
                _ => Error::Connection(message),
            },
            _ => Error::Connection(message),
        },
    }
}

impl AmqpTransport {
    async fn channel(&self, stage: Stage) -> Result<Channel> {
        self.connection
            .create_channel()
            .await
            .map_err(|e| classify(stage, e))
    }
}

/// Best-effort close of a channel that finished its work.
async fn release(channel: Channel) {
    if let Err(e) = channel.close(REPLY_SUCCESS, "OK").await {
        debug!("Channel {} close: {}", channel.id(), e);
    }
}

impl From<ExchangeKind> for lapin::ExchangeKind {
    fn from(kind: ExchangeKind) -> Self {
        match kind {
            ExchangeKind::Direct => lapin::ExchangeKind::Direct,
            ExchangeKind::Fanout => lapin::ExchangeKind::Fanout,
            ExchangeKind::Topic => lapin::ExchangeKind::Topic,
            ExchangeKind::Headers => lapin::ExchangeKind::Headers,
        }
    }
}

impl From<lapin::message::Delivery> for Delivery {
    fn from(delivery: lapin::message::Delivery) -> Self {
        Self {
            exchange: delivery.exchange.as_str().to_string(),
            routing_key: delivery.routing_key.as_str().to_string(),
            content_type: delivery
                .properties
                .content_type()
                .as_ref()
                .map(|c| c.as_str().to_string()),
            payload: delivery.data,
        }
    }
}

#[async_trait]
impl Transport for AmqpTransport {
    async fn declare_exchange(&self, name: &str, options: &ExchangeOptions) -> Result<()> {
        let channel = self.channel(Stage::Topology).await?;
        channel
            .exchange_declare(
                name,
                options.kind.into(),
                ExchangeDeclareOptions {
                    durable: options.durable,
                    auto_delete: options.auto_delete,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| classify(Stage::Topology, e))?;
        release(channel).await;
        Ok(())
    }

    async fn declare_queue(&self, name: &str, options: &QueueOptions) -> Result<()> {
        let channel = self.channel(Stage::Topology).await?;
        channel
            .queue_declare(
                name,
                QueueDeclareOptions {
                    durable: options.durable,
                    auto_delete: options.auto_delete,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| classify(Stage::Topology, e))?;
        release(channel).await;
        Ok(())
    }

    async fn bind(&self, queue: &str, exchange: &str, routing_key: &str) -> Result<()> {
        let channel = self.channel(Stage::Topology).await?;
        channel
            .queue_bind(
                queue,
                exchange,
                routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| classify(Stage::Topology, e))?;
        release(channel).await;
        Ok(())
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &[u8],
        content_type: &str,
    ) -> Result<()> {
        let channel = self.channel(Stage::Publish).await?;
        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(|e| classify(Stage::Publish, e))?;

        let properties = BasicProperties::default()
            .with_content_type(content_type.into())
            .with_timestamp(chrono::Utc::now().timestamp() as u64);

        let confirmation = channel
            .basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions::default(),
                payload,
                properties,
            )
            .await
            .map_err(|e| classify(Stage::Publish, e))?
            .await
            .map_err(|e| classify(Stage::Publish, e))?;

        if confirmation.is_nack() {
            return Err(Error::Publish(format!(
                "broker refused message for exchange '{exchange}'"
            )));
        }

        release(channel).await;
        Ok(())
    }

    async fn subscribe(&self, queue: &str, consumer_tag: &str) -> Result<DeliveryStream> {
        let channel = self.channel(Stage::Topology).await?;
        let consumer = channel
            .basic_consume(
                queue,
                consumer_tag,
                BasicConsumeOptions {
                    no_ack: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| classify(Stage::Topology, e))?;

        // The stream owns the channel so it stays open while consuming.
        let deliveries = consumer.map(move |item| {
            let _channel = &channel;
            item.map(Delivery::from)
                .map_err(|e| Error::Delivery(e.to_string()))
        });
        Ok(deliveries.boxed())
    }

    async fn close(&self) -> Result<()> {
        self.connection
            .close(REPLY_SUCCESS, "OK")
            .await
            .map_err(|e| Error::Connection(e.to_string()))
    }
}
