//! The `transport` module is the seam between the topology layer and a
//! broker-protocol client.
//!
//! A [`Connector`] opens a session from a parsed [`BrokerUrl`]; the resulting
//! [`Transport`] offers exactly the capabilities the topology layer needs:
//! declare exchange, declare queue, bind, publish and subscribe.
//!
//! Two implementations live here:
//! - `amqp`: AMQP 0-9-1 over `lapin`, used by the binary.
//! - `memory`: an in-process broker, used by the test suite.

pub mod amqp;
pub mod memory;
pub mod message;
pub mod options;

use async_trait::async_trait;

use crate::connection::BrokerUrl;
use crate::utils::Result;

pub use amqp::AmqpConnector;
pub use memory::MemoryConnector;
pub use message::{Delivery, DeliveryStream};
pub use options::{ExchangeKind, ExchangeOptions, QueueOptions};

/// Content type attached to every published message.
pub const TEXT_PLAIN: &str = "text/plain";

/// Opens sessions against one kind of broker.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self, url: &BrokerUrl) -> Result<Box<dyn Transport>>;
}

/// An open session to a broker.
///
/// Declarations are idempotent on the broker side: repeating one with the
/// same parameters succeeds, repeating it with different parameters fails
/// with `Error::TopologyConflict`.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn declare_exchange(&self, name: &str, options: &ExchangeOptions) -> Result<()>;

    async fn declare_queue(&self, name: &str, options: &QueueOptions) -> Result<()>;

    /// Routes messages from `exchange` matching `routing_key` into `queue`.
    async fn bind(&self, queue: &str, exchange: &str, routing_key: &str) -> Result<()>;

    /// Returns once the broker has confirmed the message.
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &[u8],
        content_type: &str,
    ) -> Result<()>;

    /// Starts a consumer in auto-accept mode. Deliveries arrive in queue order.
    async fn subscribe(&self, queue: &str, consumer_tag: &str) -> Result<DeliveryStream>;

    async fn close(&self) -> Result<()>;
}
