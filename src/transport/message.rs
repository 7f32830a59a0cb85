use futures::stream::BoxStream;

use crate::utils::Result;

/// A message handed to a consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub exchange: String,
    pub routing_key: String,
    pub content_type: Option<String>,
    pub payload: Vec<u8>,
}

impl Delivery {
    /// The payload as text, or `Error::Delivery` when it is not UTF-8.
    pub fn text(&self) -> Result<&str> {
        std::str::from_utf8(&self.payload).map_err(|e| {
            crate::utils::Error::Delivery(format!(
                "payload from '{}' with routing key '{}' is not UTF-8: {e}",
                self.exchange, self.routing_key
            ))
        })
    }
}

/// Ordered deliveries for one consumer. Ends when the broker cancels the
/// consumer or the session closes.
pub type DeliveryStream = BoxStream<'static, Result<Delivery>>;
