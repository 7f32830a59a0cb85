/// A message as stored in a queue.
///
/// Carries the exchange and routing key it was published with, the content
/// type tag, the opaque payload, and the publish time in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub exchange: String,
    pub routing_key: String,
    pub content_type: Option<String>,
    pub payload: Vec<u8>,
    pub timestamp: i64,
}
