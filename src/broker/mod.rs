//! The `broker` module is an in-process message broker with AMQP 0-9-1
//! topology semantics.
//!
//! It backs the `memory` transport: exchanges and queues are declared
//! idempotently with precondition checks, bindings route by exchange type,
//! queues hold messages in FIFO order until a consumer takes them, and
//! auto-delete entities disappear when their last binding or consumer goes.

pub mod engine;
pub mod exchange;
pub mod message;
pub mod queue;
pub mod routing;

pub use engine::Broker;
