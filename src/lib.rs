//! # amqpsub
//!
//! `amqpsub` publishes and consumes messages against an AMQP exchange/queue
//! topology. It sends a single message to a named exchange with a routing
//! key, or subscribes a named queue to a routing pattern and logs what
//! arrives.
//!
//! ## Core Modules
//!
//! - `topology`: the `produce`/`consume` verbs, declaring what each one needs.
//! - `connection`: broker URL parsing and the single broker session.
//! - `transport`: the broker-client seam, with AMQP (lapin) and in-memory
//!   implementations.
//! - `broker`: the in-memory broker engine behind the memory transport.
//! - `config`: loading settings from defaults, file and environment.
//! - `utils`: error types and logging.

pub mod broker;
pub mod config;
pub mod connection;
pub mod topology;
pub mod transport;
pub mod utils;
