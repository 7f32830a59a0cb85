//! Error types shared by the connection, transport and topology layers.
//!
//! The variants follow what the caller can do about a failure rather than
//! where it came from: a `Connection` error means nothing was declared, a
//! `TopologyConflict` means the broker already holds a different shape for
//! that name, and so on.

use thiserror::Error;

/// Result type alias using the crate's [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Broker unreachable, URL malformed, or the handshake was refused.
    #[error("connection error: {0}")]
    Connection(String),

    /// An exchange or queue already exists with different parameters, or the
    /// requested topology references something the broker refuses.
    #[error("topology conflict: {0}")]
    TopologyConflict(String),

    /// The broker rejected a publish or the channel closed underneath it.
    #[error("publish error: {0}")]
    Publish(String),

    /// A delivered message could not be decoded.
    #[error("delivery error: {0}")]
    Delivery(String),

    /// Settings could not be loaded.
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

