//! The `utils` module holds the pieces every other module leans on: the
//! crate-wide error type and the logging setup.

pub mod error;
pub mod logging;

pub use error::{Error, Result};
pub use logging::{LogSink, TracingSink};
