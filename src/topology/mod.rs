//! Front door for the two user-facing verbs.
//!
//! [`TopologyManager`] declares whatever a verb needs (exchange for
//! `produce`; queue and binding for `consume`) and then performs the
//! data-plane action on the same connection.

pub mod manager;

pub use manager::{DEFAULT_CONSUME_PATTERN, TopologyManager};

#[cfg(test)]
mod tests;
