//! NATS implementation of the messaging crate.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Core NATS transport: subscription identifiers are used directly as subjects.
pub mod transport;

pub use transport::{Error, NatsTransport};
