//! Transactional outbox: record outbound messages locally, relay them to the
//! broker in the background.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Persisted copies of outbound messages.
pub mod message;

/// Background relay of pending outbox rows to the broker.
pub mod processor;

/// Transport decorator that diverts publishes into the outbox.
pub mod relay;

/// Storage contract for outbox rows.
pub mod store;

/// Lookup table from recorded type names back to concrete message types.
pub mod types;

pub use message::{DecodeError, OutboxMessage};
pub use processor::{
    DEFAULT_BATCH_SIZE, DEFAULT_POLL_INTERVAL, OutboxProcessor, OutboxProcessorOptions,
    ProcessReport,
};
pub use relay::OutboxTransport;
pub use store::{OutboxStore, OutboxStoreError};
pub use types::{MessageTypes, ReplayError};
