use std::time::Duration;

use courier_messaging::{TransportError, TransportErrorKind};
use thiserror::Error;

/// Error type for NATS transport operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Could not reach the NATS server.
    #[error("failed to connect: {0}")]
    Connect(String),

    /// The subscription identifier is already in use on this transport.
    #[error("subscription `{0}` already exists")]
    DuplicateSubscription(String),

    /// Flushing the connection after a publish failed.
    #[error("failed to flush: {0}")]
    Flush(String),

    /// The subscription name is not a literal NATS subject.
    #[error("invalid subscription name - must be non-empty and must not contain whitespace, '*', '>', or empty tokens")]
    InvalidSubscription,

    /// Publish error.
    #[error("Failed to publish: {0}")]
    Publish(async_nats::client::PublishErrorKind),

    /// Serialization error.
    #[error(transparent)]
    Serialize(serde_json::Error),

    /// Subscribing with the server failed.
    #[error("failed to subscribe: {0}")]
    Subscribe(String),

    /// The publish was not acknowledged by the server in time.
    #[error("publish timed out after {0:?}")]
    Timeout(Duration),
}

impl TransportError for Error {
    fn kind(&self) -> TransportErrorKind {
        match self {
            Self::DuplicateSubscription(_) => TransportErrorKind::DuplicateSubscription,
            Self::InvalidSubscription => TransportErrorKind::InvalidSubscription,
            Self::Serialize(_) => TransportErrorKind::Serialization,
            Self::Connect(_)
            | Self::Flush(_)
            | Self::Publish(_)
            | Self::Subscribe(_)
            | Self::Timeout(_) => TransportErrorKind::TransportFailure,
        }
    }
}
