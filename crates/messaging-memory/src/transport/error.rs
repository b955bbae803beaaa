use courier_messaging::{TransportError, TransportErrorKind};
use thiserror::Error;

/// Errors that can occur in the in-memory transport.
#[derive(Debug, Error)]
pub enum Error {
    /// The subscription identifier is already in use on this transport.
    #[error("subscription `{0}` already exists")]
    DuplicateSubscription(String),

    /// The subscription identifier is empty.
    #[error("invalid subscription name - must not be empty")]
    InvalidSubscription,

    /// Serialization error.
    #[error(transparent)]
    Serialize(serde_json::Error),

    /// The broker has been marked unavailable.
    #[error("broker unavailable")]
    Unavailable,
}

impl TransportError for Error {
    fn kind(&self) -> TransportErrorKind {
        match self {
            Self::DuplicateSubscription(_) => TransportErrorKind::DuplicateSubscription,
            Self::InvalidSubscription => TransportErrorKind::InvalidSubscription,
            Self::Serialize(_) => TransportErrorKind::Serialization,
            Self::Unavailable => TransportErrorKind::TransportFailure,
        }
    }
}
