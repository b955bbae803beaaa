use crate::store::OutboxStoreError;

use courier_messaging::{TransportError, TransportErrorKind};
use thiserror::Error;

/// Errors from publishing through an [`OutboxTransport`](super::OutboxTransport).
#[derive(Debug, Error)]
pub enum Error<TE, SE>
where
    TE: TransportError,
    SE: OutboxStoreError,
{
    /// The message could not be serialized for the outbox.
    #[error("failed to serialize message for the outbox: {0}")]
    Serialize(serde_json::Error),

    /// The outbox store rejected the message.
    #[error("failed to record message in the outbox: {0}")]
    Store(SE),

    /// The wrapped transport failed.
    #[error(transparent)]
    Transport(TE),
}

impl<TE, SE> TransportError for Error<TE, SE>
where
    TE: TransportError,
    SE: OutboxStoreError,
{
    fn kind(&self) -> TransportErrorKind {
        match self {
            Self::Serialize(_) => TransportErrorKind::Serialization,
            Self::Store(_) => TransportErrorKind::TransportFailure,
            Self::Transport(e) => e.kind(),
        }
    }
}
