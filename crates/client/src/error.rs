use crate::options::MessagingProvider;

use thiserror::Error;

/// Errors that can occur while setting up a [`MessageClient`](crate::MessageClient).
#[derive(Debug, Error)]
pub enum Error {
    /// The NATS driver failed to connect.
    #[error(transparent)]
    Nats(#[from] courier_messaging_nats::Error),

    /// The outbox store could not be opened.
    #[error("failed to open outbox store: {0}")]
    OutboxStore(#[from] courier_outbox_libsql::Error),

    /// The configured provider has no driver.
    #[error("messaging provider `{0}` is not supported")]
    UnsupportedProvider(MessagingProvider),
}
