use courier_outbox::OutboxStoreError;
use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur in this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// A row with this id is already stored.
    #[error("outbox message {0} already exists")]
    DuplicateId(Uuid),

    /// A stored row could not be read back.
    #[error("invalid outbox row: {0}")]
    InvalidRow(String),

    /// Libsql error.
    #[error(transparent)]
    Libsql(#[from] libsql::Error),
}

impl OutboxStoreError for Error {}
