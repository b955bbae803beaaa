use courier_outbox::OutboxStoreError;
use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur in this crate.
#[derive(Clone, Debug, Error)]
pub enum Error {
    /// A row with this id is already stored.
    #[error("outbox message {0} already exists")]
    DuplicateId(Uuid),
}

impl OutboxStoreError for Error {}
