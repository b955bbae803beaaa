use crate::store::OutboxStoreError;

use thiserror::Error;

/// Errors that abort a whole processing tick.
///
/// Failures of individual rows are logged and counted instead.
#[derive(Debug, Error)]
pub enum Error<SE>
where
    SE: OutboxStoreError,
{
    /// Pending rows could not be read.
    #[error("failed to fetch pending outbox messages: {0}")]
    Fetch(SE),
}
