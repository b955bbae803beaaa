use crate::message::OutboxMessage;

use std::error::Error;
use std::fmt::Debug;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Marker trait for outbox store errors
pub trait OutboxStoreError: Error + Send + Sync + 'static {}

/// Durable storage for outbox rows.
///
/// Rows are never deleted. The only mutation after insert is setting the
/// processed timestamp, and that happens at most once per row.
#[async_trait]
pub trait OutboxStore
where
    Self: Clone + Debug + Send + Sync + 'static,
{
    /// The error type for the store.
    type Error: OutboxStoreError;

    /// Inserts a new row. Fails if a row with the same id already exists.
    async fn insert(&self, message: OutboxMessage) -> Result<(), Self::Error>;

    /// Fetches one row by id.
    async fn get(&self, id: Uuid) -> Result<Option<OutboxMessage>, Self::Error>;

    /// Fetches at most `limit` unprocessed rows, oldest first. Rows created at
    /// the same instant come back in insertion order.
    async fn fetch_unprocessed(&self, limit: usize) -> Result<Vec<OutboxMessage>, Self::Error>;

    /// Sets the processed timestamp of row `id` if it is still unset.
    ///
    /// Returns `false` when the row is unknown or was already processed.
    async fn mark_processed(
        &self,
        id: Uuid,
        processed_at_utc: DateTime<Utc>,
    ) -> Result<bool, Self::Error>;
}
