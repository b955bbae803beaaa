//! In-memory implementation of outbox storage for local development and
//! tests. Nothing survives the process.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;

pub use error::Error;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use courier_outbox::{OutboxMessage, OutboxStore};
use tokio::sync::Mutex;
use uuid::Uuid;

/// In-memory outbox store. Clones share the same rows.
#[derive(Clone, Debug, Default)]
pub struct MemoryOutboxStore {
    messages: Arc<Mutex<Vec<OutboxMessage>>>,
}

impl MemoryOutboxStore {
    /// Creates a new, empty `MemoryOutboxStore`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            messages: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Number of stored rows, processed or not.
    pub async fn len(&self) -> usize {
        self.messages.lock().await.len()
    }

    /// Whether no rows are stored.
    pub async fn is_empty(&self) -> bool {
        self.messages.lock().await.is_empty()
    }
}

#[async_trait]
impl OutboxStore for MemoryOutboxStore {
    type Error = Error;

    async fn insert(&self, message: OutboxMessage) -> Result<(), Self::Error> {
        let mut messages = self.messages.lock().await;

        if messages.iter().any(|existing| existing.id() == message.id()) {
            return Err(Error::DuplicateId(message.id()));
        }

        messages.push(message);
        drop(messages);

        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<OutboxMessage>, Self::Error> {
        let messages = self.messages.lock().await;
        Ok(messages.iter().find(|message| message.id() == id).cloned())
    }

    async fn fetch_unprocessed(&self, limit: usize) -> Result<Vec<OutboxMessage>, Self::Error> {
        let mut pending: Vec<OutboxMessage> = self
            .messages
            .lock()
            .await
            .iter()
            .filter(|message| !message.is_processed())
            .cloned()
            .collect();

        // Stable, so equal timestamps keep insertion order.
        pending.sort_by_key(OutboxMessage::created_at_utc);
        pending.truncate(limit);

        Ok(pending)
    }

    async fn mark_processed(
        &self,
        id: Uuid,
        processed_at_utc: DateTime<Utc>,
    ) -> Result<bool, Self::Error> {
        let mut messages = self.messages.lock().await;

        Ok(messages
            .iter_mut()
            .find(|message| message.id() == id)
            .is_some_and(|message| message.mark_processed(processed_at_utc)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::TimeDelta;
    use courier_messaging::Message;
    use serde::{Deserialize, Serialize};

    #[derive(Clone, Debug, Deserialize, Serialize)]
    struct ReviewPosted {
        review_id: u32,
    }

    impl Message for ReviewPosted {}

    fn row_at(created_at_utc: DateTime<Utc>) -> OutboxMessage {
        OutboxMessage::from_parts(
            Uuid::new_v4(),
            "reviews_ReviewPosted".to_string(),
            ReviewPosted::type_name().to_string(),
            r#"{"review_id":1}"#.to_string(),
            created_at_utc,
            None,
        )
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let store = MemoryOutboxStore::new();
        let message = OutboxMessage::new("reviews", &ReviewPosted { review_id: 3 }).unwrap();

        store.insert(message.clone()).await.unwrap();

        assert_eq!(store.get(message.id()).await.unwrap(), Some(message));
        assert_eq!(store.get(Uuid::new_v4()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_duplicate_id_rejected() {
        let store = MemoryOutboxStore::new();
        let message = row_at(Utc::now());

        store.insert(message.clone()).await.unwrap();
        let err = store.insert(message.clone()).await.unwrap_err();

        assert!(matches!(err, Error::DuplicateId(id) if id == message.id()));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_fetch_unprocessed_orders_by_creation() {
        let store = MemoryOutboxStore::new();
        let now = Utc::now();
        let newest = row_at(now);
        let oldest = row_at(now - TimeDelta::seconds(10));
        let middle = row_at(now - TimeDelta::seconds(5));

        store.insert(newest.clone()).await.unwrap();
        store.insert(oldest.clone()).await.unwrap();
        store.insert(middle.clone()).await.unwrap();

        let ids: Vec<Uuid> = store
            .fetch_unprocessed(10)
            .await
            .unwrap()
            .iter()
            .map(OutboxMessage::id)
            .collect();

        assert_eq!(ids, vec![oldest.id(), middle.id(), newest.id()]);
    }

    #[tokio::test]
    async fn test_fetch_unprocessed_ties_keep_insertion_order() {
        let store = MemoryOutboxStore::new();
        let now = Utc::now();
        let first = row_at(now);
        let second = row_at(now);

        store.insert(first.clone()).await.unwrap();
        store.insert(second.clone()).await.unwrap();

        let pending = store.fetch_unprocessed(10).await.unwrap();
        assert_eq!(pending[0].id(), first.id());
        assert_eq!(pending[1].id(), second.id());
    }

    #[tokio::test]
    async fn test_fetch_unprocessed_respects_limit_and_skips_processed() {
        let store = MemoryOutboxStore::new();
        let now = Utc::now();
        let rows: Vec<OutboxMessage> = (0..5)
            .map(|i| row_at(now + TimeDelta::milliseconds(i)))
            .collect();

        for row in &rows {
            store.insert(row.clone()).await.unwrap();
        }
        assert!(store.mark_processed(rows[0].id(), now).await.unwrap());

        let pending = store.fetch_unprocessed(2).await.unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].id(), rows[1].id());
        assert_eq!(pending[1].id(), rows[2].id());
    }

    #[tokio::test]
    async fn test_mark_processed_is_idempotent() {
        let store = MemoryOutboxStore::new();
        let message = row_at(Utc::now());
        let processed_at = Utc::now();

        store.insert(message.clone()).await.unwrap();

        assert!(store.mark_processed(message.id(), processed_at).await.unwrap());
        assert!(!store.mark_processed(message.id(), Utc::now()).await.unwrap());
        assert!(!store.mark_processed(Uuid::new_v4(), Utc::now()).await.unwrap());

        let stored = store.get(message.id()).await.unwrap().unwrap();
        assert_eq!(stored.processed_at_utc(), Some(processed_at));
        assert!(store.fetch_unprocessed(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_clones_share_rows() {
        let store = MemoryOutboxStore::new();
        let clone = store.clone();

        clone.insert(row_at(Utc::now())).await.unwrap();

        assert!(!store.is_empty().await);
    }
}
