//! In-memory implementation of the messaging crate.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Transports are per-connection views of a broker.
pub mod transport;

pub use transport::{Error, MemoryTransport};

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use tokio::sync::{Mutex, broadcast};

const CHANNEL_CAPACITY: usize = 100;

/// An in-process broker shared by any number of [`MemoryTransport`]s.
///
/// Each subscription identifier maps to a broadcast channel, so every
/// transport subscribed under an identifier sees every message published to
/// it. Cloning the broker yields another handle to the same channels.
#[derive(Clone, Debug)]
pub struct MemoryBroker {
    available: Arc<AtomicBool>,
    channels: Arc<Mutex<HashMap<String, broadcast::Sender<Bytes>>>>,
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBroker {
    /// Creates a new, available broker with no channels.
    #[must_use]
    pub fn new() -> Self {
        Self {
            available: Arc::new(AtomicBool::new(true)),
            channels: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Opens a new transport (connection) to this broker.
    #[must_use]
    pub fn connect(&self) -> MemoryTransport {
        MemoryTransport::new(self.clone())
    }

    /// Simulates the broker going down (`false`) or coming back (`true`).
    ///
    /// While unavailable every publish fails; existing subscriptions stay
    /// registered and resume receiving once the broker is back.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Whether the broker currently accepts publishes.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn subscribe(&self, subscription: &str) -> broadcast::Receiver<Bytes> {
        self.channels
            .lock()
            .await
            .entry(subscription.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Returns whether anyone was subscribed to receive `payload`.
    async fn send(&self, subscription: &str, payload: Bytes) -> bool {
        self.channels
            .lock()
            .await
            .get(subscription)
            .is_some_and(|sender| sender.send(payload).is_ok())
    }

    /// Drops the channel for `subscription` once its last receiver is gone.
    async fn release(&self, subscription: &str) {
        let mut channels = self.channels.lock().await;

        if channels
            .get(subscription)
            .is_some_and(|sender| sender.receiver_count() == 0)
        {
            channels.remove(subscription);
        }
    }

    #[cfg(test)]
    async fn channel_count(&self) -> usize {
        self.channels.lock().await.len()
    }
}
