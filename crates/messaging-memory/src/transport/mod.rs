mod error;

use crate::MemoryBroker;
pub use error::Error;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use courier_messaging::{Message, SubscriptionHandler, Transport};
use tokio::sync::{Mutex, broadcast};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, warn};

/// A connection to a [`MemoryBroker`] with its own subscription table.
#[derive(Clone, Debug)]
pub struct MemoryTransport {
    broker: MemoryBroker,
    subscriptions: Arc<Mutex<HashMap<String, CancellationToken>>>,
    task_tracker: TaskTracker,
}

impl MemoryTransport {
    pub(crate) fn new(broker: MemoryBroker) -> Self {
        Self {
            broker,
            subscriptions: Arc::new(Mutex::new(HashMap::new())),
            task_tracker: TaskTracker::new(),
        }
    }

    /// Whether `subscription` is currently registered on this transport.
    pub async fn is_subscribed(&self, subscription: &str) -> bool {
        self.subscriptions.lock().await.contains_key(subscription)
    }

    async fn deliver<T, X>(
        broker: MemoryBroker,
        subscription: String,
        mut receiver: broadcast::Receiver<Bytes>,
        handler: X,
        shutdown_token: CancellationToken,
    ) where
        T: Message,
        X: SubscriptionHandler<T>,
    {
        loop {
            tokio::select! {
                biased;
                () = shutdown_token.cancelled() => {
                    debug!(%subscription, "subscription cancelled, exiting delivery loop");
                    break;
                }
                received = receiver.recv() => {
                    match received {
                        Ok(payload) => match serde_json::from_slice::<T>(&payload) {
                            Ok(message) => {
                                if let Err(e) = handler.handle(subscription.clone(), message).await {
                                    error!(%subscription, "error handling message: {}", e);
                                }
                            }
                            Err(e) => {
                                error!(%subscription, "failed to decode message: {}", e);
                            }
                        },
                        Err(broadcast::error::RecvError::Closed) => {
                            debug!(%subscription, "channel closed, exiting delivery loop");
                            break;
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!(%subscription, "subscriber lagged by {} messages", n);
                        }
                    }
                }
            }
        }

        drop(receiver);
        broker.release(&subscription).await;
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    type Error = Error;

    async fn subscribe<T, X>(&self, subscription: &str, handler: X) -> Result<(), Self::Error>
    where
        T: Message,
        X: SubscriptionHandler<T>,
    {
        self.check_subscription(subscription)?;

        let mut subscriptions = self.subscriptions.lock().await;
        if subscriptions.contains_key(subscription) {
            return Err(Error::DuplicateSubscription(subscription.to_string()));
        }

        let receiver = self.broker.subscribe(subscription).await;
        let shutdown_token = CancellationToken::new();

        self.task_tracker.spawn(Self::deliver::<T, X>(
            self.broker.clone(),
            subscription.to_string(),
            receiver,
            handler,
            shutdown_token.clone(),
        ));

        subscriptions.insert(subscription.to_string(), shutdown_token);
        drop(subscriptions);

        debug!(%subscription, "subscribed");

        Ok(())
    }

    async fn publish<T>(&self, subscription: &str, message: T) -> Result<(), Self::Error>
    where
        T: Message,
    {
        self.check_subscription(subscription)?;

        if !self.broker.is_available() {
            return Err(Error::Unavailable);
        }

        let payload = Bytes::from(serde_json::to_vec(&message).map_err(Error::Serialize)?);

        // Nobody listening is fine for pub/sub; the message is dropped.
        if !self.broker.send(subscription, payload).await {
            debug!(%subscription, "published with no active subscribers");
        }

        Ok(())
    }

    async fn unsubscribe(&self, subscription: &str) -> Result<(), Self::Error> {
        if let Some(token) = self.subscriptions.lock().await.remove(subscription) {
            token.cancel();
            debug!(%subscription, "unsubscribed");
        }

        Ok(())
    }

    fn check_subscription(&self, subscription: &str) -> Result<(), Self::Error> {
        if subscription.is_empty() {
            return Err(Error::InvalidSubscription);
        }

        Ok(())
    }

    async fn shutdown(&self) {
        for (_, token) in self.subscriptions.lock().await.drain() {
            token.cancel();
        }

        self.task_tracker.close();
        self.task_tracker.wait().await;
    }
}
