mod error;

use crate::message::OutboxMessage;
use crate::store::OutboxStore;
pub use error::Error;

use async_trait::async_trait;
use courier_messaging::{Message, SubscriptionHandler, Transport};
use tracing::debug;

/// A transport that records publishes in an outbox instead of sending them.
///
/// With the outbox enabled, `publish` checks the identifier against the
/// wrapped transport and then only writes a row to the store; an
/// [`OutboxProcessor`](crate::OutboxProcessor) later replays it through the
/// wrapped transport. With it disabled, `publish` goes straight to the wrapped
/// transport. Subscriptions always go to the wrapped transport.
#[derive(Clone, Debug)]
pub struct OutboxTransport<Tr, St>
where
    Tr: Transport,
    St: OutboxStore,
{
    inner: Tr,
    outbox_enabled: bool,
    store: St,
}

impl<Tr, St> OutboxTransport<Tr, St>
where
    Tr: Transport,
    St: OutboxStore,
{
    /// Wraps `inner`, recording publishes in `store` when `outbox_enabled`.
    pub const fn new(inner: Tr, store: St, outbox_enabled: bool) -> Self {
        Self {
            inner,
            outbox_enabled,
            store,
        }
    }

    /// The wrapped transport. Publishing through it bypasses the outbox.
    pub const fn inner(&self) -> &Tr {
        &self.inner
    }

    /// The store outboxed messages are recorded in.
    pub const fn store(&self) -> &St {
        &self.store
    }

    /// Whether publishes are diverted into the outbox.
    pub const fn is_outbox_enabled(&self) -> bool {
        self.outbox_enabled
    }
}

#[async_trait]
impl<Tr, St> Transport for OutboxTransport<Tr, St>
where
    Tr: Transport,
    St: OutboxStore,
{
    type Error = Error<Tr::Error, St::Error>;

    async fn subscribe<T, X>(&self, subscription: &str, handler: X) -> Result<(), Self::Error>
    where
        T: Message,
        X: SubscriptionHandler<T>,
    {
        self.inner
            .subscribe::<T, X>(subscription, handler)
            .await
            .map_err(Error::Transport)
    }

    async fn publish<T>(&self, subscription: &str, message: T) -> Result<(), Self::Error>
    where
        T: Message,
    {
        if !self.outbox_enabled {
            return self
                .inner
                .publish(subscription, message)
                .await
                .map_err(Error::Transport);
        }

        // A row the broker would refuse could never be relayed.
        self.inner
            .check_subscription(subscription)
            .map_err(Error::Transport)?;

        let outbox_message = OutboxMessage::new(subscription, &message).map_err(Error::Serialize)?;
        let message_id = outbox_message.id();

        self.store
            .insert(outbox_message)
            .await
            .map_err(Error::Store)?;

        debug!(%message_id, %subscription, message_type = T::type_name(), "message recorded in outbox");

        Ok(())
    }

    async fn unsubscribe(&self, subscription: &str) -> Result<(), Self::Error> {
        self.inner
            .unsubscribe(subscription)
            .await
            .map_err(Error::Transport)
    }

    fn check_subscription(&self, subscription: &str) -> Result<(), Self::Error> {
        self.inner
            .check_subscription(subscription)
            .map_err(Error::Transport)
    }

    async fn shutdown(&self) {
        self.inner.shutdown().await;
    }
}
