use crate::error::HandlerFailed;

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use courier_messaging::{Message, MessageHandler, SubscriptionHandler};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Adapts a [`MessageHandler`] to the transport's callback shape.
pub struct HandlerSubscription<T, H> {
    cancellation: CancellationToken,
    handler: Arc<H>,
    _marker: PhantomData<fn() -> T>,
}

impl<T, H> HandlerSubscription<T, H> {
    pub fn new(handler: H, cancellation: CancellationToken) -> Self {
        Self {
            cancellation,
            handler: Arc::new(handler),
            _marker: PhantomData,
        }
    }
}

impl<T, H> Clone for HandlerSubscription<T, H> {
    fn clone(&self) -> Self {
        Self {
            cancellation: self.cancellation.clone(),
            handler: self.handler.clone(),
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<T, H> SubscriptionHandler<T> for HandlerSubscription<T, H>
where
    T: Message,
    H: MessageHandler<T>,
{
    type Error = HandlerFailed;

    async fn handle(&self, subscription: String, message: T) -> Result<(), Self::Error> {
        debug!(%subscription, message_type = T::type_name(), "dispatching message");

        self.handler
            .handle(message, self.cancellation.clone())
            .await
            .map_err(|e| HandlerFailed(Box::new(e)))
    }
}
