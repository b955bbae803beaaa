use crate::message::Message;

use std::error::Error;

use async_trait::async_trait;

/// Marker trait for subscription handler errors
pub trait SubscriptionHandlerError: Error + Send + Sync + 'static {}

/// A callback invoked by a transport once per message delivered to a subscription.
#[async_trait]
pub trait SubscriptionHandler<T>
where
    Self: Clone + Send + Sync + 'static,
    T: Message,
{
    /// The error type for the handler.
    type Error: SubscriptionHandlerError;

    /// Handles one delivered message.
    async fn handle(&self, subscription: String, message: T) -> Result<(), Self::Error>;
}
