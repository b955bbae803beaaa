use crate::message::Message;

use std::error::Error;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// The capability of consuming messages of type `T`.
///
/// This is the only integration point a consuming service implements. A
/// single type may implement it for several message types; each
/// implementation is subscribed separately.
#[async_trait]
pub trait MessageHandler<T>
where
    Self: Send + Sync + 'static,
    T: Message,
{
    /// The error type for the handler.
    type Error: Error + Send + Sync + 'static;

    /// Handles one message. `cancellation` fires when the process shuts down.
    async fn handle(&self, message: T, cancellation: CancellationToken) -> Result<(), Self::Error>;
}
