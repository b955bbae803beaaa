use crate::message::Message;
use crate::subscription_handler::SubscriptionHandler;

use std::error::Error;
use std::fmt::{self, Debug, Display};

use async_trait::async_trait;

/// Broad classification of transport failures, independent of the backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// The subscription identifier is already registered on this transport.
    DuplicateSubscription,

    /// The subscription identifier is not acceptable to the backend.
    InvalidSubscription,

    /// The message could not be encoded or recorded.
    Serialization,

    /// The broker (or the store standing in for it) failed the operation.
    TransportFailure,
}

impl Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateSubscription => write!(f, "duplicate subscription"),
            Self::InvalidSubscription => write!(f, "invalid subscription"),
            Self::Serialization => write!(f, "serialization failure"),
            Self::TransportFailure => write!(f, "transport failure"),
        }
    }
}

/// Trait implemented by every transport error type.
pub trait TransportError: Error + Send + Sync + 'static {
    /// Classifies the error.
    fn kind(&self) -> TransportErrorKind;
}

/// Publish/subscribe access to a message broker.
///
/// Implementations keep a table of their own subscriptions: subscribing an
/// identifier twice on one instance fails, and unsubscribing an unknown
/// identifier does nothing.
#[async_trait]
pub trait Transport
where
    Self: Clone + Debug + Send + Sync + 'static,
{
    /// The error type for the transport.
    type Error: TransportError;

    /// Registers `handler` for messages of type `T` published under `subscription`.
    async fn subscribe<T, X>(&self, subscription: &str, handler: X) -> Result<(), Self::Error>
    where
        T: Message,
        X: SubscriptionHandler<T>;

    /// Publishes `message` to every current subscriber of `subscription`.
    async fn publish<T>(&self, subscription: &str, message: T) -> Result<(), Self::Error>
    where
        T: Message;

    /// Releases the subscription registered under `subscription`, if any.
    async fn unsubscribe(&self, subscription: &str) -> Result<(), Self::Error>;

    /// Checks that `subscription` is an identifier this transport accepts,
    /// without touching the broker.
    ///
    /// # Errors
    ///
    /// Returns an error of kind [`TransportErrorKind::InvalidSubscription`]
    /// if the identifier would be rejected by `subscribe` or `publish`.
    fn check_subscription(&self, subscription: &str) -> Result<(), Self::Error>;

    /// Cancels every subscription on this transport and waits for their
    /// delivery tasks to exit.
    async fn shutdown(&self);
}
