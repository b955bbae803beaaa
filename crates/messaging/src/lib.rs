//! Abstract interface for publishing and consuming domain events.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Handlers are the application-facing consumers of a message type.
pub mod handler;

/// Messages are the typed payloads moved between services.
pub mod message;

/// Subscription handlers process messages delivered to a subscription.
pub mod subscription_handler;

/// Transports publish messages and manage subscriptions.
pub mod transport;

pub use handler::MessageHandler;
pub use message::{Message, subscription_id};
pub use subscription_handler::{SubscriptionHandler, SubscriptionHandlerError};
pub use transport::{Transport, TransportError, TransportErrorKind};
