use std::error::Error as StdError;

use courier_messaging::TransportErrorKind;
use thiserror::Error;

pub(crate) type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Errors from registering or subscribing handlers.
#[derive(Debug, Error)]
pub enum Error {
    /// A handler is already registered for the message type.
    #[error("message type `{message_type}` is already handled by `{existing}`")]
    DuplicateMessageType {
        /// The message type being registered.
        message_type: &'static str,
        /// The handler already registered for it.
        existing: &'static str,
    },

    /// The handler could not be built from the context.
    #[error("failed to construct handler `{handler}`: {source}")]
    HandlerConstruction {
        /// The handler type.
        handler: &'static str,
        /// Why construction failed.
        source: BoxError,
    },

    /// The transport refused the subscription.
    #[error("failed to subscribe `{subscription}` ({kind}): {source}")]
    Subscribe {
        /// The subscription identifier.
        subscription: String,
        /// Classification of the transport failure.
        kind: TransportErrorKind,
        /// The transport error.
        source: BoxError,
    },
}

/// Error returned to the transport when a handler fails on a message.
#[derive(Debug, Error)]
#[error("message handler failed: {0}")]
pub struct HandlerFailed(pub(crate) BoxError);

impl courier_messaging::SubscriptionHandlerError for HandlerFailed {}
