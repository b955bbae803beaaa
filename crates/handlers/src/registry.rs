use crate::context::FromContext;
use crate::error::{BoxError, Error};
use crate::subscription::HandlerSubscription;

use std::fmt::{self, Debug};

use courier_messaging::{Message, MessageHandler, Transport, TransportError, subscription_id};
use futures::FutureExt;
use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

type Subscribe<C, Tr> = Box<
    dyn Fn(
            &C,
            Tr,
            String,
            CancellationToken,
        ) -> Result<BoxFuture<'static, Result<(), <Tr as Transport>::Error>>, BoxError>
        + Send
        + Sync,
>;

fn subscribe_as<T, H, C, Tr>(
    context: &C,
    transport: Tr,
    subscription: String,
    cancellation: CancellationToken,
) -> Result<BoxFuture<'static, Result<(), Tr::Error>>, BoxError>
where
    T: Message,
    H: MessageHandler<T> + FromContext<C>,
    Tr: Transport,
{
    let handler = H::from_context(context).map_err(|e| Box::new(e) as BoxError)?;
    let subscription_handler = HandlerSubscription::<T, H>::new(handler, cancellation);

    Ok(async move {
        transport
            .subscribe::<T, _>(&subscription, subscription_handler)
            .await
    }
    .boxed())
}

struct Registration<C, Tr>
where
    Tr: Transport,
{
    handler: &'static str,
    message_type: &'static str,
    subscription_id: fn(&str) -> String,
    subscribe: Subscribe<C, Tr>,
}

/// A handler that [`HandlerRegistry::subscribe_all`] did not subscribe.
#[derive(Debug)]
pub struct SkippedHandler {
    /// The handler type.
    pub handler: &'static str,

    /// The message type it handles.
    pub message_type: &'static str,

    /// Why it was skipped.
    pub error: Error,
}

/// Outcome of [`HandlerRegistry::subscribe_all`].
#[derive(Debug, Default)]
pub struct RegistrationReport {
    /// Subscription identifiers now served by a handler, in registration order.
    pub subscribed: Vec<String>,

    /// Handlers that were not subscribed.
    pub skipped: Vec<SkippedHandler>,
}

/// The table of message handlers a service runs.
///
/// Each entry pairs a message type with the handler type that consumes it.
/// At start-up [`subscribe_all`](Self::subscribe_all) builds every handler
/// from the application context and subscribes it under
/// [`subscription_id`] of its message type. A message type can have at most
/// one handler in a registry.
pub struct HandlerRegistry<C, Tr>
where
    Tr: Transport,
{
    cancellation: CancellationToken,
    registrations: Vec<Registration<C, Tr>>,
}

impl<C, Tr> Debug for HandlerRegistry<C, Tr>
where
    Tr: Transport,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field(
                "registrations",
                &self
                    .registrations
                    .iter()
                    .map(|registration| (registration.message_type, registration.handler))
                    .collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

impl<C, Tr> Default for HandlerRegistry<C, Tr>
where
    C: Send + Sync + 'static,
    Tr: Transport,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<C, Tr> HandlerRegistry<C, Tr>
where
    C: Send + Sync + 'static,
    Tr: Transport,
{
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            cancellation: CancellationToken::new(),
            registrations: Vec::new(),
        }
    }

    /// Adds handler `H` for messages of type `T`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateMessageType`] if `T` already has a handler.
    pub fn register<T, H>(&mut self) -> Result<&mut Self, Error>
    where
        T: Message,
        H: MessageHandler<T> + FromContext<C>,
    {
        if let Some(existing) = self
            .registrations
            .iter()
            .find(|registration| registration.message_type == T::type_name())
        {
            return Err(Error::DuplicateMessageType {
                message_type: T::type_name(),
                existing: existing.handler,
            });
        }

        self.registrations.push(Registration {
            handler: std::any::type_name::<H>(),
            message_type: T::type_name(),
            subscription_id: subscription_id::<T>,
            subscribe: Box::new(subscribe_as::<T, H, C, Tr>),
        });

        Ok(self)
    }

    /// Number of registered handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    /// Whether no handlers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// Subscription identifiers the registered handlers will use under `prefix`.
    #[must_use]
    pub fn subscription_ids(&self, prefix: &str) -> Vec<String> {
        self.registrations
            .iter()
            .map(|registration| (registration.subscription_id)(prefix))
            .collect()
    }

    /// The token handed to every running handler. It fires on [`shutdown`](Self::shutdown).
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// Builds every registered handler from `context` and subscribes it on
    /// `transport`.
    ///
    /// A handler that cannot be built or subscribed is logged and skipped;
    /// the others are still subscribed.
    pub async fn subscribe_all(&self, transport: &Tr, context: &C, prefix: &str) -> RegistrationReport {
        let mut report = RegistrationReport::default();

        for registration in &self.registrations {
            let subscription = (registration.subscription_id)(prefix);

            let subscribe = match (registration.subscribe)(
                context,
                transport.clone(),
                subscription.clone(),
                self.cancellation.clone(),
            ) {
                Ok(subscribe) => subscribe,
                Err(source) => {
                    error!(
                        handler = registration.handler,
                        message_type = registration.message_type,
                        "failed to construct handler: {}",
                        source
                    );
                    report.skipped.push(SkippedHandler {
                        handler: registration.handler,
                        message_type: registration.message_type,
                        error: Error::HandlerConstruction {
                            handler: registration.handler,
                            source,
                        },
                    });
                    continue;
                }
            };

            match subscribe.await {
                Ok(()) => {
                    info!(%subscription, handler = registration.handler, "handler subscribed");
                    report.subscribed.push(subscription);
                }
                Err(e) => {
                    error!(
                        %subscription,
                        handler = registration.handler,
                        "failed to subscribe handler: {}",
                        e
                    );
                    report.skipped.push(SkippedHandler {
                        handler: registration.handler,
                        message_type: registration.message_type,
                        error: Error::Subscribe {
                            subscription,
                            kind: e.kind(),
                            source: Box::new(e),
                        },
                    });
                }
            }
        }

        report
    }

    /// Signals every running handler to stop via its cancellation token.
    pub fn shutdown(&self) {
        self.cancellation.cancel();
    }
}
