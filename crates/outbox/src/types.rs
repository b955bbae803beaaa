use crate::message::OutboxMessage;

use std::collections::HashMap;
use std::fmt::{self, Debug};
use std::sync::Arc;

use courier_messaging::{Message, Transport, TransportError};
use futures::FutureExt;
use futures::future::BoxFuture;
use thiserror::Error;

/// Why a recorded message could not be handed back to the broker.
#[derive(Debug, Error)]
pub enum ReplayError<TE>
where
    TE: TransportError,
{
    /// No type is registered under the recorded type name.
    #[error("no message type registered as `{0}`")]
    UnresolvedType(String),

    /// The payload does not parse as the registered type.
    #[error("failed to deserialize payload: {0}")]
    Deserialize(serde_json::Error),

    /// The broker refused the message.
    #[error(transparent)]
    Transport(TE),
}

type Replayer<Tr> = Arc<
    dyn Fn(Tr, String, String) -> BoxFuture<'static, Result<(), ReplayError<<Tr as Transport>::Error>>>
        + Send
        + Sync,
>;

fn replay_as<T, Tr>(
    transport: Tr,
    subscription: String,
    payload: String,
) -> BoxFuture<'static, Result<(), ReplayError<Tr::Error>>>
where
    T: Message,
    Tr: Transport,
{
    async move {
        let message = T::from_json(&payload).map_err(ReplayError::Deserialize)?;

        transport
            .publish(&subscription, message)
            .await
            .map_err(ReplayError::Transport)
    }
    .boxed()
}

/// The message types an outbox processor knows how to replay.
///
/// Rows record only a type name and JSON text. Registering `T` here maps
/// `T::type_name()` to a routine that parses the text as `T` and publishes it,
/// so the processor can recover a typed value without runtime reflection.
pub struct MessageTypes<Tr>
where
    Tr: Transport,
{
    replayers: HashMap<&'static str, Replayer<Tr>>,
}

impl<Tr> Clone for MessageTypes<Tr>
where
    Tr: Transport,
{
    fn clone(&self) -> Self {
        Self {
            replayers: self.replayers.clone(),
        }
    }
}

impl<Tr> Debug for MessageTypes<Tr>
where
    Tr: Transport,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.replayers.keys()).finish()
    }
}

impl<Tr> Default for MessageTypes<Tr>
where
    Tr: Transport,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<Tr> MessageTypes<Tr>
where
    Tr: Transport,
{
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            replayers: HashMap::new(),
        }
    }

    /// Registers `T`. Registering the same type twice has no further effect.
    pub fn register<T>(&mut self) -> &mut Self
    where
        T: Message,
    {
        let replayer: Replayer<Tr> = Arc::new(replay_as::<T, Tr>);
        self.replayers.entry(T::type_name()).or_insert(replayer);
        self
    }

    /// Whether a type is registered under `type_name`.
    #[must_use]
    pub fn contains(&self, type_name: &str) -> bool {
        self.replayers.contains_key(type_name)
    }

    /// Number of registered types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.replayers.len()
    }

    /// Whether no types are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.replayers.is_empty()
    }

    /// Parses `message` as its recorded type and publishes it through
    /// `transport` to its recorded subscription.
    ///
    /// # Errors
    ///
    /// Returns [`ReplayError::UnresolvedType`] if the recorded type is not
    /// registered, [`ReplayError::Deserialize`] if the payload does not parse,
    /// and [`ReplayError::Transport`] if the publish fails.
    pub async fn replay(
        &self,
        transport: &Tr,
        message: &OutboxMessage,
    ) -> Result<(), ReplayError<Tr::Error>> {
        let replayer = self
            .replayers
            .get(message.message_type())
            .ok_or_else(|| ReplayError::UnresolvedType(message.message_type().to_string()))?;

        replayer(
            transport.clone(),
            message.subscription().to_string(),
            message.payload().to_string(),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::convert::Infallible;

    use async_trait::async_trait;
    use chrono::Utc;
    use courier_messaging::{SubscriptionHandler, SubscriptionHandlerError};
    use courier_messaging_memory::{MemoryBroker, MemoryTransport};
    use serde::{Deserialize, Serialize};
    use tokio::sync::mpsc;
    use tokio::time::{Duration, timeout};
    use uuid::Uuid;

    #[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
    struct OrderPlaced {
        order_id: u64,
    }

    impl Message for OrderPlaced {}

    #[derive(Clone, Debug, Deserialize, Serialize)]
    struct OrderCancelled {
        order_id: u64,
    }

    impl Message for OrderCancelled {}

    #[derive(Debug, thiserror::Error)]
    #[error(transparent)]
    struct ForwardError(Infallible);

    impl SubscriptionHandlerError for ForwardError {}

    #[derive(Clone, Debug)]
    struct Forward(mpsc::Sender<OrderPlaced>);

    #[async_trait]
    impl SubscriptionHandler<OrderPlaced> for Forward {
        type Error = ForwardError;

        async fn handle(
            &self,
            _subscription: String,
            message: OrderPlaced,
        ) -> Result<(), Self::Error> {
            let _ = self.0.send(message).await;
            Ok(())
        }
    }

    fn row(message_type: &str, payload: &str) -> OutboxMessage {
        OutboxMessage::from_parts(
            Uuid::new_v4(),
            "orders".to_string(),
            message_type.to_string(),
            payload.to_string(),
            Utc::now(),
            None,
        )
    }

    #[test]
    fn test_register() {
        let mut types = MessageTypes::<MemoryTransport>::new();
        assert!(types.is_empty());

        types.register::<OrderPlaced>().register::<OrderPlaced>();

        assert_eq!(types.len(), 1);
        assert!(types.contains(OrderPlaced::type_name()));
        assert!(!types.contains(OrderCancelled::type_name()));
    }

    #[tokio::test]
    async fn test_replay_publishes_typed_message() {
        let transport = MemoryBroker::new().connect();
        let (sender, mut receiver) = mpsc::channel(1);
        transport
            .subscribe::<OrderPlaced, _>("orders", Forward(sender))
            .await
            .unwrap();

        let mut types = MessageTypes::<MemoryTransport>::new();
        types.register::<OrderPlaced>();

        let message = OutboxMessage::new("orders", &OrderPlaced { order_id: 11 }).unwrap();
        types.replay(&transport, &message).await.unwrap();

        let received = timeout(Duration::from_secs(1), receiver.recv()).await.unwrap();
        assert_eq!(received, Some(OrderPlaced { order_id: 11 }));
    }

    #[tokio::test]
    async fn test_replay_unresolved_type() {
        let transport = MemoryBroker::new().connect();
        let types = MessageTypes::<MemoryTransport>::new();

        let err = types
            .replay(&transport, &row("some::Unknown", "{}"))
            .await
            .unwrap_err();

        assert!(matches!(err, ReplayError::UnresolvedType(name) if name == "some::Unknown"));
    }

    #[tokio::test]
    async fn test_replay_bad_payload() {
        let transport = MemoryBroker::new().connect();
        let mut types = MessageTypes::<MemoryTransport>::new();
        types.register::<OrderPlaced>();

        let err = types
            .replay(&transport, &row(OrderPlaced::type_name(), r#"{"order":"x"}"#))
            .await
            .unwrap_err();

        assert!(matches!(err, ReplayError::Deserialize(_)));
    }

    #[tokio::test]
    async fn test_replay_broker_down() {
        let broker = MemoryBroker::new();
        let transport = broker.connect();
        let mut types = MessageTypes::<MemoryTransport>::new();
        types.register::<OrderPlaced>();

        broker.set_available(false);
        let message = OutboxMessage::new("orders", &OrderPlaced { order_id: 1 }).unwrap();
        let err = types.replay(&transport, &message).await.unwrap_err();

        assert!(matches!(err, ReplayError::Transport(_)));
    }
}
