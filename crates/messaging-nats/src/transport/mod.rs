mod error;

pub use error::Error;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_nats::{Client, Subscriber};
use async_trait::async_trait;
use bytes::Bytes;
use courier_messaging::{Message, SubscriptionHandler, Transport};
use futures::StreamExt;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, warn};

/// How long a publish may wait for the server before failing.
pub const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(10);

/// A transport backed by core NATS publish/subscribe.
///
/// Every message is flushed to the server before `publish` returns, so a
/// successful publish means the server has the bytes.
#[derive(Clone, Debug)]
pub struct NatsTransport {
    client: Client,
    publish_timeout: Duration,
    subscriptions: Arc<Mutex<HashMap<String, CancellationToken>>>,
    task_tracker: TaskTracker,
}

impl NatsTransport {
    /// Wraps an existing NATS client.
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self {
            client,
            publish_timeout: DEFAULT_PUBLISH_TIMEOUT,
            subscriptions: Arc::new(Mutex::new(HashMap::new())),
            task_tracker: TaskTracker::new(),
        }
    }

    /// Connects to the NATS server(s) named by `connection_string`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connect`] if the server cannot be reached.
    pub async fn connect(connection_string: &str) -> Result<Self, Error> {
        let client = async_nats::connect(connection_string)
            .await
            .map_err(|e| Error::Connect(e.to_string()))?;

        debug!(%connection_string, "connected to nats");

        Ok(Self::new(client))
    }

    /// Overrides how long a publish may take.
    #[must_use]
    pub const fn with_publish_timeout(mut self, publish_timeout: Duration) -> Self {
        self.publish_timeout = publish_timeout;
        self
    }

    /// Whether `subscription` is currently registered on this transport.
    pub async fn is_subscribed(&self, subscription: &str) -> bool {
        self.subscriptions.lock().await.contains_key(subscription)
    }

    async fn deliver<T, X>(
        subscription: String,
        mut subscriber: Subscriber,
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
                    break;
                }
                message = subscriber.next() => {
                    let Some(message) = message else {
                        debug!(%subscription, "subscriber closed, exiting delivery loop");
                        return;
                    };

                    match serde_json::from_slice::<T>(&message.payload) {
                        Ok(message) => {
                            if let Err(e) = handler.handle(subscription.clone(), message).await {
                                error!(%subscription, "error handling message: {}", e);
                            }
                        }
                        Err(e) => {
                            error!(%subscription, "failed to decode message: {}", e);
                        }
                    }
                }
            }
        }

        if let Err(e) = subscriber.unsubscribe().await {
            warn!(%subscription, "failed to unsubscribe from server: {}", e);
        }
    }
}

/// Checks that `subject` is a literal subject: dot-separated, non-empty
/// tokens without whitespace or wildcards.
fn validate_subject(subject: &str) -> Result<(), Error> {
    let invalid = subject.is_empty()
        || subject.split('.').any(|token| {
            token.is_empty()
                || token.contains(['*', '>'])
                || token.chars().any(char::is_whitespace)
        });

    if invalid {
        Err(Error::InvalidSubscription)
    } else {
        Ok(())
    }
}

#[async_trait]
impl Transport for NatsTransport {
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

        let subscriber = self
            .client
            .subscribe(subscription.to_string())
            .await
            .map_err(|e| Error::Subscribe(e.to_string()))?;

        let shutdown_token = CancellationToken::new();

        self.task_tracker.spawn(Self::deliver::<T, X>(
            subscription.to_string(),
            subscriber,
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

        let payload = Bytes::from(serde_json::to_vec(&message).map_err(Error::Serialize)?);

        let send = async {
            self.client
                .publish(subscription.to_string(), payload)
                .await
                .map_err(|e| Error::Publish(e.kind()))?;

            self.client
                .flush()
                .await
                .map_err(|e| Error::Flush(e.to_string()))
        };

        timeout(self.publish_timeout, send)
            .await
            .map_err(|_| Error::Timeout(self.publish_timeout))?
    }

    async fn unsubscribe(&self, subscription: &str) -> Result<(), Self::Error> {
        if let Some(token) = self.subscriptions.lock().await.remove(subscription) {
            token.cancel();
            debug!(%subscription, "unsubscribed");
        }

        Ok(())
    }

    fn check_subscription(&self, subscription: &str) -> Result<(), Self::Error> {
        validate_subject(subscription)
    }

    async fn shutdown(&self) {
        for (_, token) in self.subscriptions.lock().await.drain() {
            token.cancel();
        }

        self.task_tracker.close();
        self.task_tracker.wait().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::fmt;

    use courier_messaging::{SubscriptionHandlerError, TransportError, TransportErrorKind};
    use serde::{Deserialize, Serialize};
    use serial_test::serial;
    use tokio::sync::mpsc;

    #[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
    struct UserDeleted {
        user_id: String,
    }

    impl Message for UserDeleted {}

    #[derive(Clone, Debug)]
    struct TestSubscriptionHandler {
        sender: mpsc::Sender<UserDeleted>,
    }

    #[derive(Debug, Clone)]
    struct TestSubscriptionHandlerError;

    impl fmt::Display for TestSubscriptionHandlerError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "TestSubscriptionHandlerError")
        }
    }

    impl std::error::Error for TestSubscriptionHandlerError {}

    impl SubscriptionHandlerError for TestSubscriptionHandlerError {}

    #[async_trait]
    impl SubscriptionHandler<UserDeleted> for TestSubscriptionHandler {
        type Error = TestSubscriptionHandlerError;

        async fn handle(
            &self,
            _subscription: String,
            message: UserDeleted,
        ) -> Result<(), Self::Error> {
            self.sender
                .send(message)
                .await
                .map_err(|_| TestSubscriptionHandlerError)
        }
    }

    fn nats_url() -> String {
        std::env::var("NATS_URL").unwrap_or_else(|_| "nats://127.0.0.1:4222".to_string())
    }

    #[test]
    fn test_validate_subject() {
        assert!(validate_subject("UserDeleted").is_ok());
        assert!(validate_subject("listings_UserDeleted").is_ok());
        assert!(validate_subject("users.deleted").is_ok());

        assert!(validate_subject("").is_err());
        assert!(validate_subject("user deleted").is_err());
        assert!(validate_subject("users.*").is_err());
        assert!(validate_subject("users.>").is_err());
        assert!(validate_subject("users..deleted").is_err());
        assert!(validate_subject(".users").is_err());
        assert!(validate_subject("users.").is_err());
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            Error::InvalidSubscription.kind(),
            TransportErrorKind::InvalidSubscription
        );
        assert_eq!(
            Error::DuplicateSubscription("x".to_string()).kind(),
            TransportErrorKind::DuplicateSubscription
        );
        assert_eq!(
            Error::Timeout(DEFAULT_PUBLISH_TIMEOUT).kind(),
            TransportErrorKind::TransportFailure
        );
    }

    #[tokio::test]
    #[ignore = "requires a running NATS server at NATS_URL"]
    #[serial]
    async fn test_publish_and_subscribe() {
        let transport = NatsTransport::connect(&nats_url()).await.unwrap();
        let (sender, mut receiver) = mpsc::channel(10);

        transport
            .subscribe::<UserDeleted, _>(
                "courier_test_UserDeleted",
                TestSubscriptionHandler { sender },
            )
            .await
            .unwrap();

        transport
            .publish(
                "courier_test_UserDeleted",
                UserDeleted {
                    user_id: "u1".to_string(),
                },
            )
            .await
            .unwrap();

        let received = timeout(Duration::from_secs(5), receiver.recv())
            .await
            .unwrap();
        assert_eq!(
            received,
            Some(UserDeleted {
                user_id: "u1".to_string()
            })
        );

        transport.shutdown().await;
    }

    #[tokio::test]
    #[ignore = "requires a running NATS server at NATS_URL"]
    #[serial]
    async fn test_duplicate_subscription_rejected() {
        let transport = NatsTransport::connect(&nats_url()).await.unwrap();
        let (sender, _receiver) = mpsc::channel(10);
        let handler = TestSubscriptionHandler { sender };

        transport
            .subscribe::<UserDeleted, _>("courier_test_duplicate", handler.clone())
            .await
            .unwrap();

        let err = transport
            .subscribe::<UserDeleted, _>("courier_test_duplicate", handler)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), TransportErrorKind::DuplicateSubscription);

        transport.unsubscribe("courier_test_duplicate").await.unwrap();
        transport.unsubscribe("courier_test_duplicate").await.unwrap();
        assert!(!transport.is_subscribed("courier_test_duplicate").await);
    }

    #[tokio::test]
    async fn test_connect_failure() {
        let err = NatsTransport::connect("nats://127.0.0.1:1").await.unwrap_err();
        assert_eq!(err.kind(), TransportErrorKind::TransportFailure);
    }
}
