//! Composition root for services: picks the broker driver, wraps it in the
//! outbox relay and starts the outbox processor, all from one set of options.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;
mod options;

pub use error::Error;
pub use options::{MessageClientOptions, MessagingProvider};

use courier_handlers::{HandlerRegistry, RegistrationReport};
use courier_messaging::Transport;
use courier_messaging_nats::NatsTransport;
use courier_outbox::{MessageTypes, OutboxProcessor, OutboxTransport};
use courier_outbox_libsql::LibsqlOutboxStore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// The transport handed to services: the broker driver behind the outbox relay.
pub type ClientTransport<Tr> = OutboxTransport<Tr, LibsqlOutboxStore>;

const IN_MEMORY_DATABASE: &str = ":memory:";

/// A configured connection to the messaging layer.
#[derive(Debug)]
pub struct MessageClient<Tr>
where
    Tr: Transport,
{
    options: MessageClientOptions,
    processor: Option<JoinHandle<()>>,
    shutdown_token: CancellationToken,
    transport: ClientTransport<Tr>,
}

impl MessageClient<NatsTransport> {
    /// Connects to the configured broker.
    ///
    /// `types` lists the message types the outbox processor may have to
    /// replay; it only matters when the outbox is enabled.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedProvider`] for providers without a driver,
    /// and an error if the broker or the outbox database cannot be reached.
    pub async fn connect(
        options: MessageClientOptions,
        types: MessageTypes<NatsTransport>,
    ) -> Result<Self, Error> {
        if options.provider != MessagingProvider::Nats {
            return Err(Error::UnsupportedProvider(options.provider));
        }

        let transport = NatsTransport::connect(&options.connection_string)
            .await?
            .with_publish_timeout(options.publish_timeout());

        Self::with_transport(transport, options, types).await
    }
}

impl<Tr> MessageClient<Tr>
where
    Tr: Transport,
{
    /// Builds a client around an already-connected broker transport.
    ///
    /// With the outbox enabled this opens the database at
    /// `options.outbox_path` and spawns the processor. Otherwise publishes go
    /// straight to `transport` and the store is an unused in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if the outbox database cannot be opened.
    pub async fn with_transport(
        transport: Tr,
        options: MessageClientOptions,
        types: MessageTypes<Tr>,
    ) -> Result<Self, Error> {
        let store = if options.use_outbox {
            LibsqlOutboxStore::connect(&options.outbox_path).await?
        } else {
            LibsqlOutboxStore::connect(IN_MEMORY_DATABASE).await?
        };

        let shutdown_token = CancellationToken::new();

        let processor = options.use_outbox.then(|| {
            OutboxProcessor::new(
                transport.clone(),
                store.clone(),
                types,
                options.processor_options(),
            )
            .spawn(shutdown_token.clone())
        });

        info!(
            provider = %options.provider,
            use_outbox = options.use_outbox,
            "message client ready"
        );

        Ok(Self {
            transport: OutboxTransport::new(transport, store, options.use_outbox),
            options,
            processor,
            shutdown_token,
        })
    }

    /// The transport services publish and subscribe through.
    pub const fn transport(&self) -> &ClientTransport<Tr> {
        &self.transport
    }

    /// The options the client was built with.
    pub const fn options(&self) -> &MessageClientOptions {
        &self.options
    }

    /// Subscribes every handler in `registry` under the configured
    /// subscription prefix.
    pub async fn register_handlers<C>(
        &self,
        registry: &HandlerRegistry<C, ClientTransport<Tr>>,
        context: &C,
    ) -> RegistrationReport
    where
        C: Send + Sync + 'static,
    {
        registry
            .subscribe_all(&self.transport, context, &self.options.subscription_prefix)
            .await
    }

    /// Stops the outbox processor, then cancels every subscription on the
    /// transport and waits for their delivery tasks to exit. Rows the
    /// processor had not relayed stay pending for the next start.
    pub async fn shutdown(self) {
        self.shutdown_token.cancel();

        if let Some(processor) = self.processor {
            if let Err(e) = processor.await {
                error!("outbox processor task failed: {}", e);
            }
        }

        self.transport.shutdown().await;

        info!("message client stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use async_trait::async_trait;
    use courier_handlers::FromContext;
    use courier_messaging::{Message, MessageHandler};
    use courier_messaging_memory::{MemoryBroker, MemoryTransport};
    use courier_outbox::OutboxStore;
    use serde::{Deserialize, Serialize};
    use tempfile::tempdir;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    #[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
    struct UserDeleted {
        user_id: String,
    }

    impl Message for UserDeleted {}

    #[derive(Clone, Debug)]
    struct Context {
        deleted: mpsc::Sender<String>,
    }

    struct UserDeletedHandler {
        deleted: mpsc::Sender<String>,
    }

    impl FromContext<Context> for UserDeletedHandler {
        type Error = std::convert::Infallible;

        fn from_context(context: &Context) -> Result<Self, Self::Error> {
            Ok(Self {
                deleted: context.deleted.clone(),
            })
        }
    }

    #[derive(Debug, thiserror::Error)]
    #[error("receiver gone")]
    struct ReceiverGone;

    #[async_trait]
    impl MessageHandler<UserDeleted> for UserDeletedHandler {
        type Error = ReceiverGone;

        async fn handle(
            &self,
            message: UserDeleted,
            _cancellation: CancellationToken,
        ) -> Result<(), Self::Error> {
            self.deleted
                .send(message.user_id)
                .await
                .map_err(|_| ReceiverGone)
        }
    }

    fn user_deleted(user_id: &str) -> UserDeleted {
        UserDeleted {
            user_id: user_id.to_string(),
        }
    }

    async fn client(
        broker: &MemoryBroker,
        options: MessageClientOptions,
    ) -> MessageClient<MemoryTransport> {
        let mut types = MessageTypes::<MemoryTransport>::new();
        types.register::<UserDeleted>();

        MessageClient::with_transport(broker.connect(), options, types)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_kafka_is_unsupported() {
        let options = MessageClientOptions {
            provider: MessagingProvider::Kafka,
            ..MessageClientOptions::default()
        };

        let err = MessageClient::connect(options, MessageTypes::new())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            Error::UnsupportedProvider(MessagingProvider::Kafka)
        ));
    }

    #[tokio::test]
    async fn test_direct_publish_reaches_registered_handler() {
        let broker = MemoryBroker::new();
        let users = client(
            &broker,
            MessageClientOptions {
                subscription_prefix: "listings".to_string(),
                ..MessageClientOptions::default()
            },
        )
        .await;

        let (deleted, mut received) = mpsc::channel(10);
        let mut registry = HandlerRegistry::<Context, ClientTransport<MemoryTransport>>::new();
        registry
            .register::<UserDeleted, UserDeletedHandler>()
            .unwrap();

        let report = users
            .register_handlers(&registry, &Context { deleted })
            .await;
        assert_eq!(report.subscribed, vec!["listings_UserDeleted"]);

        users
            .transport()
            .publish("listings_UserDeleted", user_deleted("u1"))
            .await
            .unwrap();

        let user_id = timeout(Duration::from_secs(1), received.recv())
            .await
            .unwrap();
        assert_eq!(user_id.as_deref(), Some("u1"));
        assert!(
            users
                .transport()
                .store()
                .fetch_unprocessed(10)
                .await
                .unwrap()
                .is_empty()
        );

        users.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_stops_handler_delivery() {
        let broker = MemoryBroker::new();
        let listings = client(&broker, MessageClientOptions::default()).await;

        let (deleted, mut received) = mpsc::channel(10);
        let mut registry = HandlerRegistry::<Context, ClientTransport<MemoryTransport>>::new();
        registry
            .register::<UserDeleted, UserDeletedHandler>()
            .unwrap();
        let report = listings
            .register_handlers(&registry, &Context { deleted })
            .await;
        assert_eq!(report.subscribed, vec!["UserDeleted"]);

        timeout(Duration::from_secs(1), listings.shutdown())
            .await
            .unwrap();

        broker
            .connect()
            .publish("UserDeleted", user_deleted("after-shutdown"))
            .await
            .unwrap();

        let delivered = timeout(Duration::from_millis(200), received.recv())
            .await
            .ok()
            .flatten();
        assert_eq!(delivered, None);
    }

    #[tokio::test]
    async fn test_outbox_publish_is_relayed_by_processor() {
        let dir = tempdir().unwrap();
        let broker = MemoryBroker::new();

        let listings = client(&broker, MessageClientOptions::default()).await;
        let (deleted, mut received) = mpsc::channel(10);
        let mut registry = HandlerRegistry::<Context, ClientTransport<MemoryTransport>>::new();
        registry
            .register::<UserDeleted, UserDeletedHandler>()
            .unwrap();
        listings
            .register_handlers(&registry, &Context { deleted })
            .await;

        let users = client(
            &broker,
            MessageClientOptions {
                use_outbox: true,
                outbox_path: dir.path().join("outbox.db"),
                outbox_poll_interval_secs: 1,
                ..MessageClientOptions::default()
            },
        )
        .await;
        assert!(users.transport().is_outbox_enabled());

        users
            .transport()
            .publish("UserDeleted", user_deleted("u2"))
            .await
            .unwrap();

        let user_id = timeout(Duration::from_secs(5), received.recv())
            .await
            .unwrap();
        assert_eq!(user_id.as_deref(), Some("u2"));

        users.shutdown().await;
        listings.shutdown().await;
    }

    #[tokio::test]
    async fn test_pending_rows_survive_restart() {
        let dir = tempdir().unwrap();
        let broker = MemoryBroker::new();
        let options = MessageClientOptions {
            use_outbox: true,
            outbox_path: dir.path().join("outbox.db"),
            outbox_poll_interval_secs: 1,
            ..MessageClientOptions::default()
        };

        broker.set_available(false);
        let users = client(&broker, options.clone()).await;
        users
            .transport()
            .publish("UserDeleted", user_deleted("u3"))
            .await
            .unwrap();
        users.shutdown().await;

        let (deleted, mut received) = mpsc::channel(10);
        let listings = client(&broker, MessageClientOptions::default()).await;
        let mut registry = HandlerRegistry::<Context, ClientTransport<MemoryTransport>>::new();
        registry
            .register::<UserDeleted, UserDeletedHandler>()
            .unwrap();
        listings
            .register_handlers(&registry, &Context { deleted })
            .await;

        broker.set_available(true);
        let restarted = client(&broker, options).await;

        let user_id = timeout(Duration::from_secs(5), received.recv())
            .await
            .unwrap();
        assert_eq!(user_id.as_deref(), Some("u3"));

        restarted.shutdown().await;
        listings.shutdown().await;
    }
}
