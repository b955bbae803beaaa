//! CLI binary to run a messaging node locally against a broker.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::redundant_pub_crate)]

use std::convert::Infallible;

use async_trait::async_trait;
use clap::Parser;
use courier_client::{ClientTransport, MessageClient, MessageClientOptions};
use courier_handlers::{FromContext, HandlerRegistry};
use courier_messaging::{Message, MessageHandler, Transport, subscription_id};
use courier_messaging_nats::NatsTransport;
use courier_outbox::MessageTypes;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// CLI-specific error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Client setup error
    #[error(transparent)]
    Client(#[from] courier_client::Error),

    /// Publishing the requested event failed
    #[error("failed to publish: {0}")]
    Publish(String),

    /// Handler registration error
    #[error(transparent)]
    Registry(#[from] courier_handlers::Error),
}

#[derive(Clone, Debug, Parser)]
#[command(version, about, long_about = None)]
struct Args {
    #[command(flatten)]
    options: MessageClientOptions,

    /// Publish a `UserDeleted` event for this user id after start-up
    #[arg(long, env = "COURIER_PUBLISH_USER_DELETED")]
    publish_user_deleted: Option<String>,
}

/// Emitted by the users service when an account is removed.
#[derive(Clone, Debug, Deserialize, Serialize)]
struct UserDeleted {
    user_id: String,
}

impl Message for UserDeleted {}

/// Dependencies available to handlers in the local node.
#[derive(Debug)]
struct LocalContext {
    node_name: String,
}

/// Logs every `UserDeleted` event it receives.
struct UserDeletedLogger {
    node_name: String,
}

impl FromContext<LocalContext> for UserDeletedLogger {
    type Error = Infallible;

    fn from_context(context: &LocalContext) -> Result<Self, Self::Error> {
        Ok(Self {
            node_name: context.node_name.clone(),
        })
    }
}

#[async_trait]
impl MessageHandler<UserDeleted> for UserDeletedLogger {
    type Error = Infallible;

    async fn handle(
        &self,
        message: UserDeleted,
        _cancellation: CancellationToken,
    ) -> Result<(), Self::Error> {
        info!(node = %self.node_name, user_id = %message.user_id, "user deleted");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let mut types = MessageTypes::<NatsTransport>::new();
    types.register::<UserDeleted>();

    let client = MessageClient::connect(args.options, types).await?;

    let mut registry = HandlerRegistry::<LocalContext, ClientTransport<NatsTransport>>::new();
    registry.register::<UserDeleted, UserDeletedLogger>()?;

    let context = LocalContext {
        node_name: "courier-local".to_string(),
    };
    let report = client.register_handlers(&registry, &context).await;
    for skipped in &report.skipped {
        warn!(handler = skipped.handler, "handler not running: {}", skipped.error);
    }

    if let Some(user_id) = args.publish_user_deleted {
        let subscription = subscription_id::<UserDeleted>(&client.options().subscription_prefix);

        client
            .transport()
            .publish(&subscription, UserDeleted { user_id })
            .await
            .map_err(|e| Error::Publish(e.to_string()))?;

        info!(%subscription, "published UserDeleted");
    }

    // Create shared shutdown token
    let shutdown_token = CancellationToken::new();

    // Set up signal handlers
    let signal_shutdown_token = shutdown_token.clone();
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};

            match (
                signal(SignalKind::terminate()),
                signal(SignalKind::interrupt()),
            ) {
                (Ok(mut sigterm), Ok(mut sigint)) => {
                    tokio::select! {
                        _ = sigterm.recv() => info!("Received SIGTERM"),
                        _ = sigint.recv() => info!("Received SIGINT"),
                    }
                }
                _ => {
                    error!("failed to install signal handlers, falling back to ctrl-c");
                    let _ = tokio::signal::ctrl_c().await;
                }
            }
        }

        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
            info!("Received interrupt signal");
        }

        info!("Shutting down");
        signal_shutdown_token.cancel();
    });

    shutdown_token.cancelled().await;

    registry.shutdown();
    client.shutdown().await;

    Ok(())
}
