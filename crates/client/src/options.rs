use std::fmt;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, ValueEnum};
use courier_outbox::{DEFAULT_BATCH_SIZE, OutboxProcessorOptions};

/// Which broker the client talks to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum MessagingProvider {
    /// NATS core publish/subscribe.
    #[default]
    Nats,

    /// Kafka. Accepted in configuration but not implemented.
    Kafka,
}

impl fmt::Display for MessagingProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nats => write!(f, "nats"),
            Self::Kafka => write!(f, "kafka"),
        }
    }
}

/// Start-up configuration of a [`MessageClient`](crate::MessageClient).
///
/// Usable as a clap argument group (`#[command(flatten)]`); every field can
/// also be set through its `COURIER_*` environment variable.
#[derive(Args, Clone, Debug, PartialEq, Eq)]
pub struct MessageClientOptions {
    /// Broker provider
    #[arg(long, value_enum, default_value_t = MessagingProvider::Nats, env = "COURIER_PROVIDER")]
    pub provider: MessagingProvider,

    /// Broker connection string
    #[arg(
        long,
        default_value = "nats://127.0.0.1:4222",
        env = "COURIER_CONNECTION_STRING"
    )]
    pub connection_string: String,

    /// Record publishes in the outbox and relay them in the background
    #[arg(long, env = "COURIER_USE_OUTBOX")]
    pub use_outbox: bool,

    /// Outbox database file
    #[arg(long, default_value = "outbox.db", env = "COURIER_OUTBOX_PATH")]
    pub outbox_path: PathBuf,

    /// Maximum outbox rows relayed per tick (at least 1)
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE, env = "COURIER_OUTBOX_BATCH_SIZE")]
    pub outbox_batch_size: NonZeroUsize,

    /// Seconds between outbox ticks
    #[arg(long, default_value_t = 5, env = "COURIER_OUTBOX_POLL_INTERVAL_SECS")]
    pub outbox_poll_interval_secs: u64,

    /// Prefix of handler subscription identifiers
    #[arg(long, default_value = "", env = "COURIER_SUBSCRIPTION_PREFIX")]
    pub subscription_prefix: String,

    /// Seconds a publish may wait for the broker
    #[arg(long, default_value_t = 10, env = "COURIER_PUBLISH_TIMEOUT_SECS")]
    pub publish_timeout_secs: u64,
}

impl Default for MessageClientOptions {
    fn default() -> Self {
        Self {
            provider: MessagingProvider::Nats,
            connection_string: "nats://127.0.0.1:4222".to_string(),
            use_outbox: false,
            outbox_path: PathBuf::from("outbox.db"),
            outbox_batch_size: DEFAULT_BATCH_SIZE,
            outbox_poll_interval_secs: 5,
            subscription_prefix: String::new(),
            publish_timeout_secs: 10,
        }
    }
}

impl MessageClientOptions {
    /// Processor settings derived from these options.
    #[must_use]
    pub const fn processor_options(&self) -> OutboxProcessorOptions {
        OutboxProcessorOptions {
            batch_size: self.outbox_batch_size,
            poll_interval: Duration::from_secs(self.outbox_poll_interval_secs),
        }
    }

    /// Publish timeout derived from these options.
    #[must_use]
    pub const fn publish_timeout(&self) -> Duration {
        Duration::from_secs(self.publish_timeout_secs)
    }
}
