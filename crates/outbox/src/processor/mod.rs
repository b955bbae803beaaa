mod error;

use crate::store::OutboxStore;
use crate::types::MessageTypes;
pub use error::Error;

use std::num::NonZeroUsize;
use std::time::Duration;

use chrono::Utc;
use courier_messaging::Transport;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Default number of rows relayed per tick.
pub const DEFAULT_BATCH_SIZE: NonZeroUsize = NonZeroUsize::new(20).unwrap();

/// Default time between ticks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Options for an [`OutboxProcessor`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OutboxProcessorOptions {
    /// Maximum number of rows relayed per tick.
    pub batch_size: NonZeroUsize,

    /// Time between ticks.
    pub poll_interval: Duration,
}

impl Default for OutboxProcessorOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// What one tick did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProcessReport {
    /// Rows read from the store.
    pub fetched: usize,

    /// Rows handed to the broker and marked processed.
    pub processed: usize,

    /// Rows left pending because replay or marking failed.
    pub failed: usize,
}

/// Relays pending outbox rows to the broker on a timer.
///
/// Rows are handed to `transport`, which must be the real broker transport
/// and not an [`OutboxTransport`](crate::OutboxTransport) with the outbox
/// enabled, or rows would be re-recorded instead of sent. A row that fails is
/// left pending and retried on every later tick.
///
/// Only one processor should run against a given store: rows are not claimed,
/// so two processors may both publish the same row.
#[derive(Clone, Debug)]
pub struct OutboxProcessor<Tr, St>
where
    Tr: Transport,
    St: OutboxStore,
{
    options: OutboxProcessorOptions,
    store: St,
    transport: Tr,
    types: MessageTypes<Tr>,
}

impl<Tr, St> OutboxProcessor<Tr, St>
where
    Tr: Transport,
    St: OutboxStore,
{
    /// Creates a processor relaying rows of the registered `types` from
    /// `store` through `transport`.
    pub const fn new(
        transport: Tr,
        store: St,
        types: MessageTypes<Tr>,
        options: OutboxProcessorOptions,
    ) -> Self {
        Self {
            options,
            store,
            transport,
            types,
        }
    }

    /// Relays one batch of pending rows, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error only if the pending rows cannot be read. Per-row
    /// failures are logged, counted in the report and leave the row pending.
    pub async fn process_pending(&self) -> Result<ProcessReport, Error<St::Error>> {
        let pending = self
            .store
            .fetch_unprocessed(self.options.batch_size.get())
            .await
            .map_err(Error::Fetch)?;

        let mut report = ProcessReport {
            fetched: pending.len(),
            ..ProcessReport::default()
        };

        for message in pending {
            let message_id = message.id();

            if message.is_processed() {
                debug!(%message_id, "skipping already processed outbox message");
                continue;
            }

            if let Err(e) = self.types.replay(&self.transport, &message).await {
                error!(
                    %message_id,
                    subscription = message.subscription(),
                    message_type = message.message_type(),
                    "failed to relay outbox message: {}",
                    e
                );
                report.failed += 1;
                continue;
            }

            match self.store.mark_processed(message_id, Utc::now()).await {
                Ok(true) => {
                    debug!(%message_id, subscription = message.subscription(), "outbox message relayed");
                    report.processed += 1;
                }
                Ok(false) => {
                    debug!(%message_id, "outbox message was already marked processed");
                    report.processed += 1;
                }
                Err(e) => {
                    error!(%message_id, "failed to mark outbox message processed: {}", e);
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    /// Runs ticks until `shutdown` is cancelled. An in-flight tick is
    /// abandoned on cancellation; its row stays pending if it was not yet
    /// marked.
    pub async fn run(&self, shutdown: CancellationToken) {
        let mut ticker = interval(self.options.poll_interval.max(MIN_POLL_INTERVAL));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            batch_size = self.options.batch_size.get(),
            poll_interval = ?self.options.poll_interval,
            "outbox processor started"
        );

        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    tokio::select! {
                        biased;
                        () = shutdown.cancelled() => break,
                        result = self.process_pending() => match result {
                            Ok(report) if report.fetched > 0 => {
                                debug!(
                                    fetched = report.fetched,
                                    processed = report.processed,
                                    failed = report.failed,
                                    "outbox tick complete"
                                );
                            }
                            Ok(_) => {}
                            Err(e) => error!("outbox tick failed: {}", e),
                        },
                    }
                }
            }
        }

        info!("outbox processor stopped");
    }

    /// Runs the processor on the Tokio runtime until `shutdown` is cancelled.
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(shutdown).await })
    }
}
