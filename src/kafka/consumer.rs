use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::message::BorrowedMessage;
use rdkafka::types::RDKafkaErrorCode;
use rdkafka::ClientConfig;
use rdkafka::Message;
use tokio::sync::watch;
use tokio::time::{sleep, timeout, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::kafka::context::PipelineConsumerContext;
use crate::kafka::message::MessageProcessor;
use crate::kafka::rebalance_handler::RebalanceHandler;
use crate::metrics_const::{MESSAGES_CONSUMED_COUNTER, TRANSIENT_RETRIES_COUNTER};
use crate::store_manager::StoreManager;

const INITIAL_RETRY_BACKOFF: Duration = Duration::from_millis(100);
const MAX_RETRY_BACKOFF: Duration = Duration::from_secs(5);

/// Wait out a retry backoff unless shutdown arrives first.
///
/// Returns `false` when the wait was cut short by shutdown (a dropped
/// sender counts as shutdown).
async fn backoff_or_shutdown(backoff: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    if *shutdown.borrow() {
        return false;
    }
    tokio::select! {
        _ = shutdown.changed() => false,
        _ = sleep(backoff) => true,
    }
}

/// Stream consumer that drives the pipeline one record at a time per
/// partition and commits offsets only behind a state flush.
///
/// There is no parallelism within a partition: records are processed in
/// arrival order, which the dedup store's check-then-set relies on.
pub struct StreamPipelineConsumer<P: MessageProcessor> {
    consumer: StreamConsumer<PipelineConsumerContext>,
    processor: Arc<P>,
    stores: Arc<StoreManager>,
    commit_interval: Duration,
    poll_timeout: Duration,
    shutdown_rx: watch::Receiver<bool>,
}

impl<P: MessageProcessor> StreamPipelineConsumer<P> {
    pub fn from_config(
        config: &ClientConfig,
        rebalance_handler: Arc<dyn RebalanceHandler>,
        processor: P,
        stores: Arc<StoreManager>,
        commit_interval: Duration,
        poll_timeout: Duration,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Result<Self> {
        let context = PipelineConsumerContext::new(rebalance_handler);
        let consumer: StreamConsumer<PipelineConsumerContext> = config
            .create_with_context(context)
            .context("Failed to create Kafka stream consumer")?;

        Ok(Self {
            consumer,
            processor: Arc::new(processor),
            stores,
            commit_interval,
            poll_timeout,
            shutdown_rx,
        })
    }

    pub fn inner_consumer(&self) -> &StreamConsumer<PipelineConsumerContext> {
        &self.consumer
    }

    /// Consume until shutdown, committing offsets behind a store flush at
    /// every commit tick and once more on the way out.
    pub async fn start_consumption(mut self) -> Result<()> {
        info!("Starting event stream consumption");

        let mut commit_tick = tokio::time::interval(self.commit_interval);
        commit_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // Separate receiver for retry waits; each clone tracks what it has
        // seen, so a signal observed mid-retry still breaks the main loop.
        let mut retry_shutdown = self.shutdown_rx.clone();

        loop {
            tokio::select! {
                _ = self.shutdown_rx.changed() => {
                    info!("Shutdown signal received, starting graceful shutdown");
                    break;
                }

                msg_result = timeout(self.poll_timeout, self.consumer.recv()) => {
                    match msg_result {
                        Ok(Ok(msg)) => {
                            self.handle_message(msg, &mut retry_shutdown).await?;
                        }
                        Ok(Err(e)) => {
                            error!("Error receiving message: {e}");
                            sleep(Duration::from_millis(100)).await;
                        }
                        Err(_) => {
                            debug!("Consumer poll timeout");
                        }
                    }
                }

                _ = commit_tick.tick() => {
                    if let Err(e) = self.commit_offsets() {
                        error!("Failed to commit offsets: {e:#}");
                    }
                }
            }
        }

        if let Err(e) = self.commit_offsets() {
            error!("Failed to commit final offsets: {e:#}");
        } else {
            info!("Final offsets committed");
        }
        self.stores.shutdown();

        info!("Graceful shutdown completed");
        Ok(())
    }

    /// Process one message to completion, retrying transient failures with
    /// capped exponential backoff. The retry loop blocks this partition's
    /// consumption, back-pressuring upstream instead of guessing whether an
    /// unclassifiable record is new or duplicate.
    ///
    /// Shutdown interrupts the backoff wait: the message's offset stays
    /// unstored and the record replays after restart.
    async fn handle_message(
        &self,
        msg: BorrowedMessage<'_>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<()> {
        metrics::counter!(MESSAGES_CONSUMED_COUNTER).increment(1);

        let mut backoff = INITIAL_RETRY_BACKOFF;
        loop {
            match self.processor.process_message(&msg).await {
                Ok(outcome) => {
                    debug!(
                        "Processed message at {}:{} offset {}: {:?}",
                        msg.topic(),
                        msg.partition(),
                        msg.offset(),
                        outcome
                    );
                    self.consumer
                        .store_offset_from_message(&msg)
                        .context("Failed to store offset for processed message")?;
                    return Ok(());
                }
                Err(e) if e.is_data_quality() => {
                    // Processors swallow these into an outcome themselves;
                    // if one leaks, it is still a drop, not a retry.
                    warn!(
                        "Dropping record at {}:{} offset {}: {e}",
                        msg.topic(),
                        msg.partition(),
                        msg.offset()
                    );
                    self.consumer
                        .store_offset_from_message(&msg)
                        .context("Failed to store offset for dropped message")?;
                    return Ok(());
                }
                Err(e) => {
                    metrics::counter!(TRANSIENT_RETRIES_COUNTER).increment(1);
                    warn!(
                        "Transient failure at {}:{} offset {}: {e}; retrying in {:?}",
                        msg.topic(),
                        msg.partition(),
                        msg.offset(),
                        backoff
                    );
                    if !backoff_or_shutdown(backoff, shutdown).await {
                        info!(
                            "Shutdown during retry at {}:{} offset {}; leaving record for replay",
                            msg.topic(),
                            msg.partition(),
                            msg.offset()
                        );
                        return Ok(());
                    }
                    backoff = (backoff * 2).min(MAX_RETRY_BACKOFF);
                }
            }
        }
    }

    /// Commit barrier: dedup state reaches disk before the offsets that
    /// produced it are committed, so recovery replays from a point where
    /// state and offsets agree.
    fn commit_offsets(&self) -> Result<()> {
        self.stores.flush_all()?;
        match self.consumer.commit_consumer_state(CommitMode::Sync) {
            Ok(()) => Ok(()),
            // Nothing stored yet is not an error
            Err(KafkaError::ConsumerCommit(RDKafkaErrorCode::NoOffset)) => Ok(()),
            Err(e) => Err(e).context("Failed to commit consumer offsets"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn backoff_completes_when_no_shutdown_arrives() {
        let (_tx, mut rx) = watch::channel(false);
        assert!(backoff_or_shutdown(Duration::from_millis(10), &mut rx).await);
    }

    #[tokio::test]
    async fn shutdown_cuts_a_long_backoff_short() {
        let (tx, mut rx) = watch::channel(false);
        tx.send(true).unwrap();

        let start = std::time::Instant::now();
        assert!(!backoff_or_shutdown(Duration::from_secs(60), &mut rx).await);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn shutdown_during_the_wait_interrupts_it() {
        let (tx, mut rx) = watch::channel(false);
        tokio::spawn(async move {
            sleep(Duration::from_millis(10)).await;
            let _ = tx.send(true);
        });

        let start = std::time::Instant::now();
        assert!(!backoff_or_shutdown(Duration::from_secs(60), &mut rx).await);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn dropped_sender_counts_as_shutdown() {
        let (tx, mut rx) = watch::channel(false);
        drop(tx);
        assert!(!backoff_or_shutdown(Duration::from_secs(60), &mut rx).await);
    }
}
