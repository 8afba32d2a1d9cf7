use std::sync::Arc;

use anyhow::{Context, Result};
use rdkafka::consumer::Consumer;
use tokio::sync::watch;
use tracing::{error, info};

use crate::{
    config::Config,
    kafka::{RebalanceHandler, StreamPipelineConsumer},
    processor::{EventPipeline, PipelineConfig},
    store_manager::StoreManager,
};

/// The main service: wires configuration into the consumer, producer and
/// store manager, and drives the run/shutdown lifecycle.
pub struct WinevtDeduplicatorService {
    config: Config,
    consumer: Option<StreamPipelineConsumer<EventPipeline>>,
    stores: Arc<StoreManager>,
    shutdown_tx: Option<watch::Sender<bool>>,
}

impl WinevtDeduplicatorService {
    pub fn new(config: Config) -> Result<Self> {
        config.validate().with_context(|| {
            format!(
                "Configuration validation failed for consumer topic '{}' and group '{}'",
                config.kafka_consumer_topic, config.kafka_consumer_group
            )
        })?;

        let stores = Arc::new(StoreManager::new(config.store_path_buf()));

        Ok(Self {
            config,
            consumer: None,
            stores,
            shutdown_tx: None,
        })
    }

    /// Initialize the Kafka consumer and pipeline, and subscribe.
    pub fn initialize(&mut self) -> Result<()> {
        if self.consumer.is_some() {
            return Err(anyhow::anyhow!("Service already initialized"));
        }

        let pipeline_config = PipelineConfig {
            output_topic: self.config.kafka_output_topic.clone(),
            producer_send_timeout: self.config.producer_send_timeout(),
        };
        let pipeline = EventPipeline::new(
            pipeline_config,
            &self.config.build_producer_config(),
            self.stores.clone(),
        )
        .with_context(|| {
            format!(
                "Failed to create event pipeline publishing to '{}'",
                self.config.kafka_output_topic
            )
        })?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        self.shutdown_tx = Some(shutdown_tx);

        // The store manager doubles as the rebalance handler: revocation
        // flushes and releases the revoked partitions' stores.
        let rebalance_handler: Arc<dyn RebalanceHandler> = self.stores.clone();

        let consumer = StreamPipelineConsumer::from_config(
            &self.config.consumer_client_config(),
            rebalance_handler,
            pipeline,
            self.stores.clone(),
            self.config.commit_interval(),
            self.config.poll_timeout(),
            shutdown_rx,
        )
        .with_context(|| {
            format!(
                "Failed to create Kafka consumer for topic '{}' with group '{}'",
                self.config.kafka_consumer_topic, self.config.kafka_consumer_group
            )
        })?;

        consumer
            .inner_consumer()
            .subscribe(&[&self.config.kafka_consumer_topic])
            .with_context(|| {
                format!(
                    "Failed to subscribe to input topic '{}'",
                    self.config.kafka_consumer_topic
                )
            })?;

        info!(
            "Initialized consumer for topic '{}', publishing to '{}'",
            self.config.kafka_consumer_topic, self.config.kafka_output_topic
        );

        self.consumer = Some(consumer);
        Ok(())
    }

    /// Run until ctrl-c (blocking until shutdown completes).
    pub async fn run(self) -> Result<()> {
        self.run_with_shutdown(async {
            tokio::signal::ctrl_c()
                .await
                .expect("Failed to listen for ctrl+c signal");
        })
        .await
    }

    /// Run with a custom shutdown signal (useful for testing).
    pub async fn run_with_shutdown(
        mut self,
        shutdown_signal: impl std::future::Future<Output = ()>,
    ) -> Result<()> {
        if self.consumer.is_none() {
            self.initialize()?;
        }

        let consumer = self
            .consumer
            .take()
            .ok_or_else(|| anyhow::anyhow!("Consumer not initialized"))?;

        info!("Starting winevt deduplicator service");

        let consumer_handle = tokio::spawn(async move { consumer.start_consumption().await });

        shutdown_signal.await;

        info!("Received shutdown signal, shutting down gracefully...");

        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(true);
        }

        match tokio::time::timeout(self.config.shutdown_timeout(), consumer_handle).await {
            Ok(Ok(Ok(()))) => info!("Consumer stopped normally"),
            Ok(Ok(Err(e))) => error!("Consumer stopped with error: {e:#}"),
            Ok(Err(e)) => error!("Consumer task panicked: {e:#}"),
            Err(_) => error!(
                "Consumer shutdown timed out after {:?}",
                self.config.shutdown_timeout()
            ),
        }

        info!("Winevt deduplicator service stopped");
        Ok(())
    }

    pub fn stores(&self) -> &Arc<StoreManager> {
        &self.stores
    }
}
