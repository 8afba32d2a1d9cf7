use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use rdkafka::message::BorrowedMessage;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use rdkafka::{ClientConfig, Message};
use tracing::{debug, warn};

use crate::error::PipelineError;
use crate::event::{extract_dedup_key, flatten, parse_event};
use crate::kafka::message::{MessageProcessor, ProcessOutcome};
use crate::metrics_const::{
    DUPLICATE_RECORDS_COUNTER, MALFORMED_INPUT_COUNTER, MISSING_FIELD_COUNTER,
    NON_EVENT_MESSAGES_COUNTER, PRODUCER_SEND_DURATION_HISTOGRAM, RECORDS_PUBLISHED_COUNTER,
};
use crate::store_manager::StoreManager;

/// Substring identifying a message as containing a log event. Anything else
/// in the raw stream is expected noise and dropped before parsing.
pub const EVENT_MARKER: &str = "<Event";

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub output_topic: String,
    pub producer_send_timeout: Duration,
}

/// The per-record pipeline: pre-filter, parse, key, dedup-check, flatten,
/// publish. Stateless itself; all mutable state lives in the per-partition
/// dedup stores.
#[derive(Clone)]
pub struct EventPipeline {
    config: PipelineConfig,
    producer: Option<FutureProducer>,
    stores: Arc<StoreManager>,
}

impl EventPipeline {
    pub fn new(
        config: PipelineConfig,
        producer_config: &ClientConfig,
        stores: Arc<StoreManager>,
    ) -> anyhow::Result<Self> {
        let producer: FutureProducer = producer_config.create().with_context(|| {
            format!(
                "Failed to create Kafka producer for output topic '{}'",
                config.output_topic
            )
        })?;

        Ok(Self {
            config,
            producer: Some(producer),
            stores,
        })
    }

    /// Pipeline without a producer, for exercising the transform and dedup
    /// stages in tests.
    pub fn without_producer(config: PipelineConfig, stores: Arc<StoreManager>) -> Self {
        Self {
            config,
            producer: None,
            stores,
        }
    }

    pub fn stores(&self) -> &Arc<StoreManager> {
        &self.stores
    }

    /// Run one raw payload through the full pipeline.
    ///
    /// Data-quality failures come back as outcomes, not errors: one bad
    /// record never halts the stream. An `Err` means the dedup store could
    /// not be consulted or delivery was not confirmed, which the consumer
    /// retries with backoff. The key is recorded only after delivery, so a
    /// retried record takes the same path again and re-sends the same bytes.
    pub async fn process_payload(
        &self,
        topic: &str,
        partition: i32,
        payload: &str,
    ) -> Result<ProcessOutcome, PipelineError> {
        if !payload.contains(EVENT_MARKER) {
            metrics::counter!(NON_EVENT_MESSAGES_COUNTER).increment(1);
            return Ok(ProcessOutcome::NonEvent);
        }

        let tree = match parse_event(payload) {
            Ok(tree) => tree,
            Err(e) => {
                warn!("Dropping unparseable record from {topic}:{partition}: {e}");
                metrics::counter!(MALFORMED_INPUT_COUNTER).increment(1);
                return Ok(ProcessOutcome::DataQualityDrop);
            }
        };

        let key = match extract_dedup_key(&tree) {
            Ok(key) => key,
            Err(e) => {
                warn!("Dropping unkeyable record from {topic}:{partition}: {e}");
                metrics::counter!(MISSING_FIELD_COUNTER).increment(1);
                return Ok(ProcessOutcome::DataQualityDrop);
            }
        };

        let store = self
            .stores
            .get_or_create(topic, partition)
            .map_err(PipelineError::TransientStateFailure)?;

        if store
            .contains(&key)
            .map_err(PipelineError::TransientStateFailure)?
        {
            debug!("Suppressing duplicate record {key}");
            metrics::counter!(DUPLICATE_RECORDS_COUNTER).increment(1);
            return Ok(ProcessOutcome::Duplicate);
        }

        let record = flatten(&tree);
        let body =
            serde_json::to_string(&record).map_err(|e| PipelineError::Publish(e.to_string()))?;

        // Delivery is confirmed before the key is recorded. A crash between
        // the two replays the record and re-emits the identical payload; it
        // can never suppress an output that was never sent. The check above
        // is race-free because a partition has a single writer.
        if let Some(producer) = &self.producer {
            self.publish(producer, &key, &body).await?;
        }

        store
            .record(&key)
            .map_err(PipelineError::TransientStateFailure)?;

        Ok(ProcessOutcome::Published)
    }

    /// Publish one flattened record, keyed by its dedup key so the output
    /// stream stays partitioned the same way as the state.
    ///
    /// Single attempt: an unconfirmed delivery surfaces as `Publish` and the
    /// consumer re-runs the whole record. Nothing was recorded yet, so the
    /// re-run re-emits the same bytes.
    async fn publish(
        &self,
        producer: &FutureProducer,
        key: &str,
        body: &str,
    ) -> Result<(), PipelineError> {
        let record = FutureRecord::to(&self.config.output_topic)
            .key(key)
            .payload(body);
        let start = Instant::now();
        let result = producer
            .send(record, Timeout::After(self.config.producer_send_timeout))
            .await;
        metrics::histogram!(PRODUCER_SEND_DURATION_HISTOGRAM)
            .record(start.elapsed().as_secs_f64());

        match result {
            Ok(_) => {
                metrics::counter!(RECORDS_PUBLISHED_COUNTER, "status" => "success").increment(1);
                Ok(())
            }
            Err((e, _)) => {
                metrics::counter!(RECORDS_PUBLISHED_COUNTER, "status" => "failure").increment(1);
                warn!("Failed to publish record {key}: {e}");
                Err(PipelineError::Publish(e.to_string()))
            }
        }
    }
}

#[async_trait::async_trait]
impl MessageProcessor for EventPipeline {
    async fn process_message(
        &self,
        message: &BorrowedMessage<'_>,
    ) -> Result<ProcessOutcome, PipelineError> {
        let Some(bytes) = message.payload() else {
            // Tombstones carry no event
            metrics::counter!(NON_EVENT_MESSAGES_COUNTER).increment(1);
            return Ok(ProcessOutcome::NonEvent);
        };
        let payload = String::from_utf8_lossy(bytes);
        self.process_payload(message.topic(), message.partition(), &payload)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE_EVENT: &str =
        "<Event><System><Computer>HOST1</Computer><EventRecordID>42</EventRecordID></System>\
         <EventData><Data Name=\"User\">alice</Data></EventData></Event>";

    fn pipeline(dir: &TempDir) -> EventPipeline {
        let config = PipelineConfig {
            output_topic: "events-flattened".to_string(),
            producer_send_timeout: Duration::from_secs(1),
        };
        EventPipeline::without_producer(
            config,
            Arc::new(StoreManager::new(dir.path().to_path_buf())),
        )
    }

    #[tokio::test]
    async fn first_occurrence_publishes_second_suppresses() {
        let dir = TempDir::new().unwrap();
        let pipeline = pipeline(&dir);

        let first = pipeline.process_payload("raw", 0, SAMPLE_EVENT).await.unwrap();
        assert_eq!(first, ProcessOutcome::Published);

        let second = pipeline.process_payload("raw", 0, SAMPLE_EVENT).await.unwrap();
        assert_eq!(second, ProcessOutcome::Duplicate);
    }

    #[tokio::test]
    async fn non_events_touch_no_state() {
        let dir = TempDir::new().unwrap();
        let pipeline = pipeline(&dir);

        let outcome = pipeline
            .process_payload("raw", 0, "plain syslog line, nothing to see")
            .await
            .unwrap();
        assert_eq!(outcome, ProcessOutcome::NonEvent);
        assert_eq!(pipeline.stores().store_count(), 0);
    }

    #[tokio::test]
    async fn malformed_events_are_dropped_without_state() {
        let dir = TempDir::new().unwrap();
        let pipeline = pipeline(&dir);

        let outcome = pipeline
            .process_payload("raw", 0, "<Event><System><Computer>HOST1")
            .await
            .unwrap();
        assert_eq!(outcome, ProcessOutcome::DataQualityDrop);
        assert_eq!(pipeline.stores().store_count(), 0);
    }

    #[tokio::test]
    async fn events_missing_key_fields_are_dropped() {
        let dir = TempDir::new().unwrap();
        let pipeline = pipeline(&dir);

        let outcome = pipeline
            .process_payload(
                "raw",
                0,
                "<Event><System><Computer>HOST1</Computer></System><EventData/></Event>",
            )
            .await
            .unwrap();
        assert_eq!(outcome, ProcessOutcome::DataQualityDrop);
    }

    #[tokio::test]
    async fn one_bad_record_never_halts_the_stream() {
        let dir = TempDir::new().unwrap();
        let pipeline = pipeline(&dir);

        pipeline
            .process_payload("raw", 0, "<Event>garbage")
            .await
            .unwrap();
        let outcome = pipeline.process_payload("raw", 0, SAMPLE_EVENT).await.unwrap();
        assert_eq!(outcome, ProcessOutcome::Published);
    }

    #[tokio::test]
    async fn partitions_dedup_independently() {
        let dir = TempDir::new().unwrap();
        let pipeline = pipeline(&dir);

        assert_eq!(
            pipeline.process_payload("raw", 0, SAMPLE_EVENT).await.unwrap(),
            ProcessOutcome::Published
        );
        assert_eq!(
            pipeline.process_payload("raw", 1, SAMPLE_EVENT).await.unwrap(),
            ProcessOutcome::Published
        );
        assert_eq!(
            pipeline.process_payload("raw", 1, SAMPLE_EVENT).await.unwrap(),
            ProcessOutcome::Duplicate
        );
    }
}
