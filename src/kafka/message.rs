use rdkafka::message::BorrowedMessage;

use crate::error::PipelineError;

/// Outcome of processing one input message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// First-seen event: flattened and published downstream.
    Published,
    /// Key already recorded: record consumed with no output.
    Duplicate,
    /// Input did not carry the event marker; dropped by the pre-filter with
    /// no state change.
    NonEvent,
    /// Input passed the pre-filter but could not be parsed or keyed; dropped
    /// and surfaced to observability.
    DataQualityDrop,
}

/// Per-message processing hook for the stream consumer.
///
/// Data-quality failures are swallowed into [`ProcessOutcome::DataQualityDrop`]
/// by the implementation; an `Err` from this trait always means an
/// infrastructure failure the consumer must retry.
#[async_trait::async_trait]
pub trait MessageProcessor: Send + Sync + 'static {
    async fn process_message(
        &self,
        message: &BorrowedMessage<'_>,
    ) -> Result<ProcessOutcome, PipelineError>;
}
