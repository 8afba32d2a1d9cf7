use thiserror::Error;

/// Failures raised while processing a single record.
///
/// `MalformedInput` and `MissingField` are data-quality errors: the record is
/// dropped, a counter is bumped, and the stream continues. The other variants
/// are infrastructure errors: the record must be retried with backoff, and the
/// consumer loop stalls rather than classify a record without consulting state.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("malformed event XML: {0}")]
    MalformedInput(String),

    #[error("required field missing from event: {0}")]
    MissingField(&'static str),

    #[error("deduplication store unavailable: {0}")]
    TransientStateFailure(#[source] anyhow::Error),

    #[error("failed to publish flattened record: {0}")]
    Publish(String),
}

impl PipelineError {
    /// Data-quality errors drop the record; everything else retries it.
    pub fn is_data_quality(&self) -> bool {
        matches!(
            self,
            PipelineError::MalformedInput(_) | PipelineError::MissingField(_)
        )
    }
}
