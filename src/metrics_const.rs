// ==== Pipeline metrics ====
/// Counter for messages consumed from the input topic
pub const MESSAGES_CONSUMED_COUNTER: &str = "messages_consumed_total";

/// Counter for messages dropped by the event-marker pre-filter
pub const NON_EVENT_MESSAGES_COUNTER: &str = "non_event_messages_total";

/// Counter for records dropped because the XML could not be parsed
pub const MALFORMED_INPUT_COUNTER: &str = "malformed_input_records_total";

/// Counter for records dropped because a key field was absent
pub const MISSING_FIELD_COUNTER: &str = "missing_field_records_total";

/// Counter for records suppressed as duplicates
pub const DUPLICATE_RECORDS_COUNTER: &str = "duplicate_records_total";

/// Counter for first-seen records published downstream (with status label)
pub const RECORDS_PUBLISHED_COUNTER: &str = "records_published_total";

/// Counter for EventData entries skipped by the flattener for lacking the
/// Name/content shape
pub const FLATTEN_SKIPPED_ENTRIES_COUNTER: &str = "flatten_skipped_entries_total";

/// Counter for transient state/publish failures that forced a retry
pub const TRANSIENT_RETRIES_COUNTER: &str = "transient_retries_total";

/// Histogram for Kafka producer send duration
pub const PRODUCER_SEND_DURATION_HISTOGRAM: &str = "producer_send_duration_seconds";

// ==== Store metrics ====
/// Gauge for the number of live per-partition stores
pub const ACTIVE_STORES_GAUGE: &str = "active_dedup_stores";

/// Gauge for estimated on-disk size of a partition's dedup store
pub const STORE_SIZE_GAUGE: &str = "dedup_store_size_bytes";

/// Counter for store flushes performed at commit barriers
pub const STORE_FLUSH_COUNTER: &str = "dedup_store_flushes_total";

// ==== Rebalance metrics ====
/// Counter for partitions assigned to this consumer
pub const PARTITIONS_ASSIGNED_COUNTER: &str = "partitions_assigned_total";

/// Counter for partitions revoked from this consumer
pub const PARTITIONS_REVOKED_COUNTER: &str = "partitions_revoked_total";
