use rdkafka::TopicPartitionList;

/// Callbacks driven by the consumer group's rebalance protocol.
///
/// Both methods run synchronously inside librdkafka callbacks and must be
/// fast: flushing a local store is acceptable, network I/O is not.
///
/// Revocation is the fencing point for per-partition state: the callback
/// completes before the group protocol hands the partition to its next owner,
/// so the old owner has stopped committing by the time the new owner starts.
pub trait RebalanceHandler: Send + Sync {
    fn on_partitions_assigned(&self, partitions: &TopicPartitionList);

    fn on_partitions_revoked(&self, partitions: &TopicPartitionList);
}
