use std::sync::Arc;

use rdkafka::consumer::{BaseConsumer, ConsumerContext, Rebalance};
use rdkafka::ClientContext;
use tracing::{debug, error, info};

use crate::kafka::rebalance_handler::RebalanceHandler;

/// Consumer context that forwards rebalance events to a [`RebalanceHandler`].
pub struct PipelineConsumerContext {
    handler: Arc<dyn RebalanceHandler>,
}

impl PipelineConsumerContext {
    pub fn new(handler: Arc<dyn RebalanceHandler>) -> Self {
        Self { handler }
    }
}

impl ClientContext for PipelineConsumerContext {}

impl ConsumerContext for PipelineConsumerContext {
    fn pre_rebalance(&self, _base_consumer: &BaseConsumer<Self>, rebalance: &Rebalance) {
        match rebalance {
            Rebalance::Revoke(partitions) => {
                if partitions.count() == 0 {
                    debug!("Skipping empty revoke rebalance");
                    return;
                }
                info!("Revoking {} partitions", partitions.count());
                self.handler.on_partitions_revoked(partitions);
            }
            Rebalance::Assign(partitions) => {
                debug!(
                    "Pre-rebalance assign event for {} partitions",
                    partitions.count()
                );
            }
            Rebalance::Error(e) => {
                error!("Rebalance error: {e}");
            }
        }
    }

    fn post_rebalance(&self, _base_consumer: &BaseConsumer<Self>, rebalance: &Rebalance) {
        if let Rebalance::Assign(partitions) = rebalance {
            if partitions.count() == 0 {
                debug!("Skipping empty assign rebalance");
                return;
            }
            info!("Assigned {} partitions", partitions.count());
            self.handler.on_partitions_assigned(partitions);
        }
    }
}
