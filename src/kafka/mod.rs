pub mod config;
pub mod consumer;
pub mod context;
pub mod message;
pub mod rebalance_handler;

pub use config::ConsumerConfigBuilder;
pub use consumer::StreamPipelineConsumer;
pub use message::{MessageProcessor, ProcessOutcome};
pub use rebalance_handler::RebalanceHandler;
