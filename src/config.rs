use std::path::PathBuf;
use std::time::Duration;

use envconfig::Envconfig;
use rdkafka::ClientConfig;

use crate::kafka::ConsumerConfigBuilder;

#[derive(Envconfig, Clone, Debug)]
pub struct Config {
    // Kafka configuration
    #[envconfig(default = "localhost:9092")]
    pub kafka_hosts: String,

    #[envconfig(default = "winevt-deduplicator")]
    pub kafka_consumer_group: String,

    #[envconfig(default = "winevt-raw")]
    pub kafka_consumer_topic: String,

    #[envconfig(default = "winevt-flattened")]
    pub kafka_output_topic: String,

    #[envconfig(default = "latest")]
    pub kafka_consumer_offset_reset: String,

    #[envconfig(default = "false")]
    pub kafka_tls: bool,

    // Kafka producer configuration
    #[envconfig(default = "20")]
    pub kafka_producer_linger_ms: u32,

    #[envconfig(default = "400")]
    pub kafka_producer_queue_mib: u32,

    #[envconfig(default = "10000000")]
    pub kafka_producer_queue_messages: u32,

    #[envconfig(default = "20000")]
    pub kafka_message_timeout_ms: u32,

    #[envconfig(default = "snappy")]
    pub kafka_compression_codec: String,

    #[envconfig(default = "20")]
    pub producer_send_timeout_secs: u64,

    // Dedup store configuration
    #[envconfig(default = "/tmp/winevt-dedup-store")]
    pub store_path: String,

    // Consumer processing configuration
    #[envconfig(default = "2")]
    pub commit_interval_secs: u64,

    #[envconfig(default = "1")]
    pub poll_timeout_secs: u64,

    #[envconfig(default = "30")]
    pub shutdown_timeout_secs: u64,

    // HTTP server configuration
    #[envconfig(from = "BIND_HOST", default = "0.0.0.0")]
    pub host: String,

    #[envconfig(from = "BIND_PORT", default = "8080")]
    pub port: u16,
}

impl Config {
    pub fn init_with_defaults() -> Result<Self, envconfig::Error> {
        Config::init_from_env()
    }

    /// Overlay the positional arguments: broker list, input topic, output
    /// topic, consumer group. No arguments means environment values stand.
    pub fn apply_cli_args(&mut self, args: &[String]) -> anyhow::Result<()> {
        match args {
            [] => Ok(()),
            [brokers, input_topic, output_topic, group] => {
                self.kafka_hosts = brokers.clone();
                self.kafka_consumer_topic = input_topic.clone();
                self.kafka_output_topic = output_topic.clone();
                self.kafka_consumer_group = group.clone();
                Ok(())
            }
            other => anyhow::bail!(
                "expected 4 positional arguments (brokers, input topic, output topic, consumer group), got {}",
                other.len()
            ),
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.kafka_hosts.is_empty() {
            anyhow::bail!("kafka_hosts must not be empty");
        }
        if self.kafka_consumer_topic.is_empty() || self.kafka_output_topic.is_empty() {
            anyhow::bail!("input and output topics must not be empty");
        }
        if self.kafka_consumer_topic == self.kafka_output_topic {
            anyhow::bail!(
                "input and output topics must differ, both are '{}'",
                self.kafka_consumer_topic
            );
        }
        if self.kafka_consumer_group.is_empty() {
            anyhow::bail!("kafka_consumer_group must not be empty");
        }
        Ok(())
    }

    /// Get dedup store base path as PathBuf
    pub fn store_path_buf(&self) -> PathBuf {
        PathBuf::from(&self.store_path)
    }

    /// Get server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn commit_interval(&self) -> Duration {
        Duration::from_secs(self.commit_interval_secs)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    pub fn producer_send_timeout(&self) -> Duration {
        Duration::from_secs(self.producer_send_timeout_secs)
    }

    pub fn consumer_client_config(&self) -> ClientConfig {
        ConsumerConfigBuilder::new(&self.kafka_hosts, &self.kafka_consumer_group)
            .with_tls(self.kafka_tls)
            .with_offset_reset(&self.kafka_consumer_offset_reset)
            .build()
    }

    pub fn build_producer_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", &self.kafka_hosts)
            .set("linger.ms", self.kafka_producer_linger_ms.to_string())
            .set(
                "message.timeout.ms",
                self.kafka_message_timeout_ms.to_string(),
            )
            .set(
                "compression.codec",
                self.kafka_compression_codec.to_owned(),
            )
            .set(
                "queue.buffering.max.kbytes",
                (self.kafka_producer_queue_mib * 1024).to_string(),
            )
            .set(
                "queue.buffering.max.messages",
                self.kafka_producer_queue_messages.to_string(),
            );
        if self.kafka_tls {
            config
                .set("security.protocol", "ssl")
                .set("enable.ssl.certificate.verification", "false");
        }
        config
    }
}
