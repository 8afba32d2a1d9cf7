use rdkafka::ClientConfig;

/// Consumer configuration builder with defaults for the stream consumer.
///
/// Auto commit and auto offset store are disabled: offsets are stored only
/// after a record is fully processed and committed only after the dedup
/// stores have been flushed (the commit barrier).
pub struct ConsumerConfigBuilder {
    config: ClientConfig,
}

impl ConsumerConfigBuilder {
    pub fn new(bootstrap_servers: &str, group_id: &str) -> Self {
        let mut config = ClientConfig::new();

        config
            .set("bootstrap.servers", bootstrap_servers)
            .set("group.id", group_id)
            .set("enable.auto.offset.store", "false")
            .set("enable.auto.commit", "false")
            .set("socket.timeout.ms", "10000")
            .set("session.timeout.ms", "60000")
            .set("heartbeat.interval.ms", "5000")
            .set("max.poll.interval.ms", "300000");

        Self { config }
    }

    /// Enable TLS for the broker connection.
    pub fn with_tls(mut self, enabled: bool) -> Self {
        if enabled {
            self.config
                .set("security.protocol", "ssl")
                .set("enable.ssl.certificate.verification", "false");
        }
        self
    }

    /// Where to start when the group has no committed offset.
    pub fn with_offset_reset(mut self, policy: &str) -> Self {
        self.config.set("auto.offset.reset", policy);
        self
    }

    /// Add any custom configuration.
    pub fn set(mut self, key: &str, value: &str) -> Self {
        self.config.set(key, value);
        self
    }

    pub fn build(self) -> ClientConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disables_auto_commit_and_offset_store() {
        let config = ConsumerConfigBuilder::new("localhost:9092", "group").build();
        assert_eq!(config.get("enable.auto.commit"), Some("false"));
        assert_eq!(config.get("enable.auto.offset.store"), Some("false"));
        assert_eq!(config.get("bootstrap.servers"), Some("localhost:9092"));
        assert_eq!(config.get("group.id"), Some("group"));
    }

    #[test]
    fn tls_is_opt_in() {
        let plain = ConsumerConfigBuilder::new("localhost:9092", "group")
            .with_tls(false)
            .build();
        assert_eq!(plain.get("security.protocol"), None);

        let tls = ConsumerConfigBuilder::new("localhost:9092", "group")
            .with_tls(true)
            .build();
        assert_eq!(tls.get("security.protocol"), Some("ssl"));
    }

    #[test]
    fn offset_reset_is_configurable() {
        let config = ConsumerConfigBuilder::new("localhost:9092", "group")
            .with_offset_reset("latest")
            .build();
        assert_eq!(config.get("auto.offset.reset"), Some("latest"));
    }
}
