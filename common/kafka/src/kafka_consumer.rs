use rdkafka::{
    consumer::{Consumer, StreamConsumer},
    error::KafkaError,
    ClientConfig,
};
use tracing::info;

use crate::config::{ConsumerConfig, KafkaConfig};

/// Client configuration for a consumer whose offsets are committed by hand,
/// once a batch has been fully processed.
pub fn consumer_client_config(
    common_config: &KafkaConfig,
    consumer_config: &ConsumerConfig,
) -> ClientConfig {
    let mut client_config = ClientConfig::new();
    common_config.apply_connection(&mut client_config);
    client_config
        .set("group.id", &consumer_config.kafka_consumer_group)
        .set(
            "auto.offset.reset",
            &consumer_config.kafka_consumer_offset_reset,
        )
        .set(
            "session.timeout.ms",
            consumer_config.kafka_consumer_session_timeout_ms.to_string(),
        )
        .set("enable.auto.commit", "false")
        .set("enable.auto.offset.store", "false");
    client_config
}

pub fn create_manual_commit_consumer(
    common_config: &KafkaConfig,
    consumer_config: &ConsumerConfig,
    topics: &[&str],
) -> Result<StreamConsumer, KafkaError> {
    let consumer: StreamConsumer =
        consumer_client_config(common_config, consumer_config).create()?;
    consumer.subscribe(topics)?;

    info!(
        topics = ?topics,
        group_id = consumer_config.kafka_consumer_group,
        "Kafka consumer subscribed"
    );

    Ok(consumer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consumer_config_disables_auto_commit() {
        let common = KafkaConfig {
            kafka_producer_linger_ms: 0,
            kafka_producer_queue_mib: 50,
            kafka_producer_queue_messages: 1000,
            kafka_message_timeout_ms: 5000,
            kafka_compression_codec: "none".to_string(),
            kafka_tls: false,
            kafka_hosts: "localhost:9092".to_string(),
        };
        let consumer = ConsumerConfig {
            kafka_consumer_group: "ingest-consumer".to_string(),
            kafka_consumer_offset_reset: "earliest".to_string(),
            kafka_consumer_session_timeout_ms: 6000,
        };

        let client_config = consumer_client_config(&common, &consumer);
        assert_eq!(client_config.get("enable.auto.commit"), Some("false"));
        assert_eq!(client_config.get("group.id"), Some("ingest-consumer"));
        assert_eq!(client_config.get("auto.offset.reset"), Some("earliest"));
    }
}
