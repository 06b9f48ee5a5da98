use rdkafka::mocking::MockCluster;
use rdkafka::producer::{DefaultProducerContext, FutureProducer};

use crate::config::KafkaConfig;
use crate::kafka_producer::{create_kafka_producer, KafkaContext};

pub fn mock_kafka_config(bootstrap_servers: String) -> KafkaConfig {
    KafkaConfig {
        kafka_producer_linger_ms: 0,
        kafka_producer_queue_mib: 50,
        kafka_producer_queue_messages: 1000,
        kafka_message_timeout_ms: 5000,
        kafka_compression_codec: "none".to_string(),
        kafka_tls: false,
        kafka_hosts: bootstrap_servers,
    }
}

pub async fn create_mock_kafka() -> (
    MockCluster<'static, DefaultProducerContext>,
    FutureProducer<KafkaContext>,
) {
    let cluster = MockCluster::new(1).expect("failed to create mock brokers");
    let config = mock_kafka_config(cluster.bootstrap_servers());

    (
        cluster,
        create_kafka_producer(&config)
            .await
            .expect("failed to create mocked kafka producer"),
    )
}
