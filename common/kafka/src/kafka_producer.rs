use std::time::Duration;

use crate::config::KafkaConfig;

use rdkafka::error::KafkaError;
use rdkafka::message::OwnedHeaders;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::ClientConfig;
use thiserror::Error;
use tracing::{debug, error, info};

const PRODUCER_QUEUE_DEPTH: &str = "kafka_producer_queue_depth";

#[derive(Default)]
pub struct KafkaContext;

impl rdkafka::ClientContext for KafkaContext {
    fn stats(&self, stats: rdkafka::Statistics) {
        // Called from the main rdkafka loop, so this doubles as a liveness signal
        metrics::gauge!(PRODUCER_QUEUE_DEPTH).set(stats.msg_cnt as f64);
    }
}

pub fn producer_client_config(config: &KafkaConfig) -> ClientConfig {
    let mut client_config = ClientConfig::new();
    config.apply_connection(&mut client_config);
    client_config
        .set("linger.ms", config.kafka_producer_linger_ms.to_string())
        .set(
            "message.timeout.ms",
            config.kafka_message_timeout_ms.to_string(),
        )
        .set(
            "compression.codec",
            config.kafka_compression_codec.to_owned(),
        )
        .set(
            "queue.buffering.max.kbytes",
            (config.kafka_producer_queue_mib * 1024).to_string(),
        )
        .set(
            "queue.buffering.max.messages",
            config.kafka_producer_queue_messages.to_string(),
        );
    client_config
}

pub async fn create_kafka_producer(
    config: &KafkaConfig,
) -> Result<FutureProducer<KafkaContext>, KafkaError> {
    let client_config = producer_client_config(config);

    debug!("rdkafka configuration: {:?}", client_config);
    let api: FutureProducer<KafkaContext> =
        client_config.create_with_context(KafkaContext)?;

    // "Ping" the Kafka brokers by requesting metadata
    match api
        .client()
        .fetch_metadata(None, std::time::Duration::from_secs(15))
    {
        Ok(metadata) => {
            info!(
                "Successfully connected to Kafka brokers. Found {} topics.",
                metadata.topics().len()
            );
        }
        Err(error) => {
            error!("Failed to fetch metadata from Kafka brokers: {:?}", error);
            return Err(error);
        }
    }

    Ok(api)
}

#[derive(Error, Debug)]
pub enum KafkaProduceError {
    #[error("failed to produce to kafka: {error}")]
    KafkaProduceError { error: KafkaError },
    #[error("failed to produce to kafka (timeout)")]
    KafkaProduceCanceled,
}

/// Produces a raw payload and waits for its delivery report.
///
/// The payload is forwarded byte for byte, so callers republishing a record
/// keep the exact bytes they received.
pub async fn send_raw_to_kafka<C: rdkafka::ClientContext + 'static>(
    kafka_producer: &FutureProducer<C>,
    topic: &str,
    payload: &[u8],
    headers: OwnedHeaders,
    queue_timeout: Duration,
) -> Result<(), KafkaProduceError> {
    let record: FutureRecord<'_, (), [u8]> = FutureRecord {
        topic,
        key: None,
        payload: Some(payload),
        timestamp: None,
        partition: None,
        headers: Some(headers),
    };

    match kafka_producer.send(record, queue_timeout).await {
        Ok(_) => Ok(()),
        Err((KafkaError::Canceled, _)) => Err(KafkaProduceError::KafkaProduceCanceled),
        Err((e, _)) => Err(KafkaProduceError::KafkaProduceError { error: e }),
    }
}
