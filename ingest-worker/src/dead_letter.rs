use std::time::Duration;

use async_trait::async_trait;
use common_kafka::kafka_producer::{send_raw_to_kafka, KafkaContext};
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::FutureProducer;

use crate::error::DeadLetterError;

/// Where a failed record came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetterHeaders {
    pub partition: Option<i32>,
    pub offset: Option<i64>,
    pub topic: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetterRecord {
    /// The original, undecoded payload.
    pub value: Vec<u8>,
    pub headers: DeadLetterHeaders,
}

impl DeadLetterHeaders {
    /// Header values as sent on the wire. Missing positions are null headers.
    pub fn to_kafka_headers(&self) -> OwnedHeaders {
        let partition = self.partition.map(|p| p.to_string());
        let offset = self.offset.map(|o| o.to_string());

        OwnedHeaders::new_with_capacity(3)
            .insert(Header {
                key: "partition",
                value: partition.as_deref(),
            })
            .insert(Header {
                key: "offset",
                value: offset.as_deref(),
            })
            .insert(Header {
                key: "topic",
                value: Some(self.topic.as_str()),
            })
    }
}

/// Publishes failed records. Implementations must not return until the
/// record is durably handed off, since the caller treats `Ok` as "safe to
/// move on".
#[async_trait]
pub trait DeadLetterPublisher: Send + Sync {
    async fn publish(&self, topic: &str, record: &DeadLetterRecord) -> Result<(), DeadLetterError>;
}

pub struct KafkaDeadLetterPublisher {
    producer: FutureProducer<KafkaContext>,
    queue_timeout: Duration,
}

impl KafkaDeadLetterPublisher {
    pub fn new(producer: FutureProducer<KafkaContext>, queue_timeout: Duration) -> Self {
        Self {
            producer,
            queue_timeout,
        }
    }
}

#[async_trait]
impl DeadLetterPublisher for KafkaDeadLetterPublisher {
    async fn publish(&self, topic: &str, record: &DeadLetterRecord) -> Result<(), DeadLetterError> {
        send_raw_to_kafka(
            &self.producer,
            topic,
            &record.value,
            record.headers.to_kafka_headers(),
            self.queue_timeout,
        )
        .await?;
        Ok(())
    }
}
