use common_kafka::kafka_producer::KafkaProduceError;
use rdkafka::error::KafkaError;
use thiserror::Error;

/// Problems with the startup configuration. These abort startup and are never retried.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("topic key '{key}' is not defined in the topic catalog")]
    MissingTopicKey { key: String },

    #[error("dead-letter key '{dead_letter_key}' for topic '{topic}' is not defined in the topic catalog")]
    MissingDeadLetterTopic {
        topic: String,
        dead_letter_key: String,
    },

    #[error("topic '{topic}' is registered more than once")]
    DuplicateTopic { topic: String },

    #[error("concurrency must be at least 1")]
    InvalidConcurrency,

    #[error("queue capacity must be at least 1")]
    InvalidQueueCapacity,

    #[error("malformed topic catalog: {0}")]
    MalformedCatalog(#[from] serde_json::Error),
}

/// Per-message failures. The router recovers from all of these by
/// dead-lettering or dropping the message.
#[derive(Error, Debug)]
pub enum HandleError {
    #[error("failed to decode message: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("handler failed: {0:#}")]
    Handler(anyhow::Error),

    #[error("handler panicked: {0}")]
    Panicked(String),
}

#[derive(Error, Debug)]
pub enum DeadLetterError {
    #[error(transparent)]
    Produce(#[from] KafkaProduceError),

    #[error("dead-letter publisher unavailable: {0}")]
    Unavailable(String),
}

/// Failures that must never be swallowed. Whatever runs the router (the
/// inline caller or a pool worker) stops when it sees one.
#[derive(Error, Debug)]
pub enum FatalError {
    #[error("no handler registered for topic '{topic}'")]
    UnknownTopic { topic: String },

    #[error("failed to publish message from '{topic}' to dead-letter topic '{dead_letter_topic}': {source}")]
    DeadLetterPublish {
        topic: String,
        dead_letter_topic: String,
        #[source]
        source: DeadLetterError,
    },

    #[error("worker {worker} stopped after a fatal error: {reason}")]
    WorkerFailed { worker: usize, reason: String },

    #[error("worker {worker} panicked: {reason}")]
    WorkerPanicked { worker: usize, reason: String },

    #[error("worker pool is closed")]
    PoolClosed,
}

#[derive(Error, Debug)]
pub enum ConsumerError {
    #[error("kafka error: {0}")]
    Kafka(#[from] KafkaError),

    #[error(transparent)]
    Fatal(#[from] FatalError),
}
