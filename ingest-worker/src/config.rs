use std::time::Duration;

use envconfig::Envconfig;

pub use common_kafka::config::{ConsumerConfig, KafkaConfig};

use crate::orchestrator::PoolConfig;
use crate::topics::TopicCatalog;

#[derive(Envconfig, Clone, Debug)]
pub struct Config {
    #[envconfig(nested = true)]
    pub kafka: KafkaConfig,

    #[envconfig(nested = true)]
    pub consumer: ConsumerConfig,

    // Topic keys into the catalog, one per pipeline stage
    #[envconfig(from = "KAFKA_PREPROCESS", default = "events-preprocess")]
    pub kafka_preprocess: String,

    #[envconfig(from = "KAFKA_PROCESS", default = "events-process")]
    pub kafka_process: String,

    #[envconfig(from = "KAFKA_SAVE", default = "events-save")]
    pub kafka_save: String,

    #[envconfig(
        from = "KAFKA_TOPICS",
        default = "{\"events-preprocess\": {\"topic\": \"events-preprocess\", \"dead-letter-key\": \"events-preprocess-dead\"}, \"events-preprocess-dead\": {\"topic\": \"events-preprocess-dead\"}, \"events-process\": {\"topic\": \"events-process\", \"dead-letter-key\": \"events-process-dead\"}, \"events-process-dead\": {\"topic\": \"events-process-dead\"}, \"events-save\": {\"topic\": \"events-save\", \"dead-letter-key\": \"events-save-dead\"}, \"events-save-dead\": {\"topic\": \"events-save-dead\"}}"
    )]
    pub kafka_topics: TopicCatalog,

    #[envconfig(from = "CONCURRENCY", default = "1")]
    pub concurrency: usize,

    #[envconfig(from = "QUEUE_CAPACITY", default = "1000")]
    pub queue_capacity: usize,

    #[envconfig(from = "MAX_BATCH_SIZE", default = "100")]
    pub max_batch_size: usize,

    #[envconfig(from = "MAX_BATCH_TIME_MS", default = "1000")]
    pub max_batch_time_ms: u64,

    #[envconfig(from = "BIND_HOST", default = "::")]
    pub bind_host: String,

    #[envconfig(from = "BIND_PORT", default = "3305")]
    pub bind_port: u16,
}

impl Config {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.bind_host, self.bind_port)
    }

    pub fn max_batch_time(&self) -> Duration {
        Duration::from_millis(self.max_batch_time_ms)
    }

    /// How long a dead-letter publish may wait for its delivery report.
    pub fn dead_letter_timeout(&self) -> Duration {
        Duration::from_millis(u64::from(self.kafka.kafka_message_timeout_ms))
    }

    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            concurrency: self.concurrency,
            queue_capacity: self.queue_capacity,
        }
    }

    /// Topic keys for the preprocess, process and save stages, in that order.
    pub fn stage_keys(&self) -> [&str; 3] {
        [
            self.kafka_preprocess.as_str(),
            self.kafka_process.as_str(),
            self.kafka_save.as_str(),
        ]
    }
}
