use std::collections::HashMap;
use std::time::Duration;

use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::error::{KafkaError, KafkaResult, RDKafkaErrorCode};
use rdkafka::{Offset, TopicPartitionList};
use tokio::sync::watch;
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, error, info, warn};

use crate::error::ConsumerError;
use crate::metrics_consts::{
    CONSUMER_BATCHES_COMMITTED, CONSUMER_BATCH_SIZE, CONSUMER_COMMIT_FAILURES,
    CONSUMER_KAFKA_ERROR, CONSUMER_MESSAGES_RECEIVED,
};
use crate::orchestrator::ConsumerWorker;
use crate::task::Record;

/// Highest offset seen per partition in the batch being collected.
#[derive(Debug, Default)]
pub struct PendingBatch {
    offsets: HashMap<(String, i32), i64>,
    message_count: usize,
}

impl PendingBatch {
    pub fn track(&mut self, record: &Record) {
        self.message_count += 1;
        if let (Some(partition), Some(offset)) = (record.partition, record.offset) {
            self.offsets
                .entry((record.topic.clone(), partition))
                .and_modify(|highest| *highest = (*highest).max(offset))
                .or_insert(offset);
        }
    }

    pub fn message_count(&self) -> usize {
        self.message_count
    }

    pub fn is_empty(&self) -> bool {
        self.message_count == 0
    }

    /// Offsets to commit: one past the last record of each partition.
    pub fn commit_list(&self) -> KafkaResult<TopicPartitionList> {
        let mut list = TopicPartitionList::with_capacity(self.offsets.len());
        for ((topic, partition), offset) in &self.offsets {
            list.add_partition_offset(topic, *partition, Offset::Offset(offset + 1))?;
        }
        Ok(list)
    }
}

/// Polls Kafka in batches and drives a [`ConsumerWorker`], committing a
/// batch's offsets only after the worker has flushed it.
pub struct BatchingConsumer {
    consumer: StreamConsumer,
    worker: ConsumerWorker,
    max_batch_size: usize,
    max_batch_time: Duration,
}

impl BatchingConsumer {
    pub fn new(
        consumer: StreamConsumer,
        worker: ConsumerWorker,
        max_batch_size: usize,
        max_batch_time: Duration,
    ) -> Self {
        Self {
            consumer,
            worker,
            max_batch_size,
            max_batch_time,
        }
    }

    /// Consumes until `shutdown` flips to true, then flushes and commits the
    /// open batch and stops the workers.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<(), ConsumerError> {
        info!(
            max_batch_size = self.max_batch_size,
            max_batch_time_ms = self.max_batch_time.as_millis() as u64,
            "Starting batch consumption"
        );

        let result = self.consume(&mut shutdown).await;
        if let Err(e) = &result {
            error!(error = ?e, "Consumer loop stopped on a fatal error");
        }

        let shutdown_result = self.worker.shutdown().await;
        result?;
        shutdown_result?;

        info!("Batch consumption stopped");
        Ok(())
    }

    async fn consume(&mut self, shutdown: &mut watch::Receiver<bool>) -> Result<(), ConsumerError> {
        loop {
            let (batch, stopping) = self.collect_batch(shutdown).await?;

            if !batch.is_empty() {
                self.flush_and_commit(&batch).await?;
            }

            if stopping {
                info!("Shutdown signal received, stopping consumer loop");
                return Ok(());
            }
        }
    }

    async fn collect_batch(
        &self,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<(PendingBatch, bool), ConsumerError> {
        let mut batch = PendingBatch::default();
        let deadline = Instant::now() + self.max_batch_time;
        let mut kafka_error_count = 0;

        if *shutdown.borrow() {
            return Ok((batch, true));
        }

        while batch.message_count() < self.max_batch_size {
            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return Ok((batch, true));
                    }
                }

                _ = sleep_until(deadline) => break,

                next = self.consumer.recv() => match next.map(|message| Record::from_message(&message)) {
                    Ok(record) => {
                        kafka_error_count = 0;
                        batch.track(&record);

                        metrics::counter!(CONSUMER_MESSAGES_RECEIVED).increment(1);
                        self.worker.receive(record).await?;
                    }
                    Err(e) => {
                        kafka_error_count += 1;
                        if let Some(fatal) = Self::handle_kafka_error(e, kafka_error_count).await {
                            return Err(fatal.into());
                        }
                    }
                },
            }
        }

        Ok((batch, false))
    }

    async fn flush_and_commit(&self, batch: &PendingBatch) -> Result<(), ConsumerError> {
        self.worker.flush_batch().await?;

        metrics::histogram!(CONSUMER_BATCH_SIZE).record(batch.message_count() as f64);

        let list = batch.commit_list()?;
        match self.consumer.commit(&list, CommitMode::Sync) {
            Ok(()) => {
                debug!(
                    messages = batch.message_count(),
                    partitions = list.count(),
                    "Committed batch offsets"
                );
                metrics::counter!(CONSUMER_BATCHES_COMMITTED).increment(1);
            }
            Err(e) => {
                // The batch is reprocessed after a rebalance or restart
                warn!(error = ?e, "Failed to commit batch offsets");
                metrics::counter!(CONSUMER_COMMIT_FAILURES).increment(1);
            }
        }

        Ok(())
    }

    /// Returns the error back only when consumption cannot continue.
    async fn handle_kafka_error(e: KafkaError, current_count: u64) -> Option<KafkaError> {
        match &e {
            KafkaError::MessageConsumption(RDKafkaErrorCode::PartitionEOF) => {
                metrics::counter!(CONSUMER_KAFKA_ERROR, "level" => "info", "error" => "partition_eof")
                    .increment(1);
                None
            }
            KafkaError::MessageConsumptionFatal(code) => {
                error!("Fatal Kafka consumer error: {code:?}");
                metrics::counter!(CONSUMER_KAFKA_ERROR, "level" => "fatal", "error" => "consumer")
                    .increment(1);
                Some(e)
            }
            KafkaError::Global(RDKafkaErrorCode::Authentication) => {
                error!("Kafka authentication failed");
                metrics::counter!(CONSUMER_KAFKA_ERROR, "level" => "fatal", "error" => "authentication")
                    .increment(1);
                Some(e)
            }
            KafkaError::Canceled => {
                info!("Consumer canceled");
                Some(e)
            }
            _ => {
                warn!(error = ?e, "Kafka consumer error");
                metrics::counter!(CONSUMER_KAFKA_ERROR, "level" => "warn", "error" => "consumer")
                    .increment(1);
                sleep(Duration::from_millis(100 * current_count.min(10))).await;
                None
            }
        }
    }
}
