// ==== Router metrics ====
/// Counter for messages whose handler succeeded
pub const MESSAGES_HANDLED: &str = "ingest_worker_messages_handled_total";

/// Counter for messages whose decode or handler failed
pub const MESSAGES_FAILED: &str = "ingest_worker_messages_failed_total";

/// Counter for failed messages republished to a dead-letter topic
pub const MESSAGES_DEAD_LETTERED: &str = "ingest_worker_messages_dead_lettered_total";

/// Counter for failed messages dropped because their topic has no dead-letter route
pub const MESSAGES_DROPPED: &str = "ingest_worker_messages_dropped_total";

/// Histogram for decode + handler time per message
pub const MESSAGE_HANDLE_DURATION_MS: &str = "ingest_worker_message_handle_duration_ms";

// ==== Pool metrics ====
/// Gauge for enqueued tasks that have not completed yet
pub const POOL_OUTSTANDING_TASKS: &str = "ingest_worker_pool_outstanding_tasks";

/// Gauge for workers currently running a task
pub const POOL_BUSY_WORKERS: &str = "ingest_worker_pool_busy_workers";

/// Counter for workers that stopped on a fatal error
pub const POOL_WORKER_FAILURES: &str = "ingest_worker_pool_worker_failures_total";

/// Histogram for time spent waiting for the pool to drain at a batch boundary
pub const POOL_DRAIN_DURATION_MS: &str = "ingest_worker_pool_drain_duration_ms";

// ==== Consumer metrics ====
/// Counter for batches flushed and committed
pub const CONSUMER_BATCHES_COMMITTED: &str = "ingest_worker_batches_committed_total";

/// Histogram for records per batch
pub const CONSUMER_BATCH_SIZE: &str = "ingest_worker_batch_size";

/// Counter for records received from Kafka
pub const CONSUMER_MESSAGES_RECEIVED: &str = "ingest_worker_messages_received_total";

/// Counter for Kafka errors seen while consuming, labelled by level
pub const CONSUMER_KAFKA_ERROR: &str = "ingest_worker_kafka_error_total";

/// Counter for failed offset commits
pub const CONSUMER_COMMIT_FAILURES: &str = "ingest_worker_commit_failures_total";
