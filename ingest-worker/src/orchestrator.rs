use std::sync::Arc;

use tracing::info;

use crate::error::{ConfigError, FatalError};
use crate::pool::{WorkerPool, DEFAULT_QUEUE_CAPACITY};
use crate::router::{Outcome, TaskRouter};
use crate::task::{Record, Task};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    pub concurrency: usize,
    pub queue_capacity: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            concurrency: 1,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// Per-batch entry point used by the consumer loop.
///
/// With a concurrency of 1 every record is routed inline on the caller's
/// task. Above that, records are queued for a [`WorkerPool`] and
/// [`ConsumerWorker::flush_batch`] is where the caller waits for them.
pub struct ConsumerWorker {
    router: Arc<TaskRouter>,
    pool: Option<WorkerPool>,
}

impl ConsumerWorker {
    pub fn new(router: Arc<TaskRouter>, config: PoolConfig) -> Result<Self, ConfigError> {
        if config.concurrency == 0 {
            return Err(ConfigError::InvalidConcurrency);
        }
        if config.queue_capacity == 0 {
            return Err(ConfigError::InvalidQueueCapacity);
        }

        let pool = if config.concurrency > 1 {
            Some(WorkerPool::new(
                router.clone(),
                config.concurrency,
                config.queue_capacity,
            ))
        } else {
            info!("Concurrency is 1, routing messages inline");
            None
        };

        Ok(Self { router, pool })
    }

    pub fn pool(&self) -> Option<&WorkerPool> {
        self.pool.as_ref()
    }

    /// Routes or queues one record. Inline, the outcome is known right away;
    /// queued records report `None`.
    pub async fn receive(&self, record: Record) -> Result<Option<Outcome>, FatalError> {
        let task = Task::from(record);

        match &self.pool {
            Some(pool) => {
                pool.enqueue(task).await?;
                Ok(None)
            }
            None => self.router.handle(task).await.map(Some),
        }
    }

    /// Returns once every record received so far has been handled. Offsets
    /// for the batch may be committed only after this returns `Ok`.
    pub async fn flush_batch(&self) -> Result<(), FatalError> {
        match &self.pool {
            Some(pool) => pool.await_drain().await,
            None => Ok(()),
        }
    }

    pub async fn shutdown(&mut self) -> Result<(), FatalError> {
        match &mut self.pool {
            Some(pool) => pool.terminate().await,
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{catalog, router_with, RecordingHandler, RecordingPublisher};

    fn worker(concurrency: usize) -> (ConsumerWorker, Arc<RecordingHandler>) {
        let handler = Arc::new(RecordingHandler::default());
        let router = router_with(
            &catalog(),
            handler.clone(),
            Arc::new(RecordingPublisher::default()),
        );
        let worker = ConsumerWorker::new(
            Arc::new(router),
            PoolConfig {
                concurrency,
                queue_capacity: 10,
            },
        )
        .unwrap();
        (worker, handler)
    }

    #[tokio::test]
    async fn test_inline_worker_has_no_pool() {
        let (mut worker, handler) = worker(1);
        assert!(worker.pool().is_none());

        let outcome = worker
            .receive(Record::new("save", b"{}".to_vec()))
            .await
            .unwrap();
        assert_eq!(outcome, Some(Outcome::Handled));
        assert_eq!(handler.messages().len(), 1);

        worker.flush_batch().await.unwrap();
        worker.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_without_records() {
        let (mut worker, _) = worker(3);
        assert_eq!(worker.pool().map(WorkerPool::size), Some(3));

        worker.shutdown().await.unwrap();
    }

    #[test]
    fn test_zero_concurrency_is_rejected() {
        let router = router_with(
            &catalog(),
            Arc::new(RecordingHandler::default()),
            Arc::new(RecordingPublisher::default()),
        );

        let result = ConsumerWorker::new(
            Arc::new(router),
            PoolConfig {
                concurrency: 0,
                queue_capacity: 10,
            },
        );
        assert!(matches!(result, Err(ConfigError::InvalidConcurrency)));
    }
}
