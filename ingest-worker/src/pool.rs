//! Fixed pool of workers sharing one bounded queue.
//!
//! Every item pushed onto the queue, stop tokens included, is counted as
//! outstanding until a worker has finished with it. Batch boundaries wait for
//! that count to reach zero before offsets may be committed.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use futures::FutureExt;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::error::FatalError;
use crate::metrics_consts::{
    POOL_BUSY_WORKERS, POOL_DRAIN_DURATION_MS, POOL_OUTSTANDING_TASKS, POOL_WORKER_FAILURES,
};
use crate::router::TaskRouter;
use crate::task::Task;

pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;

/// Queue entries. `Stop` can only be created by [`WorkerPool::terminate`],
/// never by decoding a record.
#[derive(Debug)]
pub enum WorkItem {
    Task(Task),
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Uninitialized,
    Bootstrapping,
    Idle,
    Processing,
    Terminated,
}

#[derive(Debug, Default)]
struct Progress {
    outstanding: usize,
    failure: Option<(usize, String)>,
}

/// Outstanding-item accounting shared by the producer and all workers.
#[derive(Debug)]
pub struct CompletionTracker {
    progress: watch::Sender<Progress>,
}

impl Default for CompletionTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl CompletionTracker {
    pub fn new() -> Self {
        let (progress, _) = watch::channel(Progress::default());
        Self { progress }
    }

    pub fn outstanding(&self) -> usize {
        self.progress.borrow().outstanding
    }

    fn increment(&self) {
        self.progress.send_modify(|p| {
            p.outstanding += 1;
            metrics::gauge!(POOL_OUTSTANDING_TASKS).set(p.outstanding as f64);
        });
    }

    fn complete(&self) {
        self.progress.send_modify(Self::decrement);
    }

    /// Completes the item a worker died on and remembers why it died.
    fn fail(&self, worker: usize, reason: String) {
        self.progress.send_modify(|p| {
            Self::decrement(p);
            p.failure.get_or_insert((worker, reason));
        });
    }

    fn decrement(p: &mut Progress) {
        match p.outstanding.checked_sub(1) {
            Some(outstanding) => p.outstanding = outstanding,
            None => error!("Completion reported with no outstanding items"),
        }
        metrics::gauge!(POOL_OUTSTANDING_TASKS).set(p.outstanding as f64);
    }

    pub fn failure(&self) -> Option<FatalError> {
        self.progress
            .borrow()
            .failure
            .as_ref()
            .map(|(worker, reason)| FatalError::WorkerFailed {
                worker: *worker,
                reason: reason.clone(),
            })
    }

    /// Waits until nothing is outstanding. Gives up early once a worker has
    /// failed, since its share of the queue may never be consumed.
    pub async fn wait_drained(&self) -> Result<(), FatalError> {
        let mut rx = self.progress.subscribe();
        rx.wait_for(|p| p.outstanding == 0 || p.failure.is_some())
            .await
            .map_err(|_| FatalError::PoolClosed)?;
        drop(rx);

        match self.failure() {
            Some(failure) => Err(failure),
            None => Ok(()),
        }
    }
}

#[derive(Debug)]
struct WorkerStates {
    states: Mutex<Vec<WorkerState>>,
}

impl WorkerStates {
    fn new(size: usize) -> Self {
        Self {
            states: Mutex::new(vec![WorkerState::Uninitialized; size]),
        }
    }

    fn set(&self, worker: usize, state: WorkerState) {
        let mut states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
        states[worker] = state;

        let busy = states
            .iter()
            .filter(|s| **s == WorkerState::Processing)
            .count();
        metrics::gauge!(POOL_BUSY_WORKERS).set(busy as f64);
    }

    fn snapshot(&self) -> Vec<WorkerState> {
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

type SharedReceiver = Arc<tokio::sync::Mutex<mpsc::Receiver<WorkItem>>>;

pub struct WorkerPool {
    sender: Option<mpsc::Sender<WorkItem>>,
    tracker: Arc<CompletionTracker>,
    states: Arc<WorkerStates>,
    workers: Vec<JoinHandle<Result<(), FatalError>>>,
    size: usize,
}

impl WorkerPool {
    /// Spawns `size` workers on the current tokio runtime.
    pub fn new(router: Arc<TaskRouter>, size: usize, queue_capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(queue_capacity);
        let receiver: SharedReceiver = Arc::new(tokio::sync::Mutex::new(receiver));
        let tracker = Arc::new(CompletionTracker::new());
        let states = Arc::new(WorkerStates::new(size));

        info!(
            workers = size,
            queue_capacity = queue_capacity,
            "Starting worker pool"
        );

        let workers = (0..size)
            .map(|worker| {
                let receiver = receiver.clone();
                let router = router.clone();
                let tracker = tracker.clone();
                let states = states.clone();

                tokio::spawn(
                    async move {
                        let run = Self::run_worker(worker, receiver, router, &tracker, &states);
                        match AssertUnwindSafe(run).catch_unwind().await {
                            Ok(result) => result,
                            Err(_) => {
                                let reason = "worker task panicked".to_string();
                                tracker.fail(worker, reason.clone());
                                states.set(worker, WorkerState::Terminated);
                                Err(FatalError::WorkerPanicked { worker, reason })
                            }
                        }
                    }
                    .instrument(info_span!("worker", id = worker)),
                )
            })
            .collect();

        Self {
            sender: Some(sender),
            tracker,
            states,
            workers,
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn outstanding(&self) -> usize {
        self.tracker.outstanding()
    }

    pub fn worker_states(&self) -> Vec<WorkerState> {
        self.states.snapshot()
    }

    /// Queues a task, waiting while the queue is full.
    pub async fn enqueue(&self, task: Task) -> Result<(), FatalError> {
        if let Some(failure) = self.tracker.failure() {
            return Err(failure);
        }
        let sender = self.sender.as_ref().ok_or(FatalError::PoolClosed)?;
        Self::push(sender, &self.tracker, WorkItem::Task(task)).await
    }

    // Reserving before counting keeps the count exact if the caller's future
    // is dropped while waiting for a slot.
    async fn push(
        sender: &mpsc::Sender<WorkItem>,
        tracker: &CompletionTracker,
        item: WorkItem,
    ) -> Result<(), FatalError> {
        let permit = sender.reserve().await.map_err(|_| FatalError::PoolClosed)?;
        tracker.increment();
        permit.send(item);
        Ok(())
    }

    pub async fn await_drain(&self) -> Result<(), FatalError> {
        let start = Instant::now();
        let result = self.tracker.wait_drained().await;
        metrics::histogram!(POOL_DRAIN_DURATION_MS).record(start.elapsed().as_millis() as f64);
        result
    }

    /// Sends one stop token per worker and waits for all of them to exit.
    /// Returns the first fatal error any worker stopped with.
    pub async fn terminate(&mut self) -> Result<(), FatalError> {
        let Some(sender) = self.sender.take() else {
            return Ok(());
        };

        info!(workers = self.size, "Stopping worker pool");
        for _ in 0..self.size {
            if Self::push(&sender, &self.tracker, WorkItem::Stop).await.is_err() {
                warn!("Queue closed before every stop token was sent, all workers already exited");
                break;
            }
        }
        drop(sender);

        let mut first_error = None;
        for (worker, handle) in self.workers.drain(..).enumerate() {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => Err(FatalError::WorkerPanicked {
                    worker,
                    reason: e.to_string(),
                }),
            };
            if let Err(e) = result {
                first_error.get_or_insert(e);
            }
        }

        info!("Worker pool stopped");
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn run_worker(
        worker: usize,
        receiver: SharedReceiver,
        router: Arc<TaskRouter>,
        tracker: &CompletionTracker,
        states: &WorkerStates,
    ) -> Result<(), FatalError> {
        states.set(worker, WorkerState::Bootstrapping);
        // Workers never listen for process signals. Shutdown reaches them
        // only as a stop token or a closed queue.
        debug!("Worker bootstrapped");
        states.set(worker, WorkerState::Idle);

        loop {
            let item = receiver.lock().await.recv().await;

            match item {
                Some(WorkItem::Task(task)) => {
                    states.set(worker, WorkerState::Processing);
                    let result = router.handle(task).await;
                    states.set(worker, WorkerState::Idle);

                    if let Err(e) = result {
                        error!(error = ?e, "Worker stopping on fatal error");
                        metrics::counter!(POOL_WORKER_FAILURES).increment(1);
                        tracker.fail(worker, e.to_string());
                        states.set(worker, WorkerState::Terminated);
                        return Err(e);
                    }
                    tracker.complete();
                }
                Some(WorkItem::Stop) => {
                    tracker.complete();
                    break;
                }
                None => break,
            }
        }

        states.set(worker, WorkerState::Terminated);
        debug!("Worker terminated");
        Ok(())
    }
}
