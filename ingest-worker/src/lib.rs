//! Kafka batch worker.
//!
//! Records from the stage topics are routed to a handler per topic, either
//! inline or through a fixed pool of workers. A batch's offsets are committed
//! only once every record in it has been handled, dead-lettered or dropped.
//!
//! Log errors as `error = ?e` or `{e:#}` so the whole cause chain is kept.

pub mod config;
pub mod consumer;
pub mod dead_letter;
pub mod error;
pub mod handlers;
pub mod metrics_consts;
pub mod orchestrator;
pub mod pool;
pub mod registry;
pub mod router;
pub mod serve_metrics;
pub mod task;
pub mod test_utils;
pub mod topics;

pub use orchestrator::{ConsumerWorker, PoolConfig};
pub use registry::{DispatchRegistry, MessageHandler};
pub use router::{Outcome, TaskRouter};
pub use task::{Record, Task};
