use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde_json::Value;
use tracing::{debug, error};

use crate::dead_letter::{DeadLetterHeaders, DeadLetterPublisher, DeadLetterRecord};
use crate::error::{FatalError, HandleError};
use crate::metrics_consts::{
    MESSAGES_DEAD_LETTERED, MESSAGES_DROPPED, MESSAGES_FAILED, MESSAGES_HANDLED,
    MESSAGE_HANDLE_DURATION_MS,
};
use crate::registry::{DispatchRegistry, MessageHandler};
use crate::task::Task;

/// What happened to a task that did not fail fatally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Handled,
    DeadLettered { topic: String },
    /// The handler failed and the topic has no dead-letter route.
    Dropped,
}

pub struct TaskRouter {
    registry: Arc<DispatchRegistry>,
    publisher: Arc<dyn DeadLetterPublisher>,
}

impl TaskRouter {
    pub fn new(registry: Arc<DispatchRegistry>, publisher: Arc<dyn DeadLetterPublisher>) -> Self {
        Self {
            registry,
            publisher,
        }
    }

    pub fn registry(&self) -> &DispatchRegistry {
        &self.registry
    }

    /// Runs the task's handler. Decode and handler failures are recovered
    /// here; unknown topics and dead-letter publish failures are returned.
    pub async fn handle(&self, task: Task) -> Result<Outcome, FatalError> {
        let entry = self.registry.resolve(&task.topic)?;

        let start = std::time::Instant::now();
        let result = Self::invoke(entry.handler.as_ref(), &task.value).await;
        metrics::histogram!(MESSAGE_HANDLE_DURATION_MS, "topic" => task.topic.clone())
            .record(start.elapsed().as_millis() as f64);

        let err = match result {
            Ok(()) => {
                metrics::counter!(MESSAGES_HANDLED, "topic" => task.topic.clone()).increment(1);
                return Ok(Outcome::Handled);
            }
            Err(err) => err,
        };

        metrics::counter!(MESSAGES_FAILED, "topic" => task.topic.clone()).increment(1);

        let Some(route) = &entry.dead_letter else {
            error!(
                topic = task.topic,
                partition = ?task.partition,
                offset = ?task.offset,
                error = ?err,
                "Error handling message and no dead-letter topic is defined, dropping it"
            );
            metrics::counter!(MESSAGES_DROPPED, "topic" => task.topic.clone()).increment(1);
            return Ok(Outcome::Dropped);
        };

        error!(
            topic = task.topic,
            partition = ?task.partition,
            offset = ?task.offset,
            dead_letter_topic = route.topic,
            error = ?err,
            "Error handling message, sending to dead-letter topic"
        );

        let record = DeadLetterRecord {
            headers: DeadLetterHeaders {
                partition: task.partition,
                offset: task.offset,
                topic: task.topic.clone(),
            },
            value: task.value,
        };

        self.publisher
            .publish(&route.topic, &record)
            .await
            .map_err(|source| FatalError::DeadLetterPublish {
                topic: record.headers.topic.clone(),
                dead_letter_topic: route.topic.clone(),
                source,
            })?;

        debug!(
            topic = record.headers.topic,
            dead_letter_topic = route.topic,
            "Message sent to dead-letter topic"
        );
        metrics::counter!(MESSAGES_DEAD_LETTERED, "topic" => record.headers.topic.clone())
            .increment(1);

        Ok(Outcome::DeadLettered {
            topic: route.topic.clone(),
        })
    }

    async fn invoke(handler: &dyn MessageHandler, payload: &[u8]) -> Result<(), HandleError> {
        let message: Value = serde_json::from_slice(payload)?;

        match AssertUnwindSafe(handler.handle(message)).catch_unwind().await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(HandleError::Handler(e)),
            Err(panic) => Err(HandleError::Panicked(panic_message(panic.as_ref()))),
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{
        catalog, router_with, FailingHandler, FailingPublisher, PanickingHandler,
        RecordingHandler, RecordingPublisher,
    };

    fn task(topic: &str, value: &[u8]) -> Task {
        Task {
            topic: topic.to_string(),
            value: value.to_vec(),
            partition: Some(1),
            offset: Some(99),
        }
    }

    #[tokio::test]
    async fn test_successful_message_is_handled() {
        let handler = Arc::new(RecordingHandler::default());
        let publisher = Arc::new(RecordingPublisher::default());
        let router = router_with(&catalog(), handler.clone(), publisher.clone());

        let outcome = router.handle(task("process", b"{\"id\": 1}")).await.unwrap();

        assert_eq!(outcome, Outcome::Handled);
        assert_eq!(handler.messages(), vec![serde_json::json!({"id": 1})]);
        assert!(publisher.published().is_empty());
    }

    #[tokio::test]
    async fn test_handler_failure_is_dead_lettered_with_original_bytes() {
        let publisher = Arc::new(RecordingPublisher::default());
        let router = router_with(&catalog(), Arc::new(FailingHandler), publisher.clone());

        let outcome = router.handle(task("process", b"{\"id\": 1}")).await.unwrap();

        assert_eq!(
            outcome,
            Outcome::DeadLettered {
                topic: "process-dead-letters".to_string()
            }
        );
        assert_eq!(
            publisher.published(),
            vec![(
                "process-dead-letters".to_string(),
                DeadLetterRecord {
                    value: b"{\"id\": 1}".to_vec(),
                    headers: DeadLetterHeaders {
                        partition: Some(1),
                        offset: Some(99),
                        topic: "process".to_string(),
                    },
                }
            )]
        );
    }

    #[tokio::test]
    async fn test_decode_failure_takes_the_dead_letter_path() {
        let handler = Arc::new(RecordingHandler::default());
        let publisher = Arc::new(RecordingPublisher::default());
        let router = router_with(&catalog(), handler.clone(), publisher.clone());

        let outcome = router.handle(task("process", b"{not json")).await.unwrap();

        assert!(matches!(outcome, Outcome::DeadLettered { .. }));
        assert!(handler.messages().is_empty());
        let published = publisher.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].1.value, b"{not json");
    }

    #[tokio::test]
    async fn test_failure_without_dead_letter_key_is_dropped() {
        let publisher = Arc::new(RecordingPublisher::default());
        let router = router_with(&catalog(), Arc::new(FailingHandler), publisher.clone());

        let outcome = router.handle(task("save", b"{}")).await.unwrap();

        assert_eq!(outcome, Outcome::Dropped);
        assert!(publisher.published().is_empty());
    }

    #[tokio::test]
    async fn test_handler_panic_is_recovered() {
        let publisher = Arc::new(RecordingPublisher::default());
        let router = router_with(&catalog(), Arc::new(PanickingHandler), publisher.clone());

        let outcome = router.handle(task("process", b"{}")).await.unwrap();

        assert!(matches!(outcome, Outcome::DeadLettered { .. }));
        assert_eq!(publisher.published().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_topic_is_never_dead_lettered() {
        let handler = Arc::new(RecordingHandler::default());
        let publisher = Arc::new(RecordingPublisher::default());
        let router = router_with(&catalog(), handler.clone(), publisher.clone());

        let err = router.handle(task("unknown", b"{\"id\": 1}")).await.unwrap_err();

        assert!(matches!(err, FatalError::UnknownTopic { .. }));
        assert!(handler.messages().is_empty());
        assert!(publisher.published().is_empty());
    }

    #[tokio::test]
    async fn test_publish_failure_is_fatal() {
        let router = router_with(
            &catalog(),
            Arc::new(FailingHandler),
            Arc::new(FailingPublisher),
        );

        let err = router.handle(task("process", b"{}")).await.unwrap_err();

        assert!(matches!(
            err,
            FatalError::DeadLetterPublish { topic, dead_letter_topic, .. }
                if topic == "process" && dead_letter_topic == "process-dead-letters"
        ));
    }
}
