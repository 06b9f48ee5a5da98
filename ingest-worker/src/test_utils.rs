//! Test doubles shared by unit tests and the integration tests in `tests/`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Semaphore;

use crate::dead_letter::{DeadLetterPublisher, DeadLetterRecord};
use crate::error::DeadLetterError;
use crate::registry::{DispatchRegistry, MessageHandler};
use crate::router::TaskRouter;
use crate::topics::{TopicCatalog, TopicDefinition};

pub const STAGE_KEYS: [&str; 3] = ["events-preprocess", "events-process", "events-save"];

/// `preprocess` and `process` have dead-letter routes, `save` has none.
pub fn catalog() -> TopicCatalog {
    let definition = |topic: &str, dead_letter_key: Option<&str>| TopicDefinition {
        topic: topic.to_string(),
        dead_letter_key: dead_letter_key.map(str::to_string),
    };

    TopicCatalog::new(HashMap::from([
        (
            "events-preprocess".to_string(),
            definition("preprocess", Some("preprocess-dead")),
        ),
        (
            "preprocess-dead".to_string(),
            definition("preprocess-dead-letters", None),
        ),
        (
            "events-process".to_string(),
            definition("process", Some("process-dead")),
        ),
        (
            "process-dead".to_string(),
            definition("process-dead-letters", None),
        ),
        ("events-save".to_string(), definition("save", None)),
    ]))
}

/// A router with `handler` registered for every stage topic.
pub fn router_with(
    catalog: &TopicCatalog,
    handler: Arc<dyn MessageHandler>,
    publisher: Arc<dyn DeadLetterPublisher>,
) -> TaskRouter {
    let registry = DispatchRegistry::build(
        catalog,
        STAGE_KEYS.iter().map(|key| (*key, handler.clone())),
    )
    .expect("test catalog defines every stage");
    TaskRouter::new(Arc::new(registry), publisher)
}

pub struct NoopHandler;

#[async_trait]
impl MessageHandler for NoopHandler {
    async fn handle(&self, _message: Value) -> anyhow::Result<()> {
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingHandler {
    messages: Mutex<Vec<Value>>,
}

impl RecordingHandler {
    pub fn messages(&self) -> Vec<Value> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageHandler for RecordingHandler {
    async fn handle(&self, message: Value) -> anyhow::Result<()> {
        self.messages.lock().unwrap().push(message);
        Ok(())
    }
}

pub struct FailingHandler;

#[async_trait]
impl MessageHandler for FailingHandler {
    async fn handle(&self, _message: Value) -> anyhow::Result<()> {
        Err(anyhow!("simulated handler failure"))
    }
}

pub struct PanickingHandler;

#[async_trait]
impl MessageHandler for PanickingHandler {
    async fn handle(&self, _message: Value) -> anyhow::Result<()> {
        panic!("simulated handler panic");
    }
}

/// Fails messages whose JSON has `"fail": true`, succeeds otherwise.
pub struct SelectiveHandler;

#[async_trait]
impl MessageHandler for SelectiveHandler {
    async fn handle(&self, message: Value) -> anyhow::Result<()> {
        if message.get("fail").and_then(Value::as_bool) == Some(true) {
            return Err(anyhow!("message asked to fail"));
        }
        Ok(())
    }
}

/// Counts calls and, when closed, blocks each call until released.
pub struct GatedHandler {
    gate: Option<Semaphore>,
    delay: Duration,
    started: AtomicUsize,
    completed: AtomicUsize,
}

impl GatedHandler {
    /// Never blocks, only sleeps for `delay` per message.
    pub fn open(delay: Duration) -> Self {
        Self {
            gate: None,
            delay,
            started: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
        }
    }

    /// Blocks every message until [`GatedHandler::release`] lets it through.
    pub fn closed() -> Self {
        Self {
            gate: Some(Semaphore::new(0)),
            delay: Duration::ZERO,
            started: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
        }
    }

    pub fn release(&self, messages: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(messages);
        }
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessageHandler for GatedHandler {
    async fn handle(&self, _message: Value) -> anyhow::Result<()> {
        self.started.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.acquire().await?.forget();
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.completed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingPublisher {
    published: Mutex<Vec<(String, DeadLetterRecord)>>,
}

impl RecordingPublisher {
    pub fn published(&self) -> Vec<(String, DeadLetterRecord)> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeadLetterPublisher for RecordingPublisher {
    async fn publish(&self, topic: &str, record: &DeadLetterRecord) -> Result<(), DeadLetterError> {
        self.published
            .lock()
            .unwrap()
            .push((topic.to_string(), record.clone()));
        Ok(())
    }
}

pub struct FailingPublisher;

#[async_trait]
impl DeadLetterPublisher for FailingPublisher {
    async fn publish(&self, _topic: &str, _record: &DeadLetterRecord) -> Result<(), DeadLetterError> {
        Err(DeadLetterError::Unavailable(
            "simulated broker outage".to_string(),
        ))
    }
}
