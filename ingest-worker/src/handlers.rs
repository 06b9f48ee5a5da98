use anyhow::{bail, Context};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::registry::MessageHandler;

const STORE_TASKS_ACCEPTED: &str = "ingest_worker_store_tasks_accepted_total";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Preprocess,
    Process,
    Save,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Preprocess => "preprocess",
            Stage::Process => "process",
            Stage::Save => "save",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventData {
    pub event_id: String,
    #[serde(default)]
    pub project: Option<u64>,
}

/// Envelope shared by the preprocess, process and save topics.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreTaskMessage {
    pub data: EventData,
    pub cache_key: String,
    pub start_time: f64,
    pub from_reprocessing: bool,
}

/// Validates the store-task envelope for one pipeline stage and hands it on.
/// Malformed envelopes fail, which sends them down the dead-letter path.
pub struct StageHandler {
    stage: Stage,
}

impl StageHandler {
    pub fn new(stage: Stage) -> Self {
        Self { stage }
    }
}

#[async_trait]
impl MessageHandler for StageHandler {
    async fn handle(&self, message: Value) -> anyhow::Result<()> {
        let task: StoreTaskMessage = serde_json::from_value(message)
            .with_context(|| format!("invalid {} task", self.stage.as_str()))?;

        if self.stage == Stage::Save && task.data.project.is_none() {
            bail!("save task for event {} has no project", task.data.event_id);
        }

        debug!(
            stage = self.stage.as_str(),
            event_id = task.data.event_id,
            cache_key = task.cache_key,
            from_reprocessing = task.from_reprocessing,
            "Accepted store task"
        );
        metrics::counter!(STORE_TASKS_ACCEPTED, "stage" => self.stage.as_str()).increment(1);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope() -> Value {
        json!({
            "data": { "event_id": "a1b2", "project": 42 },
            "cache_key": "e:a1b2:42",
            "start_time": 1700000000.5,
            "from_reprocessing": false,
        })
    }

    #[tokio::test]
    async fn test_accepts_valid_envelope_for_every_stage() {
        for stage in [Stage::Preprocess, Stage::Process, Stage::Save] {
            StageHandler::new(stage).handle(envelope()).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_rejects_missing_fields() {
        let mut message = envelope();
        message.as_object_mut().unwrap().remove("cache_key");

        let err = StageHandler::new(Stage::Process)
            .handle(message)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("invalid process task"));
    }

    #[tokio::test]
    async fn test_save_requires_project() {
        let mut message = envelope();
        message["data"].as_object_mut().unwrap().remove("project");

        StageHandler::new(Stage::Preprocess)
            .handle(message.clone())
            .await
            .unwrap();
        let err = StageHandler::new(Stage::Save)
            .handle(message)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("has no project"));
    }
}
