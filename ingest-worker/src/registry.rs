use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{ConfigError, FatalError};
use crate::topics::TopicCatalog;

/// Business logic for one topic. The worker only cares whether it succeeds.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: Value) -> anyhow::Result<()>;
}

/// Where failed messages from a topic are republished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetterRoute {
    pub key: String,
    pub topic: String,
}

pub struct RegistryEntry {
    pub handler: Arc<dyn MessageHandler>,
    pub dead_letter: Option<DeadLetterRoute>,
}

impl fmt::Debug for RegistryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryEntry")
            .field("dead_letter", &self.dead_letter)
            .finish_non_exhaustive()
    }
}

/// Immutable topic -> handler table, built once at startup and shared by
/// every executor.
#[derive(Debug)]
pub struct DispatchRegistry {
    entries: HashMap<String, RegistryEntry>,
}

impl DispatchRegistry {
    /// Resolves every topic key through the catalog. Any key the catalog does
    /// not know is a configuration error, including dead-letter keys.
    pub fn build<'a, I>(catalog: &TopicCatalog, roles: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (&'a str, Arc<dyn MessageHandler>)>,
    {
        let mut entries = HashMap::new();

        for (key, handler) in roles {
            let definition = catalog
                .get(key)
                .ok_or_else(|| ConfigError::MissingTopicKey {
                    key: key.to_string(),
                })?;

            let dead_letter = match &definition.dead_letter_key {
                Some(dead_letter_key) => {
                    let dead_letter_topic = catalog.get(dead_letter_key).ok_or_else(|| {
                        ConfigError::MissingDeadLetterTopic {
                            topic: definition.topic.clone(),
                            dead_letter_key: dead_letter_key.clone(),
                        }
                    })?;
                    Some(DeadLetterRoute {
                        key: dead_letter_key.clone(),
                        topic: dead_letter_topic.topic.clone(),
                    })
                }
                None => None,
            };

            if entries.contains_key(&definition.topic) {
                return Err(ConfigError::DuplicateTopic {
                    topic: definition.topic.clone(),
                });
            }

            entries.insert(
                definition.topic.clone(),
                RegistryEntry {
                    handler,
                    dead_letter,
                },
            );
        }

        Ok(Self { entries })
    }

    pub fn resolve(&self, topic: &str) -> Result<&RegistryEntry, FatalError> {
        self.entries
            .get(topic)
            .ok_or_else(|| FatalError::UnknownTopic {
                topic: topic.to_string(),
            })
    }

    pub fn topics(&self) -> Vec<&str> {
        let mut topics: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        topics.sort_unstable();
        topics
    }
}
