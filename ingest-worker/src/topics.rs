use std::collections::HashMap;
use std::str::FromStr;

use serde::Deserialize;

use crate::error::ConfigError;

/// One entry of the topic catalog, keyed by its topic key.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TopicDefinition {
    pub topic: String,

    #[serde(rename = "dead-letter-key", default)]
    pub dead_letter_key: Option<String>,
}

/// Maps topic keys to concrete topic names and their dead-letter keys.
///
/// Parsed from JSON shaped like:
///
/// ```json
/// {
///   "events-process": { "topic": "events-process", "dead-letter-key": "events-process-dead" },
///   "events-process-dead": { "topic": "events-process-dead" }
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct TopicCatalog {
    topics: HashMap<String, TopicDefinition>,
}

impl TopicCatalog {
    pub fn new(topics: HashMap<String, TopicDefinition>) -> Self {
        Self { topics }
    }

    pub fn get(&self, key: &str) -> Option<&TopicDefinition> {
        self.topics.get(key)
    }

    /// Dead-letter key configured for a topic name, if any.
    pub fn dead_letter_key_for(&self, topic: &str) -> Option<&str> {
        self.topics
            .values()
            .find(|definition| definition.topic == topic)
            .and_then(|definition| definition.dead_letter_key.as_deref())
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }
}

impl FromStr for TopicCatalog {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(serde_json::from_str(s)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG: &str = r#"{
        "events-process": { "topic": "ingest-process", "dead-letter-key": "events-process-dead" },
        "events-process-dead": { "topic": "ingest-process-dead" },
        "events-save": { "topic": "ingest-save" }
    }"#;

    #[test]
    fn test_parse_catalog() {
        let catalog: TopicCatalog = CATALOG.parse().unwrap();

        assert_eq!(catalog.len(), 3);
        assert_eq!(
            catalog.get("events-process"),
            Some(&TopicDefinition {
                topic: "ingest-process".to_string(),
                dead_letter_key: Some("events-process-dead".to_string()),
            })
        );
        assert_eq!(catalog.get("events-save").unwrap().dead_letter_key, None);
        assert!(catalog.get("events-preprocess").is_none());
    }

    #[test]
    fn test_dead_letter_key_lookup_is_by_topic_name() {
        let catalog: TopicCatalog = CATALOG.parse().unwrap();

        assert_eq!(
            catalog.dead_letter_key_for("ingest-process"),
            Some("events-process-dead")
        );
        // Keys are not topic names
        assert_eq!(catalog.dead_letter_key_for("events-process"), None);
        assert_eq!(catalog.dead_letter_key_for("ingest-save"), None);
    }

    #[test]
    fn test_malformed_catalog() {
        let result = "{\"events-save\": {}}".parse::<TopicCatalog>();
        assert!(matches!(result, Err(ConfigError::MalformedCatalog(_))));

        let result = "not json".parse::<TopicCatalog>();
        assert!(matches!(result, Err(ConfigError::MalformedCatalog(_))));
    }
}
