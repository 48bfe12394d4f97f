//! Core data model (§3 DATA MODEL).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Provenance of a `Memory` attached transiently on read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Hot,
    Cloud,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Hot => "hot",
            Source::Cloud => "cloud",
        }
    }
}

/// The fundamental record. `source` and `relevance_score` are transient —
/// attached on read/search, never persisted as part of the cached payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    pub id: String,
    pub content: String,
    pub user_id: String,
    pub created_at: String,
    pub updated_at: String,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub source: Option<Source>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub relevance_score: Option<f64>,
}

impl Memory {
    /// Strip the transient read-time fields before writing back to the
    /// hot store, so cached payloads don't drift based on who last read them.
    pub fn for_cache(&self) -> Memory {
        Memory {
            source: None,
            relevance_score: None,
            ..self.clone()
        }
    }

    pub fn with_source(mut self, source: Source) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_relevance_score(mut self, score: f64) -> Self {
        self.relevance_score = Some(score);
        self
    }
}

/// One message in a `messages`-shaped write input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// Normalized shape of an `add_memory` input's text payload (§9: "Dynamic
/// message shapes... model as a tagged variant").
#[derive(Debug, Clone)]
pub enum WriteInput {
    Content(String),
    Messages(Vec<ChatMessage>),
}

impl WriteInput {
    /// The text used both for the cloud write and for duplicate comparison
    /// (§4.5 step 1: "raw content or the concatenation of message contents").
    pub fn comparison_text(&self) -> String {
        match self {
            WriteInput::Content(text) => text.clone(),
            WriteInput::Messages(messages) => messages
                .iter()
                .map(|m| m.content.as_str())
                .collect::<Vec<_>>()
                .join(" "),
        }
    }
}

/// Priority hint on a write, driving cache placement (§4.3) and the
/// eager-cache branch of the write pipeline (§4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl std::str::FromStr for Priority {
    type Err = crate::error::ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            other => Err(crate::error::ValidationError::InvalidPriority(
                other.to_string(),
            )),
        }
    }
}
