//! `add_memory` (§6).

use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::engine::Engine;
use crate::error::{ToolError, ValidationError};
use crate::model::{ChatMessage, Priority, WriteInput};
use crate::pipeline::{AddMemoryError, AddMemoryOutcome, AddMemoryParams};

use super::tool::{optional_str, ApprovalRequirement, RiskLevel, Tool, ToolOutput};

pub struct AddMemoryTool;

fn parse_input(params: &serde_json::Value) -> Result<WriteInput, ToolError> {
    if let Some(content) = params.get("content").and_then(|v| v.as_str()) {
        if content.trim().is_empty() {
            return Err(ValidationError::EmptyContent.into());
        }
        return Ok(WriteInput::Content(content.to_string()));
    }

    if let Some(messages) = params.get("messages").and_then(|v| v.as_array()) {
        let parsed: Result<Vec<ChatMessage>, ToolError> = messages
            .iter()
            .map(|m| {
                let role = m.get("role").and_then(|v| v.as_str()).unwrap_or("user").to_string();
                let content = m
                    .get("content")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| ToolError::InvalidParameters("message missing 'content'".into()))?
                    .to_string();
                Ok(ChatMessage { role, content })
            })
            .collect();
        return Ok(WriteInput::Messages(parsed?));
    }

    Err(ValidationError::MissingContent.into())
}

#[async_trait]
impl Tool for AddMemoryTool {
    fn name(&self) -> &str {
        "add_memory"
    }

    fn description(&self) -> &str {
        "Write a new memory, either immediately or as an async job, after a duplicate check"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "content": {"type": "string"},
                "messages": {"type": "array", "items": {"type": "object"}},
                "user_id": {"type": "string"},
                "metadata": {"type": "object"},
                "priority": {"type": "string", "enum": ["low", "medium", "high"], "default": "low"},
                "async": {"type": "boolean", "default": true},
                "skip_duplicate_check": {"type": "boolean", "default": false},
            },
            "required": [],
        })
    }

    async fn execute(&self, params: serde_json::Value, engine: &Engine) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let input = parse_input(&params)?;

        let user_id = optional_str(&params, "user_id", &engine.default_user_id).to_string();
        let priority_raw = optional_str(&params, "priority", "low");
        let priority: Priority = priority_raw.parse().map_err(ToolError::from)?;
        let async_mode = params.get("async").and_then(|v| v.as_bool()).unwrap_or(true);
        let skip_duplicate_check = params
            .get("skip_duplicate_check")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        let metadata = params
            .get("metadata")
            .and_then(|v| v.as_object())
            .map(|m| m.clone().into_iter().collect())
            .unwrap_or_default();

        let outcome = engine
            .pipeline
            .add_memory(AddMemoryParams {
                input,
                user_id,
                metadata,
                priority,
                async_mode,
                skip_duplicate_check,
            })
            .await
            .map_err(|e| match e {
                AddMemoryError::Duplicate(dup) => ToolError::Duplicate(dup),
                AddMemoryError::Cloud(err) => ToolError::Cloud(err),
            })?;

        let result = match outcome {
            AddMemoryOutcome::Accepted { job_id, accepted } => {
                serde_json::json!({ "jobId": job_id, "accepted": accepted })
            }
            AddMemoryOutcome::Immediate { memories } => {
                serde_json::json!({ "count": memories.len(), "memories": memories })
            }
        };

        Ok(ToolOutput::success(result, start.elapsed()))
    }

    fn risk_level(&self) -> RiskLevel {
        RiskLevel::Medium
    }

    fn requires_approval(&self) -> ApprovalRequirement {
        ApprovalRequirement::Never
    }

    fn execution_timeout(&self) -> Duration {
        Duration::from_secs(15)
    }
}
