//! `delete_memory` (§6).

use std::time::Instant;

use async_trait::async_trait;

use crate::engine::Engine;
use crate::error::ToolError;

use super::tool::{optional_str, require_str, ApprovalRequirement, RiskLevel, Tool, ToolOutput};

pub struct DeleteMemoryTool;

#[async_trait]
impl Tool for DeleteMemoryTool {
    fn name(&self) -> &str {
        "delete_memory"
    }

    fn description(&self) -> &str {
        "Delete a memory from the cloud backend and fan out the cache invalidation"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "memory_id": {"type": "string"},
                "user_id": {"type": "string"},
            },
            "required": ["memory_id"],
        })
    }

    async fn execute(&self, params: serde_json::Value, engine: &Engine) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let memory_id = require_str(&params, "memory_id")?;
        let user_id = optional_str(&params, "user_id", &engine.default_user_id);

        engine.pipeline.delete_memory(user_id, memory_id).await?;

        Ok(ToolOutput::success(serde_json::json!({ "ok": true }), start.elapsed()))
    }

    fn risk_level(&self) -> RiskLevel {
        RiskLevel::High
    }

    fn requires_approval(&self) -> ApprovalRequirement {
        ApprovalRequirement::UnlessAutoApproved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[tokio::test]
    async fn deletes_an_existing_memory() {
        let engine = Engine::bootstrap(Config::demo()).await.unwrap();
        let add = serde_json::json!({"content": "to be deleted", "async": false});
        let added = crate::tools::AddMemoryTool.execute(add, &engine).await.unwrap();
        let id = added.result["memories"][0]["id"].as_str().unwrap().to_string();

        let tool = DeleteMemoryTool;
        let output = tool
            .execute(serde_json::json!({"memory_id": id}), &engine)
            .await
            .unwrap();
        assert_eq!(output.result["ok"], true);
    }

    #[tokio::test]
    async fn missing_memory_id_is_invalid_parameters() {
        let engine = Engine::bootstrap(Config::demo()).await.unwrap();
        let err = DeleteMemoryTool.execute(serde_json::json!({}), &engine).await.unwrap_err();
        assert_eq!(err.code(), "validation_error");
    }
}
