//! `search_memory` (§6).

use std::time::Instant;

use async_trait::async_trait;

use crate::engine::Engine;
use crate::error::ToolError;
use crate::model::Source;

use super::tool::{optional_str, optional_u64, require_str, RiskLevel, Tool, ToolOutput};

pub struct SearchMemoryTool;

#[async_trait]
impl Tool for SearchMemoryTool {
    fn name(&self) -> &str {
        "search_memory"
    }

    fn description(&self) -> &str {
        "Search memories, blending hot-cache keyword matches with cloud results"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {"type": "string"},
                "user_id": {"type": "string"},
                "limit": {"type": "integer", "default": 10},
                "prefer_cache": {"type": "boolean", "default": true},
            },
            "required": ["query"],
        })
    }

    async fn execute(&self, params: serde_json::Value, engine: &Engine) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let query = require_str(&params, "query")?;
        let user_id = optional_str(&params, "user_id", &engine.default_user_id);
        let limit = optional_u64(&params, "limit", 10) as usize;
        let prefer_cache = params.get("prefer_cache").and_then(|v| v.as_bool()).unwrap_or(true);

        let results = engine.search.search(user_id, query, limit, prefer_cache).await?;

        let hot = results.iter().filter(|m| m.source == Some(Source::Hot)).count();
        let cloud = results.iter().filter(|m| m.source == Some(Source::Cloud)).count();

        let result = serde_json::json!({
            "results": results,
            "counts": { "hot": hot, "cloud": cloud },
        });
        Ok(ToolOutput::success(result, start.elapsed()))
    }

    fn risk_level(&self) -> RiskLevel {
        RiskLevel::Low
    }
}
