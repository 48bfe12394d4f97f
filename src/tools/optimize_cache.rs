//! `optimize_cache` (§6): refresh the hot cache from the cloud, eagerly
//! re-populating L1 when `force_refresh` is set.

use std::time::Instant;

use async_trait::async_trait;

use crate::engine::Engine;
use crate::error::ToolError;

use super::tool::{ApprovalRequirement, RiskLevel, Tool, ToolOutput};

pub struct OptimizeCacheTool;

const DEFAULT_MAX_MEMORIES: u64 = 1_000;

#[async_trait]
impl Tool for OptimizeCacheTool {
    fn name(&self) -> &str {
        "optimize_cache"
    }

    fn description(&self) -> &str {
        "Re-populate the hot cache from the cloud backend, optionally forcing everything into L1"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "force_refresh": {"type": "boolean", "default": false},
                "max_memories": {"type": "integer", "default": 1000},
            },
            "required": [],
        })
    }

    async fn execute(&self, params: serde_json::Value, engine: &Engine) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let force_refresh = params.get("force_refresh").and_then(|v| v.as_bool()).unwrap_or(false);
        let max_memories = params
            .get("max_memories")
            .and_then(|v| v.as_u64())
            .unwrap_or(DEFAULT_MAX_MEMORIES) as usize;

        if force_refresh {
            // §8 S5: a shrinking re-population must not leave `memory:*`
            // entries from the previous generation behind.
            engine.cache.wipe().await?;
        }

        let memories = engine.cloud.list_all(&engine.default_user_id, max_memories).await?;
        let report = engine.cache.batch_set(&memories, force_refresh).await?;

        let (l1_count, l2_count) = if force_refresh {
            (report.succeeded, 0)
        } else {
            (0, report.succeeded)
        };

        let result = serde_json::json!({
            "cached": report.succeeded,
            "l1Count": l1_count,
            "l2Count": l2_count,
        });
        Ok(ToolOutput::success(result, start.elapsed()))
    }

    fn risk_level(&self) -> RiskLevel {
        RiskLevel::Medium
    }

    fn requires_approval(&self) -> ApprovalRequirement {
        ApprovalRequirement::Never
    }
}
