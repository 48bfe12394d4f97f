//! `sync_status` (§6).

use std::time::Instant;

use async_trait::async_trait;

use crate::engine::Engine;
use crate::error::ToolError;

use super::tool::{RiskLevel, Tool, ToolOutput};

pub struct SyncStatusTool;

#[async_trait]
impl Tool for SyncStatusTool {
    fn name(&self) -> &str {
        "sync_status"
    }

    fn description(&self) -> &str {
        "Report the engine's operating mode, connectivity, and outstanding async work"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, _params: serde_json::Value, engine: &Engine) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let result = serde_json::json!({
            "mode": engine.degradation.current_mode().as_str(),
            "hot_connected": engine.degradation.hot_connected(),
            "cloud_connected": engine.degradation.cloud_connected(),
            "active_jobs": engine.pending_job_count(),
            "pending_memories": engine.pending_memory_count(),
        });
        Ok(ToolOutput::success(result, start.elapsed()))
    }

    fn risk_level(&self) -> RiskLevel {
        RiskLevel::Low
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[tokio::test]
    async fn reports_demo_mode_when_both_backends_absent() {
        let engine = Engine::bootstrap(Config::demo()).await.unwrap();
        let tool = SyncStatusTool;
        let output = tool.execute(serde_json::json!({}), &engine).await.unwrap();
        assert_eq!(output.result["mode"], "demo");
    }
}
