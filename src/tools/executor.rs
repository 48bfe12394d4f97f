//! Tool registry and executor: dispatches the §6 RPC surface by name,
//! wrapping every call in a per-operation timeout (§4.3).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::engine::Engine;
use crate::error::ToolError;
use crate::tools::tool::{Tool, ToolOutput, ToolSchema};

/// Maximum per-call timeout regardless of what a tool requests.
const MAX_TIMEOUT: Duration = Duration::from_secs(60);

/// Registry of the 8 tool/RPC operations, looked up by name.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.tools.values().map(|t| t.schema()).collect()
    }
}

/// Result of a dispatched tool call, including timing for observability.
#[derive(Debug, Clone)]
pub struct ExecutedTool {
    pub output: ToolOutput,
    pub duration: Duration,
}

/// Standalone dispatcher used by every transport (stdio, HTTP, in-process
/// test harness) to invoke one of the 8 named operations against the engine.
pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
}

impl ToolExecutor {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }

    /// Look up a tool by name, execute it against the engine with a
    /// per-call timeout, and return its output.
    pub async fn execute(
        &self,
        tool_name: &str,
        params: serde_json::Value,
        engine: &Engine,
    ) -> Result<ExecutedTool, ToolError> {
        let start = Instant::now();

        let tool = self
            .registry
            .get(tool_name)
            .ok_or_else(|| ToolError::NotFound {
                name: tool_name.to_string(),
            })?;

        let timeout = tool.execution_timeout().min(MAX_TIMEOUT);

        debug!(tool = tool_name, ?timeout, "dispatching tool call");

        let result = tokio::time::timeout(timeout, tool.execute(params, engine))
            .await
            .map_err(|_| {
                warn!(tool = tool_name, ?timeout, "tool call timed out");
                ToolError::Cache(crate::error::CacheError::Timeout {
                    op: tool_name.to_string(),
                    timeout,
                })
            })?;

        let output = result?;
        Ok(ExecutedTool {
            output,
            duration: start.elapsed(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::tool::{require_str, RiskLevel};
    use async_trait::async_trait;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "echoes the 'message' parameter"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object", "properties": {"message": {"type": "string"}}})
        }
        async fn execute(
            &self,
            params: serde_json::Value,
            _engine: &Engine,
        ) -> Result<ToolOutput, ToolError> {
            let message = require_str(&params, "message")?;
            Ok(ToolOutput::success(
                serde_json::json!(message),
                Duration::from_millis(1),
            ))
        }
        fn risk_level(&self) -> RiskLevel {
            RiskLevel::Low
        }
    }

    #[test]
    fn registry_round_trips_by_name() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));
        assert!(registry.get("echo").is_some());
        assert!(registry.get("missing").is_none());
        assert_eq!(registry.schemas().len(), 1);
    }
}
