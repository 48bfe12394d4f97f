//! Tool trait and types for the RPC surface (§6 EXTERNAL INTERFACES).

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::engine::Engine;
use crate::error::ToolError;

/// Risk level of a tool invocation, surfaced for audit logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RiskLevel {
    /// Read-only (search, get, stats).
    Low,
    /// Mutates cache/cloud state but is reversible (add, deduplicate).
    Medium,
    /// Destructive or hard to reverse (delete, optimize_cache eviction).
    High,
}

/// How much approval a specific tool invocation requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalRequirement {
    Never,
    UnlessAutoApproved,
    Always,
}

impl ApprovalRequirement {
    pub fn is_required(&self) -> bool {
        !matches!(self, Self::Never)
    }
}

/// Per-tool rate limit, used by the executor to throttle destructive calls.
#[derive(Debug, Clone)]
pub struct ToolRateLimitConfig {
    pub requests_per_minute: u32,
    pub requests_per_hour: u32,
}

impl ToolRateLimitConfig {
    pub fn new(requests_per_minute: u32, requests_per_hour: u32) -> Self {
        Self {
            requests_per_minute,
            requests_per_hour,
        }
    }
}

impl Default for ToolRateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 60,
            requests_per_hour: 1000,
        }
    }
}

/// Whether a tool error is worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolErrorKind {
    Transient,
    Permanent,
}

impl ToolError {
    /// Classify this error as transient or permanent for retry decisions.
    pub fn kind(&self) -> ToolErrorKind {
        match self {
            ToolError::Cloud(e) if e.is_retryable() => ToolErrorKind::Transient,
            ToolError::Cache(crate::error::CacheError::Timeout { .. }) => ToolErrorKind::Transient,
            ToolError::Job(crate::error::JobError::Timeout { .. }) => ToolErrorKind::Transient,
            _ => ToolErrorKind::Permanent,
        }
    }
}

/// Retry configuration for tool execution.
#[derive(Debug, Clone)]
pub struct ToolRetryConfig {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for ToolRetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl ToolRetryConfig {
    pub fn max_retries_for(&self, error: &ToolError) -> u32 {
        match error.kind() {
            ToolErrorKind::Transient => self.max_retries,
            ToolErrorKind::Permanent => 0,
        }
    }
}

/// Exponential backoff delay with jitter for tool retries.
pub fn tool_retry_delay(attempt: u32, config: &ToolRetryConfig) -> Duration {
    let base_ms = config.base_delay.as_millis() as u64;
    let exp_ms = base_ms.saturating_mul(2u64.saturating_pow(attempt));
    let capped_ms = exp_ms.min(config.max_delay.as_millis() as u64);
    let jitter_range = capped_ms / 4;
    let jitter = if jitter_range > 0 {
        let offset = rand::thread_rng().gen_range(0..=jitter_range * 2);
        offset as i64 - jitter_range as i64
    } else {
        0
    };
    Duration::from_millis((capped_ms as i64 + jitter).max(50) as u64)
}

/// Output from a tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutput {
    pub result: serde_json::Value,
    pub duration: Duration,
}

impl ToolOutput {
    pub fn success(result: serde_json::Value, duration: Duration) -> Self {
        Self { result, duration }
    }
}

/// Definition of a tool's parameters using JSON Schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// A single operation in the §6 EXTERNAL INTERFACES surface.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute against the engine. Callers MUST wrap this in a per-call
    /// timeout (every public operation in §4.3's note) — the executor in
    /// `tools::executor` does so uniformly rather than each tool doing it.
    async fn execute(&self, params: serde_json::Value, engine: &Engine) -> Result<ToolOutput, ToolError>;

    fn risk_level(&self) -> RiskLevel {
        RiskLevel::Low
    }

    fn requires_approval(&self) -> ApprovalRequirement {
        ApprovalRequirement::Never
    }

    /// Maximum time this tool is allowed to run before the caller kills it.
    fn execution_timeout(&self) -> Duration {
        Duration::from_secs(10)
    }

    fn rate_limit_config(&self) -> Option<ToolRateLimitConfig> {
        None
    }

    fn retry_config(&self) -> ToolRetryConfig {
        ToolRetryConfig::default()
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// Extract a required string parameter from a JSON object.
pub fn require_str<'a>(params: &'a serde_json::Value, name: &str) -> Result<&'a str, ToolError> {
    params
        .get(name)
        .and_then(|v| v.as_str())
        .ok_or_else(|| ToolError::InvalidParameters(format!("missing '{name}' parameter")))
}

/// Extract a required parameter of any type from a JSON object.
pub fn require_param<'a>(
    params: &'a serde_json::Value,
    name: &str,
) -> Result<&'a serde_json::Value, ToolError> {
    params
        .get(name)
        .ok_or_else(|| ToolError::InvalidParameters(format!("missing '{name}' parameter")))
}

/// Extract an optional string parameter, defaulting if absent.
pub fn optional_str<'a>(params: &'a serde_json::Value, name: &str, default: &'a str) -> &'a str {
    params.get(name).and_then(|v| v.as_str()).unwrap_or(default)
}

/// Extract an optional u64 parameter, defaulting if absent.
pub fn optional_u64(params: &serde_json::Value, name: &str, default: u64) -> u64 {
    params.get(name).and_then(|v| v.as_u64()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn require_str_present() {
        let params = serde_json::json!({"name": "alice"});
        assert_eq!(require_str(&params, "name").unwrap(), "alice");
    }

    #[test]
    fn require_str_missing() {
        let params = serde_json::json!({});
        let err = require_str(&params, "name").unwrap_err();
        assert!(err.to_string().contains("missing 'name'"));
    }

    #[test]
    fn require_str_wrong_type() {
        let params = serde_json::json!({"name": 42});
        let err = require_str(&params, "name").unwrap_err();
        assert!(err.to_string().contains("missing 'name'"));
    }

    #[test]
    fn optional_str_uses_default_when_absent() {
        let params = serde_json::json!({});
        assert_eq!(optional_str(&params, "priority", "medium"), "medium");
    }

    #[test]
    fn optional_u64_uses_default_when_absent() {
        let params = serde_json::json!({});
        assert_eq!(optional_u64(&params, "limit", 10), 10);
        let params = serde_json::json!({"limit": 5});
        assert_eq!(optional_u64(&params, "limit", 10), 5);
    }

    #[test]
    fn tool_retry_delay_grows_with_attempt() {
        let cfg = ToolRetryConfig {
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
            max_retries: 3,
        };
        for _ in 0..10 {
            let d0 = tool_retry_delay(0, &cfg);
            assert!(d0.as_millis() >= 150 && d0.as_millis() <= 250, "{:?}", d0);
            let d2 = tool_retry_delay(2, &cfg);
            assert!(d2.as_millis() >= 600 && d2.as_millis() <= 1400, "{:?}", d2);
        }
    }
}
