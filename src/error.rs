//! Error types for the memory cache gateway.

use std::time::Duration;

use uuid::Uuid;

/// Top-level error type for the engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Hot store error: {0}")]
    HotStore(#[from] HotStoreError),

    #[error("Cloud error: {0}")]
    Cloud(#[from] CloudError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Job error: {0}")]
    Job(#[from] JobError),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required config '{key}': {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("failed to read configuration: {0}")]
    ParseError(String),
}

/// Hot-store (C1) errors.
///
/// `Unavailable` is the one variant callers MUST NOT surface to end users
/// without the degradation controller's consent (spec §4.1); everything
/// upstream treats it as "serve from cloud instead".
#[derive(Debug, Clone, thiserror::Error)]
pub enum HotStoreError {
    #[error("hot store unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("hot store operation '{op}' failed: {reason}")]
    Operation { op: String, reason: String },

    #[error("hot store returned malformed data for key {key}: {reason}")]
    Malformed { key: String, reason: String },
}

/// Cloud memory API (C2) errors, carrying an HTTP-like status category.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CloudError {
    #[error("client error ({status}): {message}")]
    Client { status: u16, message: String },

    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("malformed response: {0}")]
    InvalidResponse(String),

    #[error("memory {id} not found for user {user_id}")]
    NotFound { user_id: String, id: String },
}

impl CloudError {
    /// Whether a retry is worth attempting for this error (§4.2: retryable
    /// categories are `ServerError` and `Network`; `ClientError`/`Auth` are not).
    pub fn is_retryable(&self) -> bool {
        matches!(self, CloudError::Server { .. } | CloudError::Network(_))
    }
}

/// Cache manager (C3) errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CacheError {
    #[error("cache operation '{op}' timed out after {timeout:?}")]
    Timeout { op: String, timeout: Duration },

    #[error("cache operation '{op}' failed: {reason}")]
    Operation { op: String, reason: String },

    #[error("{0}")]
    HotStore(#[from] HotStoreError),
}

/// Job queue / pub-sub (C4) errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum JobError {
    #[error("job {id} not found")]
    NotFound { id: Uuid },

    #[error("job {id} timed out after {timeout:?}")]
    Timeout { id: Uuid, timeout: Duration },

    #[error("too many pending jobs (max {max})")]
    QueueFull { max: usize },
}

/// Duplicate-write rejection (§4.5, §4.8). Not a retryable failure — it is
/// the expected, successful outcome of the duplicate gate catching a match.
#[derive(Debug, Clone, thiserror::Error)]
#[error("duplicate of memory {existing_id} (similarity {similarity:.3})")]
pub struct DuplicateMemory {
    pub existing_id: String,
    pub similarity: f64,
}

/// Write-pipeline input validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ValidationError {
    #[error("either 'content' or 'messages' must be provided")]
    MissingContent,

    #[error("invalid priority '{0}', expected low|medium|high")]
    InvalidPriority(String),

    #[error("empty content after normalizing input")]
    EmptyContent,
}

/// Tool-call surface (§6) errors — the only error type that reaches callers
/// at the RPC boundary, carrying a code + short message per §7.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ToolError {
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("{0}")]
    Duplicate(#[from] DuplicateMemory),

    #[error("{0}")]
    Cloud(#[from] CloudError),

    #[error("{0}")]
    Cache(#[from] CacheError),

    #[error("{0}")]
    Job(#[from] JobError),

    #[error("tool '{name}' not found")]
    NotFound { name: String },
}

impl ToolError {
    /// Stable short code surfaced alongside the message (§7: "a structured
    /// error with a code and a short message").
    pub fn code(&self) -> &'static str {
        match self {
            ToolError::InvalidParameters(_) => "validation_error",
            ToolError::Validation(_) => "validation_error",
            ToolError::Duplicate(_) => "duplicate_memory",
            ToolError::Cloud(CloudError::Client { .. }) => "cloud_client_error",
            ToolError::Cloud(CloudError::Server { .. }) => "cloud_server_error",
            ToolError::Cloud(CloudError::Network(_)) => "cloud_network_error",
            ToolError::Cloud(CloudError::Auth(_)) => "cloud_auth_error",
            ToolError::Cloud(CloudError::InvalidResponse(_)) => "cloud_invalid_response",
            ToolError::Cloud(CloudError::NotFound { .. }) => "memory_not_found",
            ToolError::Cache(CacheError::Timeout { .. }) => "cache_timeout",
            ToolError::Cache(_) => "cache_error",
            ToolError::Job(JobError::Timeout { .. }) => "job_timeout",
            ToolError::Job(_) => "job_error",
            ToolError::NotFound { .. } => "tool_not_found",
        }
    }
}

/// Flatten the top-level engine error into the tool-boundary error type
/// (§7: "the engine never throws opaque stack traces at the tool boundary").
impl From<Error> for ToolError {
    fn from(e: Error) -> Self {
        match e {
            Error::Cloud(e) => ToolError::Cloud(e),
            Error::Cache(e) => ToolError::Cache(e),
            Error::Job(e) => ToolError::Job(e),
            Error::Tool(e) => e,
            Error::Config(e) => ToolError::InvalidParameters(e.to_string()),
            Error::HotStore(e) => ToolError::Cache(CacheError::Operation {
                op: "hotstore".to_string(),
                reason: e.to_string(),
            }),
        }
    }
}

/// Result type alias for the engine.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cloud_error_retryable_classification() {
        assert!(CloudError::Server {
            status: 503,
            message: "down".into()
        }
        .is_retryable());
        assert!(CloudError::Network("timeout".into()).is_retryable());
        assert!(!CloudError::Client {
            status: 400,
            message: "bad".into()
        }
        .is_retryable());
        assert!(!CloudError::Auth("no key".into()).is_retryable());
    }

    #[test]
    fn tool_error_codes_are_stable() {
        assert_eq!(
            ToolError::Duplicate(DuplicateMemory {
                existing_id: "m1".into(),
                similarity: 0.9
            })
            .code(),
            "duplicate_memory"
        );
        assert_eq!(
            ToolError::Job(JobError::Timeout {
                id: Uuid::nil(),
                timeout: Duration::from_secs(30)
            })
            .code(),
            "job_timeout"
        );
        assert_eq!(
            ToolError::Cache(CacheError::Timeout {
                op: "get".into(),
                timeout: Duration::from_secs(5)
            })
            .code(),
            "cache_timeout"
        );
    }

    #[test]
    fn duplicate_memory_display_includes_similarity() {
        let err = DuplicateMemory {
            existing_id: "mem-42".into(),
            similarity: 0.87,
        };
        let msg = err.to_string();
        assert!(msg.contains("mem-42"));
        assert!(msg.contains("0.87"));
    }

    #[test]
    fn top_level_error_from_conversions() {
        let e: Error = HotStoreError::Unavailable {
            reason: "conn refused".into(),
        }
        .into();
        assert!(matches!(e, Error::HotStore(_)));
    }
}
