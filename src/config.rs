//! Configuration for the memory cache gateway.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use crate::error::ConfigError;

/// Top-level configuration, assembled from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub cloud: CloudConfig,
    pub hot_store: HotStoreConfig,
    pub cache: CacheConfig,
    pub async_pipeline: AsyncConfig,
    pub sync: SyncConfig,
    pub mode: ModeConfig,
}

impl Config {
    /// Load configuration from environment variables, with a `.env` file
    /// loaded first if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        Ok(Self {
            cloud: CloudConfig::from_env()?,
            hot_store: HotStoreConfig::from_env()?,
            cache: CacheConfig::from_env()?,
            async_pipeline: AsyncConfig::from_env()?,
            sync: SyncConfig::from_env()?,
            mode: ModeConfig::from_env()?,
        })
    }

    /// Self-contained configuration for the demo/offline mode: no
    /// environment variables are read, so it is safe to use from tests and
    /// from `engine serve --mode demo` alike.
    pub fn demo() -> Self {
        Self {
            cloud: CloudConfig {
                base_url: "https://api.mem0.ai".to_string(),
                api_key: SecretString::from(String::new()),
                user_id: "default".to_string(),
                request_timeout: Duration::from_millis(10_000),
            },
            hot_store: HotStoreConfig {
                url: SecretString::from("redis://127.0.0.1:6399".to_string()),
                connect_timeout: Duration::from_millis(200),
                reconnect_initial_backoff: Duration::from_millis(100),
                reconnect_max_backoff: Duration::from_secs(30),
            },
            cache: CacheConfig {
                l1_ttl: Duration::from_secs(86_400),
                l2_ttl: Duration::from_secs(604_800),
                search_ttl: Duration::from_secs(300),
                max_size: 1_000,
                frequent_access_threshold: 3,
                operation_timeout: Duration::from_secs(5),
            },
            async_pipeline: AsyncConfig {
                job_timeout: Duration::from_secs(30),
                max_pending_jobs: 10_000,
                max_concurrent_writes: 16,
            },
            sync: SyncConfig {
                interval: Duration::from_secs(60),
            },
            mode: ModeConfig {
                startup_override: Some(OperatingModeHint::Demo),
            },
        }
    }
}

/// Cloud vector-memory backend credentials and endpoint (C2).
#[derive(Clone)]
pub struct CloudConfig {
    pub base_url: String,
    pub api_key: SecretString,
    pub user_id: String,
    pub request_timeout: Duration,
}

impl std::fmt::Debug for CloudConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("user_id", &self.user_id)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl CloudConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let base_url = optional_env("CLOUD_BASE_URL")?.unwrap_or_else(|| {
            "https://api.mem0.ai".to_string()
        });

        let api_key = optional_env("CLOUD_API_KEY")?.ok_or_else(|| ConfigError::MissingRequired {
            key: "CLOUD_API_KEY".to_string(),
            hint: "set CLOUD_API_KEY, or set MODE=demo to run without a cloud backend"
                .to_string(),
        });
        // Demo mode tolerates a missing key; the degradation controller
        // decides whether cloud calls are attempted at all (§9 C9).
        let api_key = match api_key {
            Ok(key) => key,
            Err(err) => {
                if matches!(ModeConfig::peek_env()?, Some(OperatingModeHint::Demo)) {
                    String::new()
                } else {
                    return Err(err);
                }
            }
        };

        let user_id = optional_env("CLOUD_USER_ID")?.unwrap_or_else(|| "default".to_string());

        let request_timeout_ms: u64 = parse_optional_env("CLOUD_REQUEST_TIMEOUT_MS", 10_000)?;

        Ok(Self {
            base_url,
            api_key: SecretString::from(api_key),
            user_id,
            request_timeout: Duration::from_millis(request_timeout_ms),
        })
    }

    pub fn api_key(&self) -> &str {
        self.api_key.expose_secret()
    }
}

/// Hot-store (Redis-compatible) connection settings (C1).
#[derive(Debug, Clone)]
pub struct HotStoreConfig {
    pub url: SecretString,
    pub connect_timeout: Duration,
    pub reconnect_initial_backoff: Duration,
    pub reconnect_max_backoff: Duration,
}

impl HotStoreConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let url = optional_env("HOTSTORE_URL")?.unwrap_or_else(|| "redis://127.0.0.1:6379".to_string());

        let connect_timeout_ms: u64 = parse_optional_env("HOTSTORE_CONNECT_TIMEOUT_MS", 2_000)?;
        let reconnect_initial_ms: u64 =
            parse_optional_env("HOTSTORE_RECONNECT_INITIAL_MS", 100)?;
        let reconnect_max_ms: u64 = parse_optional_env("HOTSTORE_RECONNECT_MAX_MS", 30_000)?;

        Ok(Self {
            url: SecretString::from(url),
            connect_timeout: Duration::from_millis(connect_timeout_ms),
            reconnect_initial_backoff: Duration::from_millis(reconnect_initial_ms),
            reconnect_max_backoff: Duration::from_millis(reconnect_max_ms),
        })
    }

    pub fn url(&self) -> &str {
        self.url.expose_secret()
    }
}

/// Cache Manager policy knobs (C3): TTLs, size cap, promotion threshold.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub l1_ttl: Duration,
    pub l2_ttl: Duration,
    pub search_ttl: Duration,
    pub max_size: usize,
    pub frequent_access_threshold: u64,
    pub operation_timeout: Duration,
}

impl CacheConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let l1_ttl_s: u64 = parse_optional_env("CACHE_L1_TTL_SECS", 86_400)?;
        let l2_ttl_s: u64 = parse_optional_env("CACHE_L2_TTL_SECS", 604_800)?;
        let search_ttl_s: u64 = parse_optional_env("CACHE_SEARCH_TTL_SECS", 300)?;
        let max_size: usize = parse_optional_env("CACHE_MAX_SIZE", 1_000)?;
        let frequent_access_threshold: u64 =
            parse_optional_env("CACHE_FREQUENT_ACCESS_THRESHOLD", 3)?;
        let operation_timeout_ms: u64 = parse_optional_env("CACHE_OPERATION_TIMEOUT_MS", 5_000)?;

        Ok(Self {
            l1_ttl: Duration::from_secs(l1_ttl_s),
            l2_ttl: Duration::from_secs(l2_ttl_s),
            search_ttl: Duration::from_secs(search_ttl_s),
            max_size,
            frequent_access_threshold,
            operation_timeout: Duration::from_millis(operation_timeout_ms),
        })
    }
}

/// Async write pipeline / job queue knobs (C4, C5).
#[derive(Debug, Clone)]
pub struct AsyncConfig {
    pub job_timeout: Duration,
    pub max_pending_jobs: usize,
    /// Upper bound on concurrently in-flight cloud writes (§5 bounded
    /// concurrency). Backed by a semaphore in the write pipeline.
    pub max_concurrent_writes: usize,
}

impl AsyncConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let job_timeout_ms: u64 = parse_optional_env("ASYNC_JOB_TIMEOUT_MS", 30_000)?;
        let max_pending_jobs: usize = parse_optional_env("ASYNC_MAX_PENDING_JOBS", 10_000)?;
        let max_concurrent_writes: usize = parse_optional_env("ASYNC_MAX_CONCURRENT_WRITES", 16)?;

        Ok(Self {
            job_timeout: Duration::from_millis(job_timeout_ms),
            max_pending_jobs,
            max_concurrent_writes,
        })
    }
}

/// Background Sync Worker cadence (C7).
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub interval: Duration,
}

impl SyncConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let interval_ms: u64 = parse_optional_env("SYNC_INTERVAL_MS", 60_000)?;
        Ok(Self {
            interval: Duration::from_millis(interval_ms),
        })
    }
}

/// Startup hint for the Degradation Controller (C9): an explicit operator
/// override, or `None` to let health signals decide at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatingModeHint {
    Hybrid,
    HotOnly,
    CloudOnly,
    Demo,
}

impl std::str::FromStr for OperatingModeHint {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "hybrid" => Ok(Self::Hybrid),
            "hot_only" | "hot-only" | "hotonly" => Ok(Self::HotOnly),
            "cloud_only" | "cloud-only" | "cloudonly" => Ok(Self::CloudOnly),
            "demo" => Ok(Self::Demo),
            other => Err(ConfigError::InvalidValue {
                key: "MODE".to_string(),
                message: format!(
                    "unknown mode '{other}', expected hybrid|hot_only|cloud_only|demo"
                ),
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ModeConfig {
    pub startup_override: Option<OperatingModeHint>,
}

impl ModeConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let startup_override = optional_env("MODE")?
            .map(|s| s.parse())
            .transpose()?;
        Ok(Self { startup_override })
    }

    /// Peek at `MODE` without erroring on an invalid value, used by
    /// `CloudConfig::from_env` before the full `ModeConfig` is built.
    fn peek_env() -> Result<Option<OperatingModeHint>, ConfigError> {
        Ok(optional_env("MODE")?.and_then(|s| s.parse().ok()))
    }
}

// Helper functions

pub(crate) fn optional_env(key: &str) -> Result<Option<String>, ConfigError> {
    match std::env::var(key) {
        Ok(val) if val.is_empty() => Ok(None),
        Ok(val) => Ok(Some(val)),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(ConfigError::ParseError(format!(
            "failed to read {key}: {e}"
        ))),
    }
}

pub(crate) fn parse_optional_env<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    optional_env(key)?
        .map(|s| {
            s.parse().map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("{e}"),
            })
        })
        .transpose()
        .map(|opt| opt.unwrap_or(default))
}
