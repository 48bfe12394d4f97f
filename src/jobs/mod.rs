//! Job Queue & Pub/Sub Bus (C4): the in-process async job registry plus
//! channel fan-out for `cache:invalidate`, `memory:process`, `job:complete`.

mod registry;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub use registry::{JobOutcome, JobRegistry};

use crate::error::HotStoreError;
use crate::hotstore::HotStore;

/// The three named channels (§4.4), bit-exact.
pub const CHANNEL_CACHE_INVALIDATE: &str = "cache:invalidate";
pub const CHANNEL_MEMORY_PROCESS: &str = "memory:process";
pub const CHANNEL_JOB_COMPLETE: &str = "job:complete";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvalidateOperation {
    Delete,
    Update,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheInvalidatePayload {
    pub memory_id: String,
    pub operation: InvalidateOperation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryProcessPayload {
    pub memory_id: String,
    pub priority: crate::model::Priority,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobCompletePayload {
    pub job_id: uuid::Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Thin typed wrapper over the hot store's raw pub/sub primitives (§4.4).
/// Publishing is fire-and-forget JSON; subscribing hands back a typed
/// broadcast stream via a background decode task so callers never see raw
/// payload strings.
pub struct PubSubBus {
    store: Arc<dyn HotStore>,
}

impl PubSubBus {
    pub fn new(store: Arc<dyn HotStore>) -> Self {
        Self { store }
    }

    pub async fn publish_cache_invalidate(
        &self,
        payload: CacheInvalidatePayload,
    ) -> Result<(), HotStoreError> {
        self.publish(CHANNEL_CACHE_INVALIDATE, &payload).await
    }

    pub async fn publish_memory_process(
        &self,
        payload: MemoryProcessPayload,
    ) -> Result<(), HotStoreError> {
        self.publish(CHANNEL_MEMORY_PROCESS, &payload).await
    }

    pub async fn publish_job_complete(
        &self,
        payload: JobCompletePayload,
    ) -> Result<(), HotStoreError> {
        self.publish(CHANNEL_JOB_COMPLETE, &payload).await
    }

    async fn publish<T: Serialize>(&self, channel: &str, payload: &T) -> Result<(), HotStoreError> {
        let json = serde_json::to_string(payload).unwrap_or_else(|e| {
            warn!(channel, error = %e, "failed to serialize pub/sub payload");
            "{}".to_string()
        });
        self.store.publish(channel, json).await
    }

    /// Subscribe to `cache:invalidate`, decoding each message. Malformed
    /// payloads are logged and dropped — handlers must stay resilient to
    /// at-least-once, best-effort delivery (§5).
    pub fn subscribe_cache_invalidate(&self) -> tokio::sync::mpsc::UnboundedReceiver<CacheInvalidatePayload> {
        self.subscribe_typed(CHANNEL_CACHE_INVALIDATE)
    }

    pub fn subscribe_memory_process(&self) -> tokio::sync::mpsc::UnboundedReceiver<MemoryProcessPayload> {
        self.subscribe_typed(CHANNEL_MEMORY_PROCESS)
    }

    pub fn subscribe_job_complete(&self) -> tokio::sync::mpsc::UnboundedReceiver<JobCompletePayload> {
        self.subscribe_typed(CHANNEL_JOB_COMPLETE)
    }

    fn subscribe_typed<T>(&self, channel: &str) -> tokio::sync::mpsc::UnboundedReceiver<T>
    where
        T: for<'de> Deserialize<'de> + Send + 'static,
    {
        let mut raw = self.store.subscribe(channel);
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let channel_owned = channel.to_string();
        tokio::spawn(async move {
            loop {
                match raw.recv().await {
                    Ok(message) => match serde_json::from_str::<T>(&message) {
                        Ok(decoded) => {
                            if tx.send(decoded).is_err() {
                                break;
                            }
                        }
                        Err(err) => {
                            warn!(channel = %channel_owned, error = %err, "dropping malformed pub/sub payload")
                        }
                    },
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        warn!(channel = %channel_owned, skipped = n, "pub/sub subscriber lagged");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
            debug!(channel = %channel_owned, "pub/sub subscriber loop exiting");
        });
        rx
    }
}
