//! Async Write Pipeline (C5): accepts add/update, runs the duplicate gate,
//! submits to the cloud, eagerly populates the cache, and fans out
//! invalidations (§4.5).

mod duplicate;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tracing::{error, info, warn};

pub use duplicate::{check_duplicate, jaccard_similarity, SIMILARITY_THRESHOLD};

use crate::cache::CacheManager;
use crate::cloud::{AddMemoryContent, CloudClient};
use crate::config::AsyncConfig;
use crate::error::{CloudError, DuplicateMemory};
use crate::jobs::{
    CacheInvalidatePayload, InvalidateOperation, JobCompletePayload, JobOutcome, JobRegistry,
    MemoryProcessPayload, PubSubBus,
};
use crate::model::{Memory, Priority, WriteInput};

/// A memory awaiting background re-indexing (§3 Lifecycles, §4.7 drain).
#[derive(Debug, Clone)]
pub struct PendingMemoryEntry {
    pub memory_id: String,
    pub priority: Priority,
    pub enqueued_at: Instant,
}

/// Outcome of `AddMemory` (§4.5, §6).
#[derive(Debug, Clone)]
pub enum AddMemoryOutcome {
    /// Async mode: the write was dispatched and the caller should not wait.
    Accepted { job_id: uuid::Uuid, accepted: usize },
    /// Sync mode (or async degraded to sync): the cloud call already ran.
    Immediate { memories: Vec<Memory> },
}

/// Parameters for one `add_memory` call (§6).
pub struct AddMemoryParams {
    pub input: WriteInput,
    pub user_id: String,
    pub metadata: HashMap<String, serde_json::Value>,
    pub priority: Priority,
    pub async_mode: bool,
    pub skip_duplicate_check: bool,
}

pub enum AddMemoryError {
    Duplicate(DuplicateMemory),
    Cloud(CloudError),
}

impl From<CloudError> for AddMemoryError {
    fn from(e: CloudError) -> Self {
        AddMemoryError::Cloud(e)
    }
}

pub struct WritePipeline {
    cache: Arc<CacheManager>,
    cloud: Arc<dyn CloudClient>,
    jobs: Arc<JobRegistry>,
    bus: Arc<PubSubBus>,
    pending_memories: Arc<std::sync::Mutex<Vec<PendingMemoryEntry>>>,
    config: AsyncConfig,
    write_permits: Arc<Semaphore>,
    bus_available: std::sync::atomic::AtomicBool,
}

impl WritePipeline {
    pub fn new(
        cache: Arc<CacheManager>,
        cloud: Arc<dyn CloudClient>,
        jobs: Arc<JobRegistry>,
        bus: Arc<PubSubBus>,
        pending_memories: Arc<std::sync::Mutex<Vec<PendingMemoryEntry>>>,
        config: AsyncConfig,
    ) -> Self {
        Self {
            cache,
            cloud,
            jobs,
            bus,
            pending_memories,
            write_permits: Arc::new(Semaphore::new(config.max_concurrent_writes)),
            config,
            bus_available: std::sync::atomic::AtomicBool::new(true),
        }
    }

    pub fn set_bus_available(&self, available: bool) {
        self.bus_available
            .store(available, std::sync::atomic::Ordering::Relaxed);
    }

    fn bus_available(&self) -> bool {
        self.bus_available.load(std::sync::atomic::Ordering::Relaxed)
    }

    /// `AddMemory(params)` (§4.5).
    pub async fn add_memory(&self, params: AddMemoryParams) -> Result<AddMemoryOutcome, AddMemoryError> {
        let comparison_text = params.input.comparison_text();

        if !params.skip_duplicate_check {
            if let Some(dup) = check_duplicate(self.cloud.as_ref(), &params.user_id, &comparison_text).await {
                return Err(AddMemoryError::Duplicate(dup));
            }
        }

        // §5 backpressure: beyond the pending-job ceiling, async calls
        // degrade to synchronous rather than being dropped.
        let effective_async = params.async_mode && self.bus_available() && !self.jobs.at_capacity();

        if effective_async {
            Ok(self.add_memory_async(params))
        } else {
            self.add_memory_sync(params).await.map(|memories| AddMemoryOutcome::Immediate { memories })
        }
    }

    fn add_memory_async(&self, params: AddMemoryParams) -> AddMemoryOutcome {
        let (job_id, _rx) = self.jobs.register(self.config.job_timeout);

        let cache = self.cache.clone();
        let cloud = self.cloud.clone();
        let jobs = self.jobs.clone();
        let bus = self.bus.clone();
        let pending_memories = self.pending_memories.clone();
        let permits = self.write_permits.clone();

        tokio::spawn(async move {
            let _permit = match permits.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return,
            };

            let content = AddMemoryContent::from(params.input);
            let result = cloud.add_memory(&params.user_id, content, params.metadata).await;

            match result {
                Ok(memories) => {
                    for memory in &memories {
                        let high_priority = params.priority == Priority::High;
                        // §4.5 step 3c: the eager insert on this path is
                        // always at L1 TTL regardless of priority or access
                        // count — this is the read-your-writes guarantee,
                        // not the generic §4.3 access-driven placement.
                        if let Err(err) = cache.put_memory_with_ttl(memory, cache.l1_ttl()).await {
                            warn!(memory_id = memory.id, error = %err, "eager cache insert failed");
                        }
                        if high_priority {
                            let _ = bus
                                .publish_memory_process(MemoryProcessPayload {
                                    memory_id: memory.id.clone(),
                                    priority: params.priority,
                                })
                                .await;
                        } else {
                            pending_memories.lock().unwrap_or_else(|e| e.into_inner()).push(PendingMemoryEntry {
                                memory_id: memory.id.clone(),
                                priority: params.priority,
                                enqueued_at: Instant::now(),
                            });
                        }
                    }

                    if let Err(err) = cache.invalidate_search_cache().await {
                        warn!(error = %err, "search cache invalidation failed after async write");
                    }

                    let accepted = memories.len();
                    jobs.complete(job_id, JobOutcome::Completed { accepted });
                    let _ = bus
                        .publish_job_complete(JobCompletePayload {
                            job_id,
                            result: Some(serde_json::json!({ "accepted": accepted })),
                            error: None,
                        })
                        .await;
                    info!(job_id = %job_id, accepted, "async add_memory job completed");
                }
                Err(err) => {
                    jobs.complete(job_id, JobOutcome::Failed { reason: err.to_string() });
                    let _ = bus
                        .publish_job_complete(JobCompletePayload {
                            job_id,
                            result: None,
                            error: Some(err.to_string()),
                        })
                        .await;
                    error!(job_id = %job_id, error = %err, "async add_memory job failed");
                }
            }
        });

        // §4.5 step 3f: the caller gets an immediate optimistic accept
        // count; the authoritative count follows via `job:complete`.
        AddMemoryOutcome::Accepted { job_id, accepted: 1 }
    }

    async fn add_memory_sync(&self, params: AddMemoryParams) -> Result<Vec<Memory>, AddMemoryError> {
        let content = AddMemoryContent::from(params.input);
        let memories = self.cloud.add_memory(&params.user_id, content, params.metadata).await?;

        let high_priority = params.priority == Priority::High;
        for memory in &memories {
            if high_priority {
                if let Err(err) = self.cache.put_memory(memory, true).await {
                    warn!(memory_id = memory.id, error = %err, "eager cache insert failed (sync path)");
                }
            }
        }
        if let Err(err) = self.cache.invalidate_search_cache().await {
            warn!(error = %err, "search cache invalidation failed after sync write");
        }
        Ok(memories)
    }

    /// `DeleteMemory(memory_id)` (§6): removes from the cloud then fans out
    /// the invalidation so every tier/index converges.
    pub async fn delete_memory(&self, user_id: &str, memory_id: &str) -> Result<(), CloudError> {
        self.cloud.delete(user_id, memory_id).await?;
        if let Err(err) = self.cache.delete_memory(memory_id).await {
            warn!(memory_id, error = %err, "local cache delete failed");
        }
        let _ = self
            .bus
            .publish_cache_invalidate(CacheInvalidatePayload {
                memory_id: memory_id.to_string(),
                operation: InvalidateOperation::Delete,
            })
            .await;
        if let Err(err) = self.cache.invalidate_search_cache().await {
            warn!(error = %err, "search cache invalidation failed after delete");
        }
        Ok(())
    }

    pub fn pending_memory_count(&self) -> usize {
        self.pending_memories.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheManager;
    use crate::cloud::DemoCloudClient;
    use crate::config::CacheConfig;
    use crate::hotstore::{HotStore, InMemoryHotStore};

    fn pipeline() -> WritePipeline {
        let hot_store = Arc::new(InMemoryHotStore::new());
        let cache = Arc::new(CacheManager::new(
            hot_store.clone(),
            CacheConfig {
                l1_ttl: Duration::from_secs(86_400),
                l2_ttl: Duration::from_secs(604_800),
                search_ttl: Duration::from_secs(300),
                max_size: 1000,
                frequent_access_threshold: 3,
                operation_timeout: Duration::from_secs(5),
            },
        ));
        let cloud: Arc<dyn CloudClient> = Arc::new(DemoCloudClient::new());
        let jobs = Arc::new(JobRegistry::new(100));
        let bus = Arc::new(PubSubBus::new(hot_store));
        WritePipeline::new(
            cache,
            cloud,
            jobs,
            bus,
            Arc::new(std::sync::Mutex::new(Vec::new())),
            AsyncConfig {
                job_timeout: Duration::from_secs(30),
                max_pending_jobs: 100,
                max_concurrent_writes: 8,
            },
        )
    }

    #[tokio::test]
    async fn sync_add_memory_returns_immediately_with_memories() {
        let pipeline = pipeline();
        let params = AddMemoryParams {
            input: WriteInput::Content("hello world".into()),
            user_id: "u1".into(),
            metadata: HashMap::new(),
            priority: Priority::Low,
            async_mode: false,
            skip_duplicate_check: false,
        };
        match pipeline.add_memory(params).await.unwrap() {
            AddMemoryOutcome::Immediate { memories } => assert_eq!(memories.len(), 1),
            AddMemoryOutcome::Accepted { .. } => panic!("expected immediate outcome"),
        }
    }

    #[tokio::test]
    async fn async_add_memory_returns_job_id_immediately() {
        let pipeline = pipeline();
        let params = AddMemoryParams {
            input: WriteInput::Content("async content here".into()),
            user_id: "u1".into(),
            metadata: HashMap::new(),
            priority: Priority::Medium,
            async_mode: true,
            skip_duplicate_check: false,
        };
        match pipeline.add_memory(params).await.unwrap() {
            AddMemoryOutcome::Accepted { accepted, .. } => assert_eq!(accepted, 1),
            AddMemoryOutcome::Immediate { .. } => panic!("expected accepted outcome"),
        }
    }

    #[tokio::test]
    async fn async_eager_insert_lands_at_l1_ttl_regardless_of_priority() {
        let hot_store = Arc::new(InMemoryHotStore::new());
        let cache = Arc::new(CacheManager::new(
            hot_store.clone(),
            CacheConfig {
                l1_ttl: Duration::from_secs(86_400),
                l2_ttl: Duration::from_secs(604_800),
                search_ttl: Duration::from_secs(300),
                max_size: 1000,
                frequent_access_threshold: 3,
                operation_timeout: Duration::from_secs(5),
            },
        ));
        let cloud: Arc<dyn CloudClient> = Arc::new(DemoCloudClient::new());
        let jobs = Arc::new(JobRegistry::new(100));
        let bus = Arc::new(PubSubBus::new(hot_store.clone()));
        let pipeline = WritePipeline::new(
            cache,
            cloud,
            jobs,
            bus,
            Arc::new(std::sync::Mutex::new(Vec::new())),
            AsyncConfig {
                job_timeout: Duration::from_secs(30),
                max_pending_jobs: 100,
                max_concurrent_writes: 8,
            },
        );

        let params = AddMemoryParams {
            input: WriteInput::Content("low priority async content".into()),
            user_id: "u1".into(),
            metadata: HashMap::new(),
            priority: Priority::Low,
            async_mode: true,
            skip_duplicate_check: true,
        };
        match pipeline.add_memory(params).await.unwrap() {
            AddMemoryOutcome::Accepted { .. } => {}
            AddMemoryOutcome::Immediate { .. } => panic!("expected async outcome"),
        }

        // Let the spawned task run the cloud write and eager cache insert.
        tokio::time::sleep(Duration::from_millis(50)).await;

        let memory_keys = crate::hotstore::scan_all(hot_store.as_ref(), "memory:*").await.unwrap();
        let key = memory_keys
            .into_iter()
            .find(|k| !k.starts_with("memory:keywords:"))
            .expect("eagerly inserted memory key");
        let ttl = hot_store.ttl(&key).await.unwrap();
        // L1 TTL is 86_400s; L2 would be 604_800s. A low-priority, never-
        // accessed memory on the generic placement rule would land at L2 —
        // asserting the L1 ceiling here catches a regression to that path.
        assert!(ttl > 0 && ttl <= 86_400, "expected L1 TTL, got {ttl}");
    }

    #[tokio::test]
    async fn duplicate_write_is_rejected() {
        let pipeline = pipeline();
        let first = AddMemoryParams {
            input: WriteInput::Content("User prefers TypeScript and dark mode".into()),
            user_id: "u1".into(),
            metadata: HashMap::new(),
            priority: Priority::Low,
            async_mode: false,
            skip_duplicate_check: false,
        };
        pipeline.add_memory(first).await.unwrap();

        let second = AddMemoryParams {
            input: WriteInput::Content("User prefers typescript and Dark Mode".into()),
            user_id: "u1".into(),
            metadata: HashMap::new(),
            priority: Priority::Low,
            async_mode: false,
            skip_duplicate_check: false,
        };
        match pipeline.add_memory(second).await {
            Err(AddMemoryError::Duplicate(dup)) => assert!(dup.similarity >= SIMILARITY_THRESHOLD),
            other => panic!("expected duplicate rejection, got {:?}", other.map(|_| ()).is_ok()),
        }
    }

    #[tokio::test]
    async fn skip_duplicate_check_bypasses_the_gate() {
        let pipeline = pipeline();
        let first = AddMemoryParams {
            input: WriteInput::Content("User prefers TypeScript and dark mode".into()),
            user_id: "u1".into(),
            metadata: HashMap::new(),
            priority: Priority::Low,
            async_mode: false,
            skip_duplicate_check: false,
        };
        pipeline.add_memory(first).await.unwrap();

        let second = AddMemoryParams {
            input: WriteInput::Content("User prefers typescript and Dark Mode".into()),
            user_id: "u1".into(),
            metadata: HashMap::new(),
            priority: Priority::Low,
            async_mode: false,
            skip_duplicate_check: true,
        };
        let outcome = pipeline.add_memory(second).await;
        assert!(outcome.is_ok());
    }

    #[tokio::test]
    async fn bounded_async_degrades_to_sync_at_capacity() {
        let hot_store = Arc::new(InMemoryHotStore::new());
        let cache = Arc::new(CacheManager::new(
            hot_store.clone(),
            CacheConfig {
                l1_ttl: Duration::from_secs(86_400),
                l2_ttl: Duration::from_secs(604_800),
                search_ttl: Duration::from_secs(300),
                max_size: 1000,
                frequent_access_threshold: 3,
                operation_timeout: Duration::from_secs(5),
            },
        ));
        let cloud: Arc<dyn CloudClient> = Arc::new(DemoCloudClient::new());
        let jobs = Arc::new(JobRegistry::new(1));
        let bus = Arc::new(PubSubBus::new(hot_store));
        let pipeline = WritePipeline::new(
            cache,
            cloud,
            jobs.clone(),
            bus,
            Arc::new(std::sync::Mutex::new(Vec::new())),
            AsyncConfig {
                job_timeout: Duration::from_secs(30),
                max_pending_jobs: 1,
                max_concurrent_writes: 8,
            },
        );

        // Fill the ceiling with a job that never completes.
        let (_id, _rx) = jobs.register(Duration::from_secs(30));
        assert!(jobs.at_capacity());

        let params = AddMemoryParams {
            input: WriteInput::Content("overflow content".into()),
            user_id: "u1".into(),
            metadata: HashMap::new(),
            priority: Priority::Low,
            async_mode: true,
            skip_duplicate_check: true,
        };
        match pipeline.add_memory(params).await.unwrap() {
            AddMemoryOutcome::Immediate { memories } => assert_eq!(memories.len(), 1),
            AddMemoryOutcome::Accepted { .. } => panic!("expected degrade-to-sync at capacity"),
        }
    }
}
