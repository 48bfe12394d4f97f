//! Top-level wiring: assembles every component behind one handle and owns
//! startup/shutdown (SPEC_FULL §B graceful shutdown, health/readiness).

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, warn};

use crate::cache::CacheManager;
use crate::cloud::{CloudClient, DemoCloudClient, HttpCloudClient};
use crate::config::Config;
use crate::degradation::DegradationController;
use crate::error::Error;
use crate::hotstore::{HotStore, InMemoryHotStore, RedisHotStore};
use crate::jobs::{InvalidateOperation, JobRegistry, PubSubBus};
use crate::model::Priority;
use crate::pipeline::{PendingMemoryEntry, WritePipeline};
use crate::search::HybridSearchPlanner;
use crate::sync::BackgroundSyncWorker;

/// Composed health view, the natural counterpart to `sync_status` (SPEC_FULL
/// §B).
#[derive(Debug, Clone, serde::Serialize)]
pub struct Health {
    pub mode: &'static str,
    pub hot_connected: bool,
    pub cloud_connected: bool,
    pub cloud_is_demo: bool,
}

pub struct Engine {
    pub cache: Arc<CacheManager>,
    pub cloud: Arc<dyn CloudClient>,
    pub jobs: Arc<JobRegistry>,
    pub bus: Arc<PubSubBus>,
    pub pipeline: Arc<WritePipeline>,
    pub search: Arc<HybridSearchPlanner>,
    pub degradation: Arc<DegradationController>,
    /// Default user partition for calls that omit one (§6 `cloud.userId`).
    pub default_user_id: String,
    sync_worker: Arc<BackgroundSyncWorker>,
    sync_shutdown: watch::Sender<bool>,
    invalidate_shutdown: watch::Sender<bool>,
    reindex_shutdown: watch::Sender<bool>,
}

/// Long-lived consumer of `cache:invalidate`: evicts the named memory from
/// the hot store. Handlers are pure functions of the payload and side-effect
/// only through the Cache Manager (§9) — publishing the same invalidation
/// twice is a no-op the second time since delete is already idempotent.
fn spawn_invalidate_subscriber(cache: Arc<CacheManager>, bus: Arc<PubSubBus>) -> watch::Sender<bool> {
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let mut events = bus.subscribe_cache_invalidate();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                event = events.recv() => {
                    match event {
                        Some(payload) => {
                            if let InvalidateOperation::Delete | InvalidateOperation::Update = payload.operation {
                                if let Err(err) = cache.delete_memory(&payload.memory_id).await {
                                    warn!(memory_id = payload.memory_id, error = %err, "cache:invalidate handler failed");
                                }
                            }
                        }
                        None => break,
                    }
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("cache invalidation subscriber shutting down");
                        break;
                    }
                }
            }
        }
    });
    shutdown_tx
}

/// Long-lived consumer of `memory:process`: re-fetches the memory from the
/// cloud backend and re-caches it. Recovers `user_id` from whatever cached
/// copy is still present, mirroring the sync worker's refresh lookup.
fn spawn_reindex_subscriber(
    cache: Arc<CacheManager>,
    cloud: Arc<dyn CloudClient>,
    bus: Arc<PubSubBus>,
) -> watch::Sender<bool> {
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let mut events = bus.subscribe_memory_process();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                event = events.recv() => {
                    match event {
                        Some(payload) => {
                            let user_id = match cache.get_memory(&payload.memory_id).await {
                                Ok(Some(memory)) => memory.user_id,
                                Ok(None) => continue,
                                Err(err) => {
                                    warn!(memory_id = payload.memory_id, error = %err, "memory:process: cache lookup failed");
                                    continue;
                                }
                            };
                            match cloud.get(&user_id, &payload.memory_id).await {
                                Ok(memory) => {
                                    let high_priority = matches!(payload.priority, Priority::High);
                                    if let Err(err) = cache.put_memory(&memory, high_priority).await {
                                        warn!(memory_id = payload.memory_id, error = %err, "memory:process: re-cache failed");
                                    }
                                }
                                Err(err) => {
                                    warn!(memory_id = payload.memory_id, error = %err, "memory:process: cloud re-fetch failed");
                                }
                            }
                        }
                        None => break,
                    }
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("memory reindex subscriber shutting down");
                        break;
                    }
                }
            }
        }
    });
    shutdown_tx
}

impl Engine {
    /// Assemble every component from `config`. Hot-store and cloud backends
    /// degrade to their in-process substitutes rather than failing startup
    /// — the Degradation Controller is what tells callers which mode they
    /// actually got (§4.9).
    pub async fn bootstrap(config: Config) -> Result<Self, Error> {
        let (hot_store, hot_connected): (Arc<dyn HotStore>, bool) =
            match RedisHotStore::connect(config.hot_store.url()).await {
                Ok(store) => (Arc::new(store), true),
                Err(err) => {
                    warn!(error = %err, "hot store unreachable at startup, falling back to in-memory substitute");
                    (Arc::new(InMemoryHotStore::new()), false)
                }
            };

        let has_cloud_credential = !config.cloud.api_key().is_empty();
        let (cloud, cloud_connected): (Arc<dyn CloudClient>, bool) = if has_cloud_credential {
            match HttpCloudClient::new(
                config.cloud.base_url.clone(),
                config.cloud.api_key().to_string(),
                config.cloud.request_timeout,
            ) {
                Ok(client) => (Arc::new(client), true),
                Err(err) => {
                    warn!(error = %err, "cloud client construction failed, falling back to demo substitute");
                    (Arc::new(DemoCloudClient::new()), false)
                }
            }
        } else {
            info!("no cloud credential configured, running with the demo/offline cloud substitute");
            (Arc::new(DemoCloudClient::new()), false)
        };

        let cache = Arc::new(CacheManager::new(hot_store.clone(), config.cache.clone()));
        let jobs = Arc::new(JobRegistry::new(config.async_pipeline.max_pending_jobs));
        let bus = Arc::new(PubSubBus::new(hot_store.clone()));
        let pending_memories = Arc::new(std::sync::Mutex::new(Vec::<PendingMemoryEntry>::new()));

        let pipeline = Arc::new(WritePipeline::new(
            cache.clone(),
            cloud.clone(),
            jobs.clone(),
            bus.clone(),
            pending_memories.clone(),
            config.async_pipeline.clone(),
        ));
        pipeline.set_bus_available(hot_connected);

        let search = Arc::new(HybridSearchPlanner::new(cache.clone(), cloud.clone()));

        let sync_worker = Arc::new(BackgroundSyncWorker::new(
            hot_store.clone(),
            cache.clone(),
            cloud.clone(),
            bus.clone(),
            pending_memories,
            config.sync.interval,
        ));
        let sync_shutdown = sync_worker.clone().spawn();

        let invalidate_shutdown = spawn_invalidate_subscriber(cache.clone(), bus.clone());
        let reindex_shutdown = spawn_reindex_subscriber(cache.clone(), cloud.clone(), bus.clone());

        let degradation = Arc::new(DegradationController::new(config.mode.startup_override));
        degradation.set_hot_connected(hot_connected);
        degradation.set_cloud_connected(cloud_connected);

        info!(mode = degradation.current_mode().as_str(), "engine bootstrapped");

        Ok(Self {
            cache,
            cloud,
            jobs,
            bus,
            pipeline,
            search,
            degradation,
            default_user_id: config.cloud.user_id.clone(),
            sync_worker,
            sync_shutdown,
            invalidate_shutdown,
            reindex_shutdown,
        })
    }

    pub fn health(&self) -> Health {
        Health {
            mode: self.degradation.current_mode().as_str(),
            hot_connected: self.degradation.hot_connected(),
            cloud_connected: self.degradation.cloud_connected(),
            cloud_is_demo: self.cloud.is_demo(),
        }
    }

    pub fn sync_metrics(&self) -> crate::sync::SyncMetricsSnapshot {
        self.sync_worker.metrics()
    }

    pub fn pending_memory_count(&self) -> usize {
        self.pipeline.pending_memory_count()
    }

    pub fn pending_job_count(&self) -> usize {
        self.jobs.pending_count()
    }

    /// Stop the sync worker and let any in-flight pub/sub handler finish
    /// within one tick (§4.7 cancellation). Exit-code mapping lives in `main`.
    pub async fn shutdown(&self) {
        info!("engine shutting down");
        let _ = self.sync_shutdown.send(true);
        let _ = self.invalidate_shutdown.send(true);
        let _ = self.reindex_shutdown.send(true);
    }
}
