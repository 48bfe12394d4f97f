//! Background Sync Worker (C7): periodic refresh of hot memories, drain of
//! the pending-memory queue, and search-cache TTL hygiene (§4.7).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::cache::CacheManager;
use crate::cloud::CloudClient;
use crate::hotstore::{scan_all, HotStore};
use crate::jobs::{MemoryProcessPayload, PubSubBus};
use crate::model::Priority;
use crate::pipeline::PendingMemoryEntry;

/// Top-N memories refreshed per tick (§4.7).
const REFRESH_COUNT: usize = 50;

/// A pending-memory entry older than this is drained on the next tick.
const DRAIN_AGE: Duration = Duration::from_secs(60);

/// Counters surfaced via `sync_status` (SPEC_FULL §B metrics).
#[derive(Debug, Default)]
pub struct SyncMetrics {
    pub ticks: AtomicU64,
    pub refreshed: AtomicU64,
    pub refresh_failures: AtomicU64,
    pub drained: AtomicU64,
    pub hygiene_deleted: AtomicU64,
}

#[derive(Debug, Clone, Default)]
pub struct SyncMetricsSnapshot {
    pub ticks: u64,
    pub refreshed: u64,
    pub refresh_failures: u64,
    pub drained: u64,
    pub hygiene_deleted: u64,
}

pub struct BackgroundSyncWorker {
    store: Arc<dyn HotStore>,
    cache: Arc<CacheManager>,
    cloud: Arc<dyn CloudClient>,
    bus: Arc<PubSubBus>,
    pending_memories: Arc<std::sync::Mutex<Vec<PendingMemoryEntry>>>,
    interval: Duration,
    metrics: Arc<SyncMetrics>,
}

impl BackgroundSyncWorker {
    pub fn new(
        store: Arc<dyn HotStore>,
        cache: Arc<CacheManager>,
        cloud: Arc<dyn CloudClient>,
        bus: Arc<PubSubBus>,
        pending_memories: Arc<std::sync::Mutex<Vec<PendingMemoryEntry>>>,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            cache,
            cloud,
            bus,
            pending_memories,
            interval,
            metrics: Arc::new(SyncMetrics::default()),
        }
    }

    pub fn metrics(&self) -> SyncMetricsSnapshot {
        SyncMetricsSnapshot {
            ticks: self.metrics.ticks.load(Ordering::Relaxed),
            refreshed: self.metrics.refreshed.load(Ordering::Relaxed),
            refresh_failures: self.metrics.refresh_failures.load(Ordering::Relaxed),
            drained: self.metrics.drained.load(Ordering::Relaxed),
            hygiene_deleted: self.metrics.hygiene_deleted.load(Ordering::Relaxed),
        }
    }

    /// Spawn the periodic tick loop. The returned `watch::Sender` is the
    /// shutdown handle: dropping it or sending `true` stops the worker
    /// within one tick (§4.7 cancellation, SPEC_FULL §B graceful shutdown).
    pub fn spawn(self: Arc<Self>) -> watch::Sender<bool> {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let worker = self;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(worker.interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        worker.tick().await;
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            info!("sync worker shutting down");
                            break;
                        }
                    }
                }
            }
        });
        shutdown_tx
    }

    /// One full refresh + drain + hygiene pass, exposed directly so tests
    /// and the `sync_status` tool can trigger it without the interval timer.
    pub async fn tick(&self) {
        self.metrics.ticks.fetch_add(1, Ordering::Relaxed);
        self.refresh().await;
        self.drain().await;
        self.hygiene().await;
    }

    async fn refresh(&self) {
        let top = match self.cache.top_accessed(REFRESH_COUNT).await {
            Ok(top) => top,
            Err(err) => {
                warn!(error = %err, "sync refresh: failed to list top-accessed memories");
                return;
            }
        };

        for (id, _count) in top {
            let user_id = match self.cache.get_memory(&id).await {
                Ok(Some(memory)) => memory.user_id,
                Ok(None) => {
                    debug!(memory_id = id, "sync refresh: no cached entry to recover user_id from, skipping");
                    continue;
                }
                Err(err) => {
                    warn!(memory_id = id, error = %err, "sync refresh: cache lookup failed, skipping");
                    continue;
                }
            };

            match self.cloud.get(&user_id, &id).await {
                Ok(memory) => {
                    if let Err(err) = self.cache.put_memory(&memory, true).await {
                        warn!(memory_id = id, error = %err, "sync refresh: re-cache failed");
                        self.metrics.refresh_failures.fetch_add(1, Ordering::Relaxed);
                        continue;
                    }
                    self.metrics.refreshed.fetch_add(1, Ordering::Relaxed);
                }
                Err(err) => {
                    debug!(memory_id = id, error = %err, "sync refresh: cloud re-fetch failed, skipping");
                    self.metrics.refresh_failures.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }

    async fn drain(&self) {
        let due: Vec<PendingMemoryEntry> = {
            let mut guard = self.pending_memories.lock().unwrap_or_else(|e| e.into_inner());
            let now = Instant::now();
            let (due, remaining): (Vec<_>, Vec<_>) = guard
                .drain(..)
                .partition(|entry| now.duration_since(entry.enqueued_at) >= DRAIN_AGE);
            *guard = remaining;
            due
        };

        for entry in due {
            if let Err(err) = self
                .bus
                .publish_memory_process(MemoryProcessPayload {
                    memory_id: entry.memory_id.clone(),
                    priority: entry.priority,
                })
                .await
            {
                warn!(memory_id = entry.memory_id, error = %err, "sync drain: publish failed");
                continue;
            }
            self.metrics.drained.fetch_add(1, Ordering::Relaxed);
        }
    }

    async fn hygiene(&self) {
        let keys = match scan_all(self.store.as_ref(), "search:*").await {
            Ok(keys) => keys,
            Err(err) => {
                warn!(error = %err, "sync hygiene: scan failed");
                return;
            }
        };

        let mut stale = Vec::new();
        for key in keys {
            match self.store.ttl(&key).await {
                Ok(ttl) if ttl < 0 => stale.push(key),
                Ok(_) => {}
                Err(err) => warn!(key, error = %err, "sync hygiene: ttl check failed"),
            }
        }

        if !stale.is_empty() {
            let count = stale.len() as u64;
            if let Err(err) = self.store.del(&stale).await {
                warn!(error = %err, "sync hygiene: delete failed");
            } else {
                self.metrics.hygiene_deleted.fetch_add(count, Ordering::Relaxed);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheManager;
    use crate::cloud::{AddMemoryContent, DemoCloudClient};
    use crate::config::CacheConfig;
    use crate::hotstore::InMemoryHotStore;
    use std::collections::HashMap;

    fn cache_config() -> CacheConfig {
        CacheConfig {
            l1_ttl: Duration::from_secs(86_400),
            l2_ttl: Duration::from_secs(604_800),
            search_ttl: Duration::from_secs(300),
            max_size: 1000,
            frequent_access_threshold: 3,
            operation_timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn refresh_recaches_top_accessed_memories() {
        let hot_store: Arc<dyn HotStore> = Arc::new(InMemoryHotStore::new());
        let cache = Arc::new(CacheManager::new(hot_store.clone(), cache_config()));
        let cloud = Arc::new(DemoCloudClient::new());
        let bus = Arc::new(PubSubBus::new(hot_store.clone()));

        let added = cloud
            .add_memory("default", AddMemoryContent::Content("hot item".into()), HashMap::new())
            .await
            .unwrap();
        cache.put_memory(&added[0], false).await.unwrap();
        cache.get_memory(&added[0].id).await.unwrap();

        let worker = Arc::new(BackgroundSyncWorker::new(
            hot_store,
            cache.clone(),
            cloud,
            bus,
            Arc::new(std::sync::Mutex::new(Vec::new())),
            Duration::from_secs(300),
        ));
        worker.tick().await;

        let snapshot = worker.metrics();
        assert_eq!(snapshot.refreshed, 1);
        assert_eq!(snapshot.refresh_failures, 0);
    }

    #[tokio::test]
    async fn drain_publishes_and_clears_entries_older_than_threshold() {
        let hot_store: Arc<dyn HotStore> = Arc::new(InMemoryHotStore::new());
        let cache = Arc::new(CacheManager::new(hot_store.clone(), cache_config()));
        let cloud = Arc::new(DemoCloudClient::new());
        let bus = Arc::new(PubSubBus::new(hot_store.clone()));
        let pending = Arc::new(std::sync::Mutex::new(vec![PendingMemoryEntry {
            memory_id: "m1".to_string(),
            priority: Priority::Low,
            enqueued_at: Instant::now() - Duration::from_secs(120),
        }]));

        let mut rx = bus.subscribe_memory_process();
        let worker = Arc::new(BackgroundSyncWorker::new(hot_store, cache, cloud, bus, pending.clone(), Duration::from_secs(300)));
        worker.tick().await;

        let received = rx.recv().await.unwrap();
        assert_eq!(received.memory_id, "m1");
        assert!(pending.lock().unwrap().is_empty());
        assert_eq!(worker.metrics().drained, 1);
    }

    #[tokio::test]
    async fn fresh_pending_entries_are_not_drained() {
        let hot_store: Arc<dyn HotStore> = Arc::new(InMemoryHotStore::new());
        let cache = Arc::new(CacheManager::new(hot_store.clone(), cache_config()));
        let cloud = Arc::new(DemoCloudClient::new());
        let bus = Arc::new(PubSubBus::new(hot_store.clone()));
        let pending = Arc::new(std::sync::Mutex::new(vec![PendingMemoryEntry {
            memory_id: "m1".to_string(),
            priority: Priority::Low,
            enqueued_at: Instant::now(),
        }]));

        let worker = Arc::new(BackgroundSyncWorker::new(hot_store, cache, cloud, bus, pending.clone(), Duration::from_secs(300)));
        worker.tick().await;

        assert_eq!(pending.lock().unwrap().len(), 1);
        assert_eq!(worker.metrics().drained, 0);
    }

    #[tokio::test]
    async fn hygiene_removes_keys_with_negative_ttl() {
        let hot_store: Arc<dyn HotStore> = Arc::new(InMemoryHotStore::new());
        // `ttl_seconds = 0` is this store's no-expire convention, so `ttl()`
        // reports -1 for it — a negative TTL the hygiene pass must catch.
        hot_store.set_with_ttl("search:stale", "[]".to_string(), 0).await.unwrap();
        let cache = Arc::new(CacheManager::new(hot_store.clone(), cache_config()));
        let cloud = Arc::new(DemoCloudClient::new());
        let bus = Arc::new(PubSubBus::new(hot_store.clone()));
        let worker = Arc::new(BackgroundSyncWorker::new(
            hot_store.clone(),
            cache,
            cloud,
            bus,
            Arc::new(std::sync::Mutex::new(Vec::new())),
            Duration::from_secs(300),
        ));
        worker.tick().await;
        // Either already swept by expiry or by hygiene; both satisfy the
        // invariant that stale search keys do not survive a tick.
        assert!(hot_store.get("search:stale").await.unwrap().is_none());
    }
}
