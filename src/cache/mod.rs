//! Cache Manager (C3): the two-tier hot/warm cache, keyword index,
//! search-result cache, and batch operations. The sole owner of every
//! hot-store key this service writes (§3 Ownership).

mod keywords;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, warn};

pub use keywords::extract_keywords;

use crate::config::CacheConfig;
use crate::error::CacheError;
use crate::hotstore::{scan_all, HotStore};
use crate::model::Memory;

/// Single hash holding every access counter, per §9's standardization on
/// hash-field counters (the two-incompatible-encodings bug class).
const METADATA_HASH: &str = "cache:metadata";

const STATS_TIMEOUT: Duration = Duration::from_secs(10);

/// Batch chunk size for `BatchGet`/`BatchSet` (§4.3).
const BATCH_CHUNK_SIZE: usize = 10;

fn memory_key(id: &str) -> String {
    format!("memory:{id}")
}

fn memory_keywords_key(id: &str) -> String {
    format!("memory:keywords:{id}")
}

fn keyword_key(word: &str) -> String {
    format!("keyword:{word}")
}

fn access_field(id: &str) -> String {
    format!("access:{id}")
}

/// `search:{md5(query)}:{limit}`, bit-exact per §4.3's key layout.
pub fn search_cache_key(query: &str, limit: usize) -> String {
    let digest = md5::compute(query.as_bytes());
    format!("search:{digest:x}:{limit}")
}

/// Parse the `used_memory:<n>` line out of an `INFO memory` response.
fn parse_used_memory(info: &str) -> Option<u64> {
    info.lines()
        .find_map(|line| line.strip_prefix("used_memory:"))
        .and_then(|v| v.trim().parse().ok())
}

type CacheResult<T> = Result<T, CacheError>;

/// Outcome of a `BatchSet` with error isolation (§4.3: one failure does not
/// abort the batch).
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchSetReport {
    pub succeeded: usize,
    pub failed: usize,
}

/// `cache_stats` contract (§6), including the heuristic `hit_rate` formula
/// the spec requires re-implementers to reproduce verbatim (§9 Open
/// Questions) alongside a separate, honestly-labeled ratio.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStats {
    pub total_memories: u64,
    pub total_access: u64,
    /// `min(100, total_access / total_memories * 10)` — a heuristic kept
    /// for dashboard parity, not a true hit ratio (§9).
    pub hit_rate: f64,
    pub memory_usage_bytes: u64,
    pub top_accessed: Vec<(String, i64)>,
    pub cached_searches: u64,
    /// Live `access:{id}` fields in `cache:metadata` — distinct from
    /// `total_memories` since counters persist past memory TTL-expiry and
    /// reset only on explicit wipe (§3).
    pub access_counters: u64,
    /// Number of distinct `keyword:*` sets currently populated.
    pub keyword_indexes: u64,
}

#[derive(Serialize, Deserialize)]
struct CachedMemory {
    memory: Memory,
}

/// Two-tier (L1 hot / L2 warm) cache over a `HotStore`, distinguished only
/// by TTL (§4.3). Every public operation is wrapped in a per-call timeout
/// and never blocks the caller past it.
pub struct CacheManager {
    store: Arc<dyn HotStore>,
    config: CacheConfig,
    /// Single-flight dedup for concurrent `GetMemory(id)` calls, keyed by
    /// `get:{id}` (§4.3 Concurrency). Race-free via `watch`: a waiter that
    /// arrives after the leader inserts its receiver always observes either
    /// the pending `None` or the eventual result, never a lost wakeup.
    inflight: dashmap::DashMap<String, watch::Receiver<Option<CacheResult<Option<Memory>>>>>,
}

impl CacheManager {
    pub fn new(store: Arc<dyn HotStore>, config: CacheConfig) -> Self {
        Self {
            store,
            config,
            inflight: dashmap::DashMap::new(),
        }
    }

    fn timeout(&self) -> Duration {
        self.config.operation_timeout
    }

    /// L1 TTL, exposed for callers that must force top-tier placement
    /// outside the normal access-driven `placement_ttl` rule (§4.5 step 3c's
    /// eager insert on the async write path).
    pub fn l1_ttl(&self) -> Duration {
        self.config.l1_ttl
    }

    async fn with_timeout<T>(
        &self,
        op: &str,
        timeout: Duration,
        fut: impl std::future::Future<Output = CacheResult<T>>,
    ) -> CacheResult<T> {
        tokio::time::timeout(timeout, fut)
            .await
            .unwrap_or_else(|_| {
                Err(CacheError::Timeout {
                    op: op.to_string(),
                    timeout,
                })
            })
    }

    /// Access-driven placement: L1 if the caller marked this write
    /// high-priority OR the memory's access count has already crossed the
    /// frequent-access threshold (§4.3).
    async fn placement_ttl(&self, id: &str, high_priority: bool) -> Duration {
        if high_priority {
            return self.config.l1_ttl;
        }
        let count = self.access_count(id).await.unwrap_or(0);
        if count >= self.config.frequent_access_threshold as i64 {
            self.config.l1_ttl
        } else {
            self.config.l2_ttl
        }
    }

    async fn access_count(&self, id: &str) -> CacheResult<i64> {
        let all = self.store.hash_get_all(METADATA_HASH).await?;
        Ok(all
            .get(&access_field(id))
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(0))
    }

    /// Best-effort: keyword-index and access-count writes never fail the
    /// caller (§7 propagation policy).
    async fn track_access(&self, id: &str) {
        if let Err(err) = self.store.hash_incr_by(METADATA_HASH, &access_field(id), 1).await {
            warn!(memory_id = id, error = %err, "access counter increment failed (best-effort)");
        }
    }

    /// `GetMemory(id)`: cached memory or nil; increments the access
    /// counter on hit; deduplicates concurrent in-flight fetches.
    pub async fn get_memory(&self, id: &str) -> CacheResult<Option<Memory>> {
        self.with_timeout("get_memory", self.timeout(), self.get_memory_impl(id))
            .await
    }

    async fn get_memory_impl(&self, id: &str) -> CacheResult<Option<Memory>> {
        let dedup_key = format!("get:{id}");

        if let Some(existing) = self.inflight.get(&dedup_key) {
            let mut rx = existing.clone();
            drop(existing);
            return self.wait_for_result(&mut rx).await;
        }

        let (tx, rx) = watch::channel(None);
        self.inflight.insert(dedup_key.clone(), rx);

        let result = self.fetch_and_track(id).await;
        let _ = tx.send(Some(result.clone()));
        self.inflight.remove(&dedup_key);
        result
    }

    async fn wait_for_result(
        &self,
        rx: &mut watch::Receiver<Option<CacheResult<Option<Memory>>>>,
    ) -> CacheResult<Option<Memory>> {
        loop {
            if let Some(result) = rx.borrow().clone() {
                return result;
            }
            if rx.changed().await.is_err() {
                // Leader dropped without sending — treat as a miss rather
                // than blocking the caller forever.
                return Ok(None);
            }
        }
    }

    async fn fetch_and_track(&self, id: &str) -> CacheResult<Option<Memory>> {
        let raw = self.store.get(&memory_key(id)).await?;
        match raw {
            None => Ok(None),
            Some(raw) => {
                let cached: CachedMemory = serde_json::from_str(&raw).map_err(|e| CacheError::Operation {
                    op: "get_memory".to_string(),
                    reason: e.to_string(),
                })?;
                self.track_access(id).await;
                Ok(Some(cached.memory))
            }
        }
    }

    /// `PutMemory(id, memory, ttl?)`.
    pub async fn put_memory(&self, memory: &Memory, high_priority: bool) -> CacheResult<()> {
        self.with_timeout(
            "put_memory",
            self.timeout(),
            self.put_memory_impl(memory, high_priority, None),
        )
        .await
    }

    pub async fn put_memory_with_ttl(&self, memory: &Memory, ttl: Duration) -> CacheResult<()> {
        self.with_timeout(
            "put_memory",
            self.timeout(),
            self.put_memory_impl(memory, false, Some(ttl)),
        )
        .await
    }

    async fn put_memory_impl(
        &self,
        memory: &Memory,
        high_priority: bool,
        ttl_override: Option<Duration>,
    ) -> CacheResult<()> {
        let ttl = match ttl_override {
            Some(ttl) => ttl,
            None => self.placement_ttl(&memory.id, high_priority).await,
        };

        let payload = serde_json::to_string(&CachedMemory {
            memory: memory.for_cache(),
        })
        .map_err(|e| CacheError::Operation {
            op: "put_memory".to_string(),
            reason: e.to_string(),
        })?;

        self.store
            .set_with_ttl(&memory_key(&memory.id), payload, ttl.as_secs())
            .await?;

        self.track_access(&memory.id).await;
        self.spawn_keyword_indexing(memory.id.clone(), memory.content.clone());
        Ok(())
    }

    /// Schedule background keyword indexing (§9: "model as a per-id
    /// single-flight primitive" for reads; writes are simply best-effort
    /// fire-and-forget, per §7's propagation policy).
    fn spawn_keyword_indexing(&self, id: String, content: String) {
        let store = self.store.clone();
        tokio::spawn(async move {
            let tokens = extract_keywords(&content);
            if tokens.is_empty() {
                return;
            }
            if let Err(err) = store.set_add(&memory_keywords_key(&id), &tokens).await {
                warn!(memory_id = id, error = %err, "keyword reverse-index write failed (best-effort)");
                return;
            }
            for token in &tokens {
                if let Err(err) = store.set_add(&keyword_key(token), &[id.clone()]).await {
                    warn!(memory_id = id, token, error = %err, "keyword index write failed (best-effort)");
                }
            }
            debug!(memory_id = id, tokens = tokens.len(), "keyword index updated");
        });
    }

    /// `DeleteMemory(id)`: repairable partial-failure semantics — a crash
    /// mid-cleanup leaves stale keyword memberships that self-heal via the
    /// next `PutMemory` or simply resolve to a miss on `BatchGet` (§4.3).
    pub async fn delete_memory(&self, id: &str) -> CacheResult<()> {
        self.with_timeout("delete_memory", self.timeout(), self.delete_memory_impl(id))
            .await
    }

    async fn delete_memory_impl(&self, id: &str) -> CacheResult<()> {
        let keywords = self.store.set_members(&memory_keywords_key(id)).await.unwrap_or_default();

        self.store
            .del(&[memory_key(id), memory_keywords_key(id)])
            .await?;
        if let Err(err) = self.store.hash_del(METADATA_HASH, &access_field(id)).await {
            warn!(memory_id = id, error = %err, "access counter cleanup failed (best-effort)");
        }
        for word in keywords {
            if let Err(err) = self.store.set_remove(&keyword_key(&word), id).await {
                warn!(memory_id = id, word, error = %err, "keyword membership cleanup failed (best-effort)");
            }
        }
        Ok(())
    }

    pub async fn cache_search(&self, query: &str, limit: usize, results: &[Memory]) -> CacheResult<()> {
        self.with_timeout(
            "cache_search",
            self.timeout(),
            self.cache_search_impl(query, limit, results),
        )
        .await
    }

    async fn cache_search_impl(&self, query: &str, limit: usize, results: &[Memory]) -> CacheResult<()> {
        let payload = serde_json::to_string(results).map_err(|e| CacheError::Operation {
            op: "cache_search".to_string(),
            reason: e.to_string(),
        })?;
        self.store
            .set_with_ttl(
                &search_cache_key(query, limit),
                payload,
                self.config.search_ttl.as_secs(),
            )
            .await?;
        Ok(())
    }

    pub async fn get_cached_search(&self, query: &str, limit: usize) -> CacheResult<Option<Vec<Memory>>> {
        self.with_timeout(
            "get_cached_search",
            self.timeout(),
            self.get_cached_search_impl(query, limit),
        )
        .await
    }

    async fn get_cached_search_impl(&self, query: &str, limit: usize) -> CacheResult<Option<Vec<Memory>>> {
        let raw = self.store.get(&search_cache_key(query, limit)).await?;
        match raw {
            None => Ok(None),
            Some(raw) => {
                let memories: Vec<Memory> = serde_json::from_str(&raw).map_err(|e| CacheError::Operation {
                    op: "get_cached_search".to_string(),
                    reason: e.to_string(),
                })?;
                Ok(Some(memories))
            }
        }
    }

    /// SCAN-deletes every `search:*` key (§4.3).
    pub async fn invalidate_search_cache(&self) -> CacheResult<()> {
        self.with_timeout(
            "invalidate_search_cache",
            self.timeout(),
            self.invalidate_search_cache_impl(),
        )
        .await
    }

    async fn invalidate_search_cache_impl(&self) -> CacheResult<()> {
        let keys = scan_all(self.store.as_ref(), "search:*").await?;
        if !keys.is_empty() {
            self.store.del(&keys).await?;
        }
        Ok(())
    }

    /// Chunked (10 per chunk) parallel dispatch (§4.3).
    pub async fn batch_get(&self, ids: &[String]) -> CacheResult<Vec<Option<Memory>>> {
        let mut results = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(BATCH_CHUNK_SIZE) {
            let futures = chunk.iter().map(|id| self.get_memory(id));
            let chunk_results = futures::future::join_all(futures).await;
            for result in chunk_results {
                results.push(result.unwrap_or_else(|err| {
                    warn!(error = %err, "batch_get entry failed, treating as miss");
                    None
                }));
            }
        }
        Ok(results)
    }

    /// Chunked, error-isolated `BatchSet` (§4.3: one failure does not abort
    /// the batch).
    pub async fn batch_set(&self, memories: &[Memory], high_priority: bool) -> CacheResult<BatchSetReport> {
        let mut report = BatchSetReport::default();
        for chunk in memories.chunks(BATCH_CHUNK_SIZE) {
            let futures = chunk.iter().map(|m| self.put_memory(m, high_priority));
            let chunk_results = futures::future::join_all(futures).await;
            for result in chunk_results {
                match result {
                    Ok(()) => report.succeeded += 1,
                    Err(err) => {
                        warn!(error = %err, "batch_set entry failed (error isolation)");
                        report.failed += 1;
                    }
                }
            }
        }
        Ok(report)
    }

    /// Explicit cache wipe: clears every memory, keyword index, and access
    /// counter so a fresh generation starts from zero (§3 "Access counter...
    /// reset only by explicit cache wipe"). Used by `optimize_cache` with
    /// `force_refresh` so a shrinking re-population doesn't leave stale
    /// `memory:*` entries from the previous generation (§8 S5).
    pub async fn wipe(&self) -> CacheResult<()> {
        self.with_timeout("wipe", self.timeout(), self.wipe_impl()).await
    }

    async fn wipe_impl(&self) -> CacheResult<()> {
        let mut keys = scan_all(self.store.as_ref(), "memory:*").await?;
        keys.extend(scan_all(self.store.as_ref(), "keyword:*").await?);
        if !keys.is_empty() {
            self.store.del(&keys).await?;
        }
        let access_fields: Vec<String> = self
            .store
            .hash_get_all(METADATA_HASH)
            .await?
            .into_keys()
            .collect();
        for field in access_fields {
            if let Err(err) = self.store.hash_del(METADATA_HASH, &field).await {
                warn!(field, error = %err, "access counter wipe failed (best-effort)");
            }
        }
        Ok(())
    }

    /// Keyword-index lookup for the search planner (§4.6 step 2a): for
    /// each token, accumulate one point per memory id found under
    /// `keyword:{token}`. The planner never touches hot-store keys
    /// directly — this is the one sanctioned read path into the index.
    pub async fn score_by_keywords(&self, tokens: &[String]) -> CacheResult<HashMap<String, i64>> {
        self.with_timeout("score_by_keywords", self.timeout(), self.score_by_keywords_impl(tokens))
            .await
    }

    async fn score_by_keywords_impl(&self, tokens: &[String]) -> CacheResult<HashMap<String, i64>> {
        let mut scores: HashMap<String, i64> = HashMap::new();
        for token in tokens {
            let members = self.store.set_members(&keyword_key(token)).await?;
            for id in members {
                *scores.entry(id).or_insert(0) += 1;
            }
        }
        Ok(scores)
    }

    /// Top N memory ids by access count, used both by `cache_stats` and
    /// the sync worker's refresh step (§4.7).
    pub async fn top_accessed(&self, n: usize) -> CacheResult<Vec<(String, i64)>> {
        let all = self.store.hash_get_all(METADATA_HASH).await?;
        let mut entries: Vec<(String, i64)> = all
            .into_iter()
            .filter_map(|(field, value)| {
                field
                    .strip_prefix("access:")
                    .map(|id| (id.to_string(), value.parse::<i64>().unwrap_or(0)))
            })
            .collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1));
        entries.truncate(n);
        Ok(entries)
    }

    /// `Stats()` — 10s timeout per §4.3.
    pub async fn stats(&self) -> CacheResult<CacheStats> {
        self.with_timeout("stats", STATS_TIMEOUT, self.stats_impl()).await
    }

    async fn stats_impl(&self) -> CacheResult<CacheStats> {
        let memory_keys = scan_all(self.store.as_ref(), "memory:*").await?;
        let total_memories = memory_keys
            .iter()
            .filter(|k| !k.starts_with("memory:keywords:"))
            .count() as u64;

        let access_hash = self.store.hash_get_all(METADATA_HASH).await?;
        let total_access: u64 = access_hash
            .values()
            .filter_map(|v| v.parse::<i64>().ok())
            .map(|v| v.max(0) as u64)
            .sum();
        let access_counters = access_hash.len() as u64;

        // §9 Open Question: preserved verbatim for dashboard parity even
        // though it is not a true ratio.
        let hit_rate = if total_memories == 0 {
            0.0
        } else {
            (total_access as f64 / total_memories as f64 * 10.0).min(100.0)
        };

        let top_accessed = self.top_accessed(3).await?;

        let search_keys = scan_all(self.store.as_ref(), "search:*").await?;
        let keyword_keys = scan_all(self.store.as_ref(), "keyword:*").await?;
        let keyword_indexes = keyword_keys.len() as u64;

        let memory_usage_bytes = match self.store.info("memory").await {
            Ok(info) => parse_used_memory(&info).unwrap_or(total_memories * 512),
            Err(err) => {
                warn!(error = %err, "hot store info(memory) failed, falling back to key-count estimate");
                total_memories * 512
            }
        };

        Ok(CacheStats {
            total_memories,
            total_access,
            hit_rate,
            memory_usage_bytes,
            top_accessed,
            cached_searches: search_keys.len() as u64,
            access_counters,
            keyword_indexes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hotstore::InMemoryHotStore;
    use std::collections::HashMap as Map;

    fn test_config() -> CacheConfig {
        CacheConfig {
            l1_ttl: Duration::from_secs(86_400),
            l2_ttl: Duration::from_secs(604_800),
            search_ttl: Duration::from_secs(300),
            max_size: 1000,
            frequent_access_threshold: 3,
            operation_timeout: Duration::from_secs(5),
        }
    }

    fn memory(id: &str, content: &str) -> Memory {
        Memory {
            id: id.to_string(),
            content: content.to_string(),
            user_id: "u1".to_string(),
            created_at: "2026-01-01T00:00:00Z".to_string(),
            updated_at: "2026-01-01T00:00:00Z".to_string(),
            metadata: Map::new(),
            source: None,
            relevance_score: None,
        }
    }

    fn manager() -> CacheManager {
        CacheManager::new(Arc::new(InMemoryHotStore::new()), test_config())
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let cache = manager();
        cache.put_memory(&memory("m1", "hello world"), false).await.unwrap();
        let fetched = cache.get_memory("m1").await.unwrap().unwrap();
        assert_eq!(fetched.content, "hello world");
    }

    #[tokio::test]
    async fn get_missing_returns_none() {
        let cache = manager();
        assert!(cache.get_memory("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_removes_memory_and_keyword_membership() {
        let cache = manager();
        cache
            .put_memory(&memory("m1", "Redis caches hot memories"), false)
            .await
            .unwrap();
        // Let the background keyword-indexing task run.
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        cache.delete_memory("m1").await.unwrap();

        assert!(cache.get_memory("m1").await.unwrap().is_none());
        let members = cache.store.set_members("keyword:redis").await.unwrap();
        assert!(!members.contains(&"m1".to_string()));
    }

    #[tokio::test]
    async fn access_counter_crosses_threshold_promotes_to_l1() {
        let cache = manager();
        let m = memory("m1", "tracked memory content");
        // Low priority puts below threshold land at L2.
        cache.put_memory(&m, false).await.unwrap();
        for _ in 0..5 {
            cache.get_memory("m1").await.unwrap();
        }
        cache.put_memory(&m, false).await.unwrap();
        let ttl = cache.store.ttl(&memory_key("m1")).await.unwrap();
        assert!(ttl > 86_000 && ttl <= 86_400, "expected L1 TTL window, got {ttl}");
    }

    #[tokio::test]
    async fn search_cache_round_trips_and_invalidates() {
        let cache = manager();
        let results = vec![memory("m1", "hello")];
        cache.cache_search("query", 10, &results).await.unwrap();
        assert!(cache.get_cached_search("query", 10).await.unwrap().is_some());

        cache.invalidate_search_cache().await.unwrap();
        assert!(cache.get_cached_search("query", 10).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn batch_set_isolates_failures_and_batch_get_hydrates() {
        let cache = manager();
        let memories = vec![memory("m1", "a"), memory("m2", "b"), memory("m3", "c")];
        let report = cache.batch_set(&memories, false).await.unwrap();
        assert_eq!(report.succeeded, 3);
        assert_eq!(report.failed, 0);

        let fetched = cache
            .batch_get(&["m1".to_string(), "missing".to_string(), "m3".to_string()])
            .await
            .unwrap();
        assert!(fetched[0].is_some());
        assert!(fetched[1].is_none());
        assert!(fetched[2].is_some());
    }

    #[tokio::test]
    async fn concurrent_get_memory_dedups_to_single_fetch() {
        let cache = Arc::new(manager());
        cache.put_memory(&memory("m1", "shared"), false).await.unwrap();

        let c1 = cache.clone();
        let c2 = cache.clone();
        let (r1, r2) = tokio::join!(
            tokio::spawn(async move { c1.get_memory("m1").await }),
            tokio::spawn(async move { c2.get_memory("m1").await })
        );
        assert_eq!(r1.unwrap().unwrap().unwrap().content, "shared");
        assert_eq!(r2.unwrap().unwrap().unwrap().content, "shared");
    }

    #[tokio::test]
    async fn stats_reports_hit_rate_heuristic() {
        let cache = manager();
        cache.put_memory(&memory("m1", "x"), false).await.unwrap();
        cache.get_memory("m1").await.unwrap();
        cache.get_memory("m1").await.unwrap();

        let stats = cache.stats().await.unwrap();
        assert_eq!(stats.total_memories, 1);
        assert!(stats.total_access >= 2);
        assert!(stats.hit_rate <= 100.0);
    }

    #[tokio::test]
    async fn stats_reports_access_counters_and_keyword_indexes_distinctly_from_memory_count() {
        let cache = manager();
        cache
            .put_memory(&memory("m1", "Redis caches hot memories"), false)
            .await
            .unwrap();
        cache
            .put_memory(&memory("m2", "Redis stores session data"), false)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Deleting m1 drops its `memory:*` key but not its keyword
        // memberships under "redis"/"stores"/etc tied to m2, nor m1's own
        // access counter (cleared separately by `delete_memory`'s partial
        // cleanup, not folded into the memory count either way).
        cache.get_memory("m1").await.unwrap();
        cache.get_memory("m2").await.unwrap();

        let stats = cache.stats().await.unwrap();
        assert_eq!(stats.total_memories, 2);
        assert_eq!(stats.access_counters, 2);
        // Both memories share the token "redis"; keyword_indexes counts
        // distinct `keyword:*` sets, not memory count, so it must not just
        // mirror total_memories.
        assert!(stats.keyword_indexes >= 1);
        assert_ne!(stats.keyword_indexes, stats.total_memories * 3);
    }

    #[test]
    fn parse_used_memory_reads_the_info_memory_line() {
        let info = "# Memory\r\nused_memory:12345\r\nmaxmemory:0\r\n";
        assert_eq!(parse_used_memory(info), Some(12345));
        assert_eq!(parse_used_memory("# Memory\r\n"), None);
    }

    #[tokio::test]
    async fn score_by_keywords_accumulates_per_matched_token() {
        let cache = manager();
        cache
            .put_memory(&memory("m1", "Redis caches hot memories quickly"), false)
            .await
            .unwrap();
        cache
            .put_memory(&memory("m2", "Redis stores session data"), false)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let scores = cache
            .score_by_keywords(&["redis".to_string(), "memories".to_string()])
            .await
            .unwrap();
        assert_eq!(scores.get("m1").copied(), Some(2));
        assert_eq!(scores.get("m2").copied(), Some(1));
    }

    #[tokio::test]
    async fn wipe_clears_memories_keywords_and_access_counters() {
        let cache = manager();
        cache
            .put_memory(&memory("m1", "Redis caches hot memories"), false)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        cache.get_memory("m1").await.unwrap();

        cache.wipe().await.unwrap();

        assert!(cache.get_memory("m1").await.unwrap().is_none());
        let members = cache.store.set_members("keyword:redis").await.unwrap();
        assert!(members.is_empty());
        let stats = cache.stats().await.unwrap();
        assert_eq!(stats.total_access, 0);
        assert_eq!(stats.access_counters, 0);
        assert_eq!(stats.keyword_indexes, 0);
    }

    #[test]
    fn search_cache_key_is_stable_for_same_query_and_limit() {
        assert_eq!(search_cache_key("foo", 10), search_cache_key("foo", 10));
        assert_ne!(search_cache_key("foo", 10), search_cache_key("foo", 20));
        assert_ne!(search_cache_key("foo", 10), search_cache_key("bar", 10));
    }
}
