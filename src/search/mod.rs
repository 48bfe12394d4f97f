//! Hybrid Search Planner (C6): cache-first or cloud-first retrieval,
//! keyword scoring, hot/cloud merge, and result caching (§4.6).

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::cache::{extract_keywords, CacheManager};
use crate::cloud::CloudClient;
use crate::error::Error;
use crate::model::{Memory, Source};

pub struct HybridSearchPlanner {
    cache: Arc<CacheManager>,
    cloud: Arc<dyn CloudClient>,
}

impl HybridSearchPlanner {
    pub fn new(cache: Arc<CacheManager>, cloud: Arc<dyn CloudClient>) -> Self {
        Self { cache, cloud }
    }

    /// `SearchMemory(query, limit, preferCache)` (§4.6).
    pub async fn search(&self, user_id: &str, query: &str, limit: usize, prefer_cache: bool) -> Result<Vec<Memory>, Error> {
        if prefer_cache {
            if let Some(cached) = self.cache.get_cached_search(query, limit).await? {
                debug!(query, "search cache hit");
                return Ok(cached.into_iter().map(|m| m.with_source(Source::Hot)).collect());
            }
        }

        let merged = if prefer_cache {
            self.search_cache_first(user_id, query, limit).await?
        } else {
            self.search_cloud_first(user_id, query, limit).await?
        };

        let truncated: Vec<Memory> = merged.into_iter().take(limit).collect();
        self.cache.cache_search(query, limit, &truncated).await?;
        Ok(truncated)
    }

    async fn search_cache_first(&self, user_id: &str, query: &str, limit: usize) -> Result<Vec<Memory>, Error> {
        let tokens = extract_keywords(query);
        let scores = self.cache.score_by_keywords(&tokens).await?;

        let mut scored: Vec<(String, i64)> = scores.into_iter().collect();
        // Descending by score; ties are implementation-defined (§4.6 tie-break).
        scored.sort_by(|a, b| b.1.cmp(&a.1));
        scored.truncate(limit);

        let ids: Vec<String> = scored.iter().map(|(id, _)| id.clone()).collect();
        let hydrated = self.cache.batch_get(&ids).await?;

        let mut hot: Vec<Memory> = Vec::new();
        for ((_, score), memory) in scored.into_iter().zip(hydrated.into_iter()) {
            if let Some(memory) = memory {
                hot.push(memory.with_source(Source::Hot).with_relevance_score(score as f64));
            }
        }

        if hot.len() >= limit {
            return Ok(hot);
        }

        let remainder = limit - hot.len();
        let cloud_results = self.cloud.search(user_id, query, remainder + hot.len()).await.unwrap_or_default();

        let hot_ids: std::collections::HashSet<&str> = hot.iter().map(|m| m.id.as_str()).collect();
        let mut merged = hot;
        for memory in cloud_results {
            if hot_ids.contains(memory.id.as_str()) {
                continue;
            }
            merged.push(memory.with_source(Source::Cloud));
            if merged.len() >= limit {
                break;
            }
        }
        Ok(merged)
    }

    async fn search_cloud_first(&self, user_id: &str, query: &str, limit: usize) -> Result<Vec<Memory>, Error> {
        let results = self.cloud.search(user_id, query, limit).await?;
        for memory in &results {
            if let Err(err) = self.cache.put_memory(memory, false).await {
                tracing::warn!(memory_id = memory.id, error = %err, "opportunistic cache-after-search failed");
            }
        }
        Ok(results.into_iter().map(|m| m.with_source(Source::Cloud)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::{AddMemoryContent, DemoCloudClient};
    use crate::config::CacheConfig;
    use crate::hotstore::InMemoryHotStore;
    use std::time::Duration;

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

    async fn seeded_planner() -> (HybridSearchPlanner, Arc<CacheManager>, Arc<DemoCloudClient>) {
        let hot_store = Arc::new(InMemoryHotStore::new());
        let cache = Arc::new(CacheManager::new(hot_store, cache_config()));
        let cloud = Arc::new(DemoCloudClient::new());

        let added = cloud
            .add_memory("u1", AddMemoryContent::Content("User prefers dark mode interfaces".into()), HashMap::new())
            .await
            .unwrap();
        cache.put_memory(&added[0], false).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let planner = HybridSearchPlanner::new(cache.clone(), cloud.clone());
        (planner, cache, cloud)
    }

    #[tokio::test]
    async fn cache_hit_short_circuits_with_hot_source() {
        let (planner, cache, _cloud) = seeded_planner().await;
        cache.cache_search("dark", 10, &[]).await.unwrap();

        let results = planner.search("u1", "dark", 10, true).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn cache_first_hydrates_from_keyword_index() {
        let (planner, _cache, _cloud) = seeded_planner().await;
        let results = planner.search("u1", "dark mode", 10, true).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].source, Some(Source::Hot));
    }

    #[tokio::test]
    async fn cache_first_supplements_from_cloud_when_short() {
        let (planner, _cache, cloud) = seeded_planner().await;
        cloud
            .add_memory("u1", AddMemoryContent::Content("Completely different unrelated note".into()), HashMap::new())
            .await
            .unwrap();

        let results = planner.search("u1", "unrelated", 10, true).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].source, Some(Source::Cloud));
    }

    #[tokio::test]
    async fn cloud_first_opportunistically_caches_results() {
        let (planner, cache, _cloud) = seeded_planner().await;
        let results = planner.search("u1", "dark", 10, false).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].source, Some(Source::Cloud));

        let cached = cache.get_memory(&results[0].id).await.unwrap();
        assert!(cached.is_some());
    }

    #[tokio::test]
    async fn final_merged_list_is_cached_under_search_key() {
        let (planner, cache, _cloud) = seeded_planner().await;
        planner.search("u1", "dark mode", 5, true).await.unwrap();
        let cached = cache.get_cached_search("dark mode", 5).await.unwrap();
        assert!(cached.is_some());
    }
}
