//! `get_all_memories` (§6): paginated listing with a response-size guard.

use std::time::Instant;

use async_trait::async_trait;

use crate::engine::Engine;
use crate::error::ToolError;
use crate::model::{Memory, Source};
use crate::util::truncate_preview;

use super::tool::{optional_str, optional_u64, RiskLevel, Tool, ToolOutput};

pub struct GetAllMemoriesTool;

/// Past this many serialized bytes, content is truncated and the response
/// is flagged (§6: "exceeds ~40 000 characters").
const MAX_RESPONSE_BYTES: usize = 40_000;

const MAX_LIMIT: u64 = 500;

const TRUNCATED_CONTENT_LEN: usize = 100;

fn truncate_memories(memories: Vec<Memory>) -> Vec<Memory> {
    memories
        .into_iter()
        .map(|mut m| {
            m.content = truncate_preview(&m.content, TRUNCATED_CONTENT_LEN).to_string();
            m.metadata.insert("_truncated".to_string(), serde_json::json!(true));
            m
        })
        .collect()
}

#[async_trait]
impl Tool for GetAllMemoriesTool {
    fn name(&self) -> &str {
        "get_all_memories"
    }

    fn description(&self) -> &str {
        "List memories for a user with pagination, truncating content when the response would be too large"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "user_id": {"type": "string"},
                "limit": {"type": "integer", "default": 500, "maximum": 500},
                "offset": {"type": "integer", "default": 0},
                "prefer_cache": {"type": "boolean", "default": true},
                "include_cache_stats": {"type": "boolean", "default": true},
            },
            "required": [],
        })
    }

    async fn execute(&self, params: serde_json::Value, engine: &Engine) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let user_id = optional_str(&params, "user_id", &engine.default_user_id);
        let limit = optional_u64(&params, "limit", MAX_LIMIT).min(MAX_LIMIT) as usize;
        let offset = optional_u64(&params, "offset", 0) as usize;
        let prefer_cache = params.get("prefer_cache").and_then(|v| v.as_bool()).unwrap_or(true);
        let include_cache_stats = params
            .get("include_cache_stats")
            .and_then(|v| v.as_bool())
            .unwrap_or(true);

        let (all, source) = if prefer_cache {
            let cached_ids: Vec<String> = engine
                .cache
                .top_accessed(offset + limit)
                .await?
                .into_iter()
                .map(|(id, _)| id)
                .collect();
            let hydrated = engine.cache.batch_get(&cached_ids).await?;
            let memories: Vec<Memory> = hydrated
                .into_iter()
                .flatten()
                .filter(|m| m.user_id == user_id)
                .map(|m| m.with_source(Source::Hot))
                .collect();

            if memories.len() >= offset + limit && !memories.is_empty() {
                (memories, "hot")
            } else {
                let memories = engine.cloud.list_all(user_id, offset + limit).await?;
                (
                    memories.into_iter().map(|m| m.with_source(Source::Cloud)).collect(),
                    "cloud",
                )
            }
        } else {
            let memories = engine.cloud.list_all(user_id, offset + limit).await?;
            (
                memories.into_iter().map(|m| m.with_source(Source::Cloud)).collect(),
                "cloud",
            )
        };

        let total = all.len();
        let page: Vec<Memory> = all.into_iter().skip(offset).take(limit).collect();
        let returned = page.len();
        let has_more = offset + returned < total;

        let mut result = serde_json::json!({
            "total": total,
            "limit": limit,
            "offset": offset,
            "returned": returned,
            "hasMore": has_more,
            "source": source,
            "memories": page,
        });

        let approx_size = serde_json::to_string(&result).map(|s| s.len()).unwrap_or(0);
        if approx_size > MAX_RESPONSE_BYTES {
            let truncated_page: Vec<Memory> = result["memories"]
                .as_array()
                .cloned()
                .map(|arr| arr.into_iter().filter_map(|v| serde_json::from_value(v).ok()).collect())
                .unwrap_or_default();
            let truncated_page = truncate_memories(truncated_page);
            result["memories"] = serde_json::json!(truncated_page);
            result["truncated"] = serde_json::json!(true);
        }

        if include_cache_stats {
            result["cacheStats"] = serde_json::json!(engine.cache.stats().await?);
        }

        Ok(ToolOutput::success(result, start.elapsed()))
    }

    fn risk_level(&self) -> RiskLevel {
        RiskLevel::Low
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[tokio::test]
    async fn returns_pagination_fields() {
        let engine = Engine::bootstrap(Config::demo()).await.unwrap();
        crate::tools::AddMemoryTool
            .execute(serde_json::json!({"content": "one", "async": false}), &engine)
            .await
            .unwrap();

        let tool = GetAllMemoriesTool;
        let output = tool
            .execute(serde_json::json!({"limit": 10, "offset": 0}), &engine)
            .await
            .unwrap();
        assert_eq!(output.result["offset"], 0);
        assert!(output.result["memories"].as_array().unwrap().len() <= 10);
    }

    #[tokio::test]
    async fn truncate_memories_flags_metadata_and_shortens_content() {
        let memory = Memory {
            id: "m1".into(),
            content: "x".repeat(500),
            user_id: "u1".into(),
            created_at: "2026-01-01T00:00:00Z".into(),
            updated_at: "2026-01-01T00:00:00Z".into(),
            metadata: Default::default(),
            source: None,
            relevance_score: None,
        };
        let truncated = truncate_memories(vec![memory]);
        assert_eq!(truncated[0].content.len(), TRUNCATED_CONTENT_LEN);
        assert_eq!(truncated[0].metadata["_truncated"], serde_json::json!(true));
    }
}
