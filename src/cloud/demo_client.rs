//! In-memory substitute for the cloud memory API (§4.2: "a demo/offline
//! mode MUST be supported... the rest of the system MUST NOT branch on
//! this"). Selected when no `CLOUD_API_KEY` is configured.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use crate::cloud::{AddMemoryContent, CloudClient};
use crate::error::CloudError;
use crate::model::Memory;

/// Process-local store keyed by user id, mutated under a short, never-held-
/// across-await `std::sync::Mutex` (mirrors the teacher's `response_cache`
/// convention for purely synchronous critical sections).
pub struct DemoCloudClient {
    memories: Mutex<HashMap<String, Vec<Memory>>>,
}

impl Default for DemoCloudClient {
    fn default() -> Self {
        Self::new()
    }
}

impl DemoCloudClient {
    pub fn new() -> Self {
        Self {
            memories: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl CloudClient for DemoCloudClient {
    async fn add_memory(
        &self,
        user_id: &str,
        content: AddMemoryContent,
        metadata: HashMap<String, serde_json::Value>,
    ) -> Result<Vec<Memory>, CloudError> {
        let text = match content {
            AddMemoryContent::Content(text) => text,
            AddMemoryContent::Messages(messages) => messages
                .into_iter()
                .map(|m| m.content)
                .collect::<Vec<_>>()
                .join(" "),
        };
        let now = Utc::now().to_rfc3339();
        let memory = Memory {
            id: uuid::Uuid::new_v4().to_string(),
            content: text,
            user_id: user_id.to_string(),
            created_at: now.clone(),
            updated_at: now,
            metadata,
            source: None,
            relevance_score: None,
        };

        let mut guard = self.memories.lock().unwrap_or_else(|e| e.into_inner());
        guard.entry(user_id.to_string()).or_default().push(memory.clone());
        Ok(vec![memory])
    }

    async fn search(&self, user_id: &str, query: &str, limit: usize) -> Result<Vec<Memory>, CloudError> {
        let query_lower = query.to_lowercase();
        let guard = self.memories.lock().unwrap_or_else(|e| e.into_inner());
        let mut matches: Vec<Memory> = guard
            .get(user_id)
            .map(|memories| {
                memories
                    .iter()
                    .filter(|m| m.content.to_lowercase().contains(&query_lower))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        matches.truncate(limit);
        Ok(matches)
    }

    async fn get(&self, user_id: &str, id: &str) -> Result<Memory, CloudError> {
        let guard = self.memories.lock().unwrap_or_else(|e| e.into_inner());
        guard
            .get(user_id)
            .and_then(|memories| memories.iter().find(|m| m.id == id))
            .cloned()
            .ok_or_else(|| CloudError::NotFound {
                user_id: user_id.to_string(),
                id: id.to_string(),
            })
    }

    async fn list_all(&self, user_id: &str, limit: usize) -> Result<Vec<Memory>, CloudError> {
        let guard = self.memories.lock().unwrap_or_else(|e| e.into_inner());
        let mut memories = guard.get(user_id).cloned().unwrap_or_default();
        memories.truncate(limit);
        Ok(memories)
    }

    async fn delete(&self, user_id: &str, id: &str) -> Result<(), CloudError> {
        let mut guard = self.memories.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(memories) = guard.get_mut(user_id) {
            memories.retain(|m| m.id != id);
        }
        Ok(())
    }

    fn is_demo(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn add_then_get_round_trips() {
        let client = DemoCloudClient::new();
        let added = client
            .add_memory("u1", AddMemoryContent::Content("hello world".into()), HashMap::new())
            .await
            .unwrap();
        assert_eq!(added.len(), 1);
        let fetched = client.get("u1", &added[0].id).await.unwrap();
        assert_eq!(fetched.content, "hello world");
    }

    #[tokio::test]
    async fn search_matches_substring_case_insensitively() {
        let client = DemoCloudClient::new();
        client
            .add_memory("u1", AddMemoryContent::Content("Redis caches hot memories".into()), HashMap::new())
            .await
            .unwrap();
        let results = client.search("u1", "redis", 10).await.unwrap();
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn delete_removes_from_list_all() {
        let client = DemoCloudClient::new();
        let added = client
            .add_memory("u1", AddMemoryContent::Content("temp".into()), HashMap::new())
            .await
            .unwrap();
        client.delete("u1", &added[0].id).await.unwrap();
        let remaining = client.list_all("u1", 100).await.unwrap();
        assert!(remaining.is_empty());
    }

    #[tokio::test]
    async fn get_missing_returns_not_found() {
        let client = DemoCloudClient::new();
        let err = client.get("u1", "missing").await.unwrap_err();
        assert!(matches!(err, CloudError::NotFound { .. }));
    }
}
