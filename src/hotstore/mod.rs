//! Hot-store client (C1): a thin wrapper over the KV store the Cache
//! Manager is the sole owner of.

mod memory_store;
mod redis_store;

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::broadcast;

pub use memory_store::InMemoryHotStore;
pub use redis_store::RedisHotStore;

use crate::error::HotStoreError;

/// Contract shared by the Redis-backed and in-memory substitute hot stores.
///
/// `Scan` is the only enumeration primitive (§4.1): no method here exposes
/// unbounded keyspace globbing.
#[async_trait]
pub trait HotStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, HotStoreError>;

    async fn set_with_ttl(
        &self,
        key: &str,
        value: String,
        ttl_seconds: u64,
    ) -> Result<(), HotStoreError>;

    async fn del(&self, keys: &[String]) -> Result<u64, HotStoreError>;

    async fn set_add(&self, key: &str, members: &[String]) -> Result<(), HotStoreError>;

    async fn set_remove(&self, key: &str, member: &str) -> Result<(), HotStoreError>;

    async fn set_members(&self, key: &str) -> Result<Vec<String>, HotStoreError>;

    /// Atomic hash-field increment, standardized per §9 to avoid the
    /// "two incompatible access-counter encodings" bug class.
    async fn hash_incr_by(&self, key: &str, field: &str, n: i64) -> Result<i64, HotStoreError>;

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>, HotStoreError>;

    /// Remove a single hash field (used to drop `access:{id}` from
    /// `cache:metadata` on delete without touching sibling counters).
    async fn hash_del(&self, key: &str, field: &str) -> Result<(), HotStoreError>;

    async fn scan(
        &self,
        cursor: u64,
        match_pattern: &str,
        count: usize,
    ) -> Result<(u64, Vec<String>), HotStoreError>;

    /// Remaining TTL in seconds; -1 means no expiry, -2 means absent.
    async fn ttl(&self, key: &str) -> Result<i64, HotStoreError>;

    /// `Info(section) -> string` (§4.1): backend diagnostics in the INFO
    /// line-protocol shape (`field:value\r\n` per line), e.g. `used_memory`
    /// under the `"memory"` section.
    async fn info(&self, section: &str) -> Result<String, HotStoreError>;

    async fn publish(&self, channel: &str, payload: String) -> Result<(), HotStoreError>;

    /// Subscribe to a channel. Not `async`: subscription is local broadcast
    /// registration, trait-object friendly, and cheap to call repeatedly.
    fn subscribe(&self, channel: &str) -> broadcast::Receiver<String>;

    /// Whether the underlying connection is currently usable.
    async fn is_connected(&self) -> bool;
}

/// SCAN every key matching `pattern`, looping the cursor to completion.
/// Shared helper so both hot-store backends implement the cursor loop once.
pub async fn scan_all(
    store: &dyn HotStore,
    pattern: &str,
) -> Result<Vec<String>, HotStoreError> {
    let mut cursor = 0u64;
    let mut keys = Vec::new();
    loop {
        let (next_cursor, batch) = store.scan(cursor, pattern, 100).await?;
        keys.extend(batch);
        if next_cursor == 0 {
            break;
        }
        cursor = next_cursor;
    }
    Ok(keys)
}
