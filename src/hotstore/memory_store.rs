//! In-memory `HotStore` substitute, used by Demo/HotOnly modes and by
//! tests that would otherwise need a live Redis instance.
//!
//! Keeps the same semantics as [`RedisHotStore`](super::RedisHotStore) —
//! TTL expiry, SCAN-style cursor enumeration, hash-field counters — without
//! a network dependency, matching the teacher's "demo/offline substitute
//! with the same interface" pattern (§4.2, §4.9).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::error::HotStoreError;
use crate::hotstore::HotStore;

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self) -> bool {
        self.expires_at.map(|at| Instant::now() >= at).unwrap_or(false)
    }
}

/// Process-local hot store backed by `DashMap`s. Never persists across
/// restarts; exists purely as the alternate path when no real hot store is
/// reachable.
pub struct InMemoryHotStore {
    values: DashMap<String, Entry>,
    sets: DashMap<String, std::collections::HashSet<String>>,
    hashes: DashMap<String, HashMap<String, i64>>,
    channels: Arc<DashMap<String, broadcast::Sender<String>>>,
    connected: Arc<AtomicBool>,
}

impl Default for InMemoryHotStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryHotStore {
    pub fn new() -> Self {
        Self {
            values: DashMap::new(),
            sets: DashMap::new(),
            hashes: DashMap::new(),
            channels: Arc::new(DashMap::new()),
            connected: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Simple glob matcher supporting a single trailing/leading/inner `*`,
    /// enough for the key patterns this service actually uses
    /// (`memory:*`, `search:*`, `keyword:*`).
    fn glob_match(pattern: &str, candidate: &str) -> bool {
        if !pattern.contains('*') {
            return pattern == candidate;
        }
        let parts: Vec<&str> = pattern.split('*').collect();
        let mut rest = candidate;
        for (i, part) in parts.iter().enumerate() {
            if part.is_empty() {
                continue;
            }
            if i == 0 {
                if !rest.starts_with(part) {
                    return false;
                }
                rest = &rest[part.len()..];
            } else if i == parts.len() - 1 {
                return rest.ends_with(part);
            } else if let Some(pos) = rest.find(part) {
                rest = &rest[pos + part.len()..];
            } else {
                return false;
            }
        }
        true
    }
}

#[async_trait]
impl HotStore for InMemoryHotStore {
    async fn get(&self, key: &str) -> Result<Option<String>, HotStoreError> {
        match self.values.get(key) {
            Some(entry) if !entry.is_expired() => Ok(Some(entry.value.clone())),
            Some(_) => {
                self.values.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set_with_ttl(
        &self,
        key: &str,
        value: String,
        ttl_seconds: u64,
    ) -> Result<(), HotStoreError> {
        let expires_at = if ttl_seconds == 0 {
            None
        } else {
            Some(Instant::now() + Duration::from_secs(ttl_seconds))
        };
        self.values.insert(key.to_string(), Entry { value, expires_at });
        Ok(())
    }

    async fn del(&self, keys: &[String]) -> Result<u64, HotStoreError> {
        let mut removed = 0u64;
        for key in keys {
            if self.values.remove(key).is_some() {
                removed += 1;
            }
            if self.sets.remove(key).is_some() {
                removed += 1;
            }
            if self.hashes.remove(key).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn set_add(&self, key: &str, members: &[String]) -> Result<(), HotStoreError> {
        let mut set = self.sets.entry(key.to_string()).or_default();
        for m in members {
            set.insert(m.clone());
        }
        Ok(())
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<(), HotStoreError> {
        if let Some(mut set) = self.sets.get_mut(key) {
            set.remove(member);
        }
        Ok(())
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, HotStoreError> {
        Ok(self
            .sets
            .get(key)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn hash_incr_by(&self, key: &str, field: &str, n: i64) -> Result<i64, HotStoreError> {
        let mut hash = self.hashes.entry(key.to_string()).or_default();
        let entry = hash.entry(field.to_string()).or_insert(0);
        *entry += n;
        Ok(*entry)
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>, HotStoreError> {
        Ok(self
            .hashes
            .get(key)
            .map(|h| h.iter().map(|(k, v)| (k.clone(), v.to_string())).collect())
            .unwrap_or_default())
    }

    async fn hash_del(&self, key: &str, field: &str) -> Result<(), HotStoreError> {
        if let Some(mut hash) = self.hashes.get_mut(key) {
            hash.remove(field);
        }
        Ok(())
    }

    async fn scan(
        &self,
        cursor: u64,
        match_pattern: &str,
        count: usize,
    ) -> Result<(u64, Vec<String>), HotStoreError> {
        let mut all_keys: Vec<String> = self.values.iter().map(|e| e.key().clone()).collect();
        all_keys.extend(self.sets.iter().map(|e| e.key().clone()));
        all_keys.extend(self.hashes.iter().map(|e| e.key().clone()));
        all_keys.sort();
        all_keys.dedup();

        let matching: Vec<String> = all_keys
            .into_iter()
            .filter(|k| Self::glob_match(match_pattern, k))
            .collect();

        let start = cursor as usize;
        let end = (start + count).min(matching.len());
        let page = matching.get(start..end).map(|s| s.to_vec()).unwrap_or_default();
        let next_cursor = if end >= matching.len() { 0 } else { end as u64 };
        Ok((next_cursor, page))
    }

    async fn ttl(&self, key: &str) -> Result<i64, HotStoreError> {
        match self.values.get(key) {
            Some(entry) => match entry.expires_at {
                Some(at) => {
                    let now = Instant::now();
                    if at <= now {
                        Ok(-2)
                    } else {
                        Ok((at - now).as_secs() as i64)
                    }
                }
                None => Ok(-1),
            },
            None => Ok(-2),
        }
    }

    async fn info(&self, _section: &str) -> Result<String, HotStoreError> {
        let values_bytes: usize = self
            .values
            .iter()
            .map(|e| e.key().len() + e.value.len())
            .sum();
        let sets_bytes: usize = self
            .sets
            .iter()
            .map(|e| e.key().len() + e.value().iter().map(|m| m.len()).sum::<usize>())
            .sum();
        let hashes_bytes: usize = self
            .hashes
            .iter()
            .map(|e| e.key().len() + e.value().iter().map(|(k, _)| k.len() + 8).sum::<usize>())
            .sum();
        let used_memory = values_bytes + sets_bytes + hashes_bytes;
        Ok(format!("# Memory\r\nused_memory:{used_memory}\r\n"))
    }

    async fn publish(&self, channel: &str, payload: String) -> Result<(), HotStoreError> {
        if let Some(sender) = self.channels.get(channel) {
            let _ = sender.send(payload);
        }
        Ok(())
    }

    fn subscribe(&self, channel: &str) -> broadcast::Receiver<String> {
        if let Some(sender) = self.channels.get(channel) {
            return sender.subscribe();
        }
        let (sender, receiver) = broadcast::channel(256);
        self.channels.insert(channel.to_string(), sender);
        receiver
    }

    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }
}
