//! Redis-backed `HotStore` (C1).
//!
//! Three logically separate connections per §4.1: `cmd` serves ordinary
//! commands via `ConnectionManager` (auto-reconnecting), `publish` is a
//! second `ConnectionManager` used only for `PUBLISH`, and `subscriber` is a
//! dedicated background task holding a raw pub/sub connection — a
//! subscribed connection cannot also serve commands.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use rand::Rng;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, warn};

use crate::error::HotStoreError;
use crate::hotstore::HotStore;

const RECONNECT_INITIAL: Duration = Duration::from_millis(100);
const RECONNECT_MAX: Duration = Duration::from_secs(2);

pub struct RedisHotStore {
    cmd: ConnectionManager,
    publish_conn: ConnectionManager,
    channels: Arc<DashMap<String, broadcast::Sender<String>>>,
    subscribe_requests: mpsc::UnboundedSender<String>,
    connected: Arc<AtomicBool>,
}

impl RedisHotStore {
    pub async fn connect(url: &str) -> Result<Self, HotStoreError> {
        let client = Client::open(url).map_err(|e| HotStoreError::Unavailable {
            reason: e.to_string(),
        })?;

        let cmd = ConnectionManager::new(client.clone())
            .await
            .map_err(|e| HotStoreError::Unavailable {
                reason: e.to_string(),
            })?;
        let publish_conn = ConnectionManager::new(client.clone())
            .await
            .map_err(|e| HotStoreError::Unavailable {
                reason: e.to_string(),
            })?;

        let channels: Arc<DashMap<String, broadcast::Sender<String>>> = Arc::new(DashMap::new());
        let connected = Arc::new(AtomicBool::new(true));
        let (subscribe_requests, requests_rx) = mpsc::unbounded_channel();

        spawn_subscriber_loop(client, channels.clone(), requests_rx, connected.clone());

        Ok(Self {
            cmd,
            publish_conn,
            channels,
            subscribe_requests,
            connected,
        })
    }

    fn map_err(op: &str, err: redis::RedisError) -> HotStoreError {
        if err.is_connection_dropped() || err.is_io_error() {
            HotStoreError::Unavailable {
                reason: err.to_string(),
            }
        } else {
            HotStoreError::Operation {
                op: op.to_string(),
                reason: err.to_string(),
            }
        }
    }
}

/// Reconnect-forever loop holding the dedicated subscribe connection,
/// exponential backoff capped at 2s with +/-200ms jitter (§4.1).
fn spawn_subscriber_loop(
    client: Client,
    channels: Arc<DashMap<String, broadcast::Sender<String>>>,
    mut requests_rx: mpsc::UnboundedReceiver<String>,
    connected: Arc<AtomicBool>,
) {
    tokio::spawn(async move {
        let mut backoff = RECONNECT_INITIAL;
        let mut subscribed: Vec<String> = Vec::new();

        loop {
            let pubsub = match client.get_async_pubsub().await {
                Ok(p) => p,
                Err(e) => {
                    warn!(error = %e, ?backoff, "hot store subscribe connection failed, retrying");
                    connected.store(false, Ordering::Relaxed);
                    tokio::time::sleep(jittered(backoff)).await;
                    backoff = (backoff * 2).min(RECONNECT_MAX);
                    continue;
                }
            };
            connected.store(true, Ordering::Relaxed);
            backoff = RECONNECT_INITIAL;

            if let Err(e) =
                run_subscriber_session(pubsub, &channels, &mut requests_rx, &mut subscribed).await
            {
                warn!(error = %e, "hot store subscribe session ended, reconnecting");
            }
        }
    });
}

async fn run_subscriber_session(
    mut pubsub: redis::aio::PubSub,
    channels: &Arc<DashMap<String, broadcast::Sender<String>>>,
    requests_rx: &mut mpsc::UnboundedReceiver<String>,
    subscribed: &mut Vec<String>,
) -> Result<(), redis::RedisError> {
    for channel in subscribed.iter() {
        pubsub.subscribe(channel).await?;
    }

    let mut stream = pubsub.into_on_message();
    loop {
        tokio::select! {
            Some(channel) = requests_rx.recv() => {
                if !subscribed.contains(&channel) {
                    subscribed.push(channel);
                }
                // Resubscribing happens on the next reconnect; a live session
                // can't add channels without owning `pubsub` again, so this
                // falls through to the reconnect path below.
                return Ok(());
            }
            msg = stream.next() => {
                match msg {
                    Some(msg) => {
                        let channel: String = msg.get_channel_name().to_string();
                        let payload: String = msg.get_payload().unwrap_or_default();
                        if let Some(sender) = channels.get(&channel) {
                            let _ = sender.send(payload);
                        }
                    }
                    None => return Ok(()),
                }
            }
        }
    }
}

fn jittered(base: Duration) -> Duration {
    let jitter_ms = rand::thread_rng().gen_range(0..=200);
    base + Duration::from_millis(jitter_ms)
}

use futures::StreamExt;

#[async_trait]
impl HotStore for RedisHotStore {
    async fn get(&self, key: &str) -> Result<Option<String>, HotStoreError> {
        let mut conn = self.cmd.clone();
        conn.get(key)
            .await
            .map_err(|e| Self::map_err("get", e))
    }

    async fn set_with_ttl(
        &self,
        key: &str,
        value: String,
        ttl_seconds: u64,
    ) -> Result<(), HotStoreError> {
        let mut conn = self.cmd.clone();
        let _: () = conn
            .set_ex(key, value, ttl_seconds.max(1))
            .await
            .map_err(|e| Self::map_err("set_with_ttl", e))?;
        Ok(())
    }

    async fn del(&self, keys: &[String]) -> Result<u64, HotStoreError> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.cmd.clone();
        conn.del(keys).await.map_err(|e| Self::map_err("del", e))
    }

    async fn set_add(&self, key: &str, members: &[String]) -> Result<(), HotStoreError> {
        if members.is_empty() {
            return Ok(());
        }
        let mut conn = self.cmd.clone();
        let _: () = conn
            .sadd(key, members)
            .await
            .map_err(|e| Self::map_err("set_add", e))?;
        Ok(())
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<(), HotStoreError> {
        let mut conn = self.cmd.clone();
        let _: () = conn
            .srem(key, member)
            .await
            .map_err(|e| Self::map_err("set_remove", e))?;
        Ok(())
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, HotStoreError> {
        let mut conn = self.cmd.clone();
        conn.smembers(key)
            .await
            .map_err(|e| Self::map_err("set_members", e))
    }

    async fn hash_incr_by(&self, key: &str, field: &str, n: i64) -> Result<i64, HotStoreError> {
        let mut conn = self.cmd.clone();
        conn.hincr(key, field, n)
            .await
            .map_err(|e| Self::map_err("hash_incr_by", e))
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>, HotStoreError> {
        let mut conn = self.cmd.clone();
        conn.hgetall(key)
            .await
            .map_err(|e| Self::map_err("hash_get_all", e))
    }

    async fn hash_del(&self, key: &str, field: &str) -> Result<(), HotStoreError> {
        let mut conn = self.cmd.clone();
        let _: () = conn
            .hdel(key, field)
            .await
            .map_err(|e| Self::map_err("hash_del", e))?;
        Ok(())
    }

    async fn scan(
        &self,
        cursor: u64,
        match_pattern: &str,
        count: usize,
    ) -> Result<(u64, Vec<String>), HotStoreError> {
        let mut conn = self.cmd.clone();
        redis::cmd("SCAN")
            .arg(cursor)
            .arg("MATCH")
            .arg(match_pattern)
            .arg("COUNT")
            .arg(count)
            .query_async(&mut conn)
            .await
            .map_err(|e| Self::map_err("scan", e))
    }

    async fn ttl(&self, key: &str) -> Result<i64, HotStoreError> {
        let mut conn = self.cmd.clone();
        redis::cmd("TTL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| Self::map_err("ttl", e))
    }

    async fn info(&self, section: &str) -> Result<String, HotStoreError> {
        let mut conn = self.cmd.clone();
        redis::cmd("INFO")
            .arg(section)
            .query_async(&mut conn)
            .await
            .map_err(|e| Self::map_err("info", e))
    }

    async fn publish(&self, channel: &str, payload: String) -> Result<(), HotStoreError> {
        let mut conn = self.publish_conn.clone();
        let _: () = conn
            .publish(channel, payload)
            .await
            .map_err(|e| Self::map_err("publish", e))?;
        Ok(())
    }

    fn subscribe(&self, channel: &str) -> broadcast::Receiver<String> {
        if let Some(sender) = self.channels.get(channel) {
            return sender.subscribe();
        }
        let (sender, receiver) = broadcast::channel(256);
        self.channels.insert(channel.to_string(), sender);
        if self.subscribe_requests.send(channel.to_string()).is_err() {
            error!(channel, "hot store subscriber loop is gone");
        }
        debug!(channel, "registered hot store subscription");
        receiver
    }

    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }
}
