use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{trace, warn};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::RwLock;

#[derive(Clone)]
enum Backend {
    Memory(Arc<RwLock<HashMap<String, (Instant, String)>>>),
    Redis(ConnectionManager),
}

/// JSON cache for search results and extracted tracks. Failures are logged
/// and treated as misses so a broken cache never fails a request.
#[derive(Clone)]
pub struct Cache {
    backend: Backend,
    ttl: Duration,
}

impl Cache {
    pub fn memory(ttl: Duration) -> Self {
        Self {
            backend: Backend::Memory(Arc::default()),
            ttl,
        }
    }

    pub async fn redis(url: &str, ttl: Duration) -> redis::RedisResult<Self> {
        let client = redis::Client::open(url)?;
        let con = ConnectionManager::new(client).await?;
        Ok(Self {
            backend: Backend::Redis(con),
            ttl,
        })
    }

    pub fn backend_name(&self) -> &'static str {
        match self.backend {
            Backend::Memory(_) => "memory",
            Backend::Redis(_) => "redis",
        }
    }

    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match &self.backend {
            Backend::Memory(map) => {
                let map = map.read().await;
                match map.get(key) {
                    Some((expires, value)) if *expires > Instant::now() => Some(value.clone()),
                    _ => None,
                }
            }
            Backend::Redis(con) => {
                let mut con = con.clone();
                let value: redis::RedisResult<Option<String>> = con.get(key).await;
                match value {
                    Ok(value) => value,
                    Err(why) => {
                        warn!("Cache read for {key} failed: {why}");
                        None
                    }
                }
            }
        }?;

        match serde_json::from_str(&raw) {
            Ok(value) => {
                trace!("cache hit: {key}");
                Some(value)
            }
            Err(why) => {
                warn!("Discarding malformed cache entry {key}: {why}");
                None
            }
        }
    }

    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T) {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(why) => {
                warn!("Failed to serialize cache entry {key}: {why}");
                return;
            }
        };

        match &self.backend {
            Backend::Memory(map) => {
                let expires = Instant::now() + self.ttl;
                map.write().await.insert(key.to_string(), (expires, raw));
            }
            Backend::Redis(con) => {
                let mut con = con.clone();
                let ttl = self.ttl.as_secs().max(1) as usize;
                let result: redis::RedisResult<()> = con.set_ex(key, raw, ttl).await;
                if let Err(why) = result {
                    warn!("Cache write for {key} failed: {why}");
                }
            }
        }
    }

    pub async fn remove(&self, key: &str) {
        match &self.backend {
            Backend::Memory(map) => {
                map.write().await.remove(key);
            }
            Backend::Redis(con) => {
                let mut con = con.clone();
                let result: redis::RedisResult<()> = con.del(key).await;
                if let Err(why) = result {
                    warn!("Cache delete for {key} failed: {why}");
                }
            }
        }
    }

    /// Drops expired in-memory entries, returning how many were removed.
    /// Redis expires keys on its own.
    pub async fn purge_expired(&self) -> usize {
        match &self.backend {
            Backend::Memory(map) => {
                let now = Instant::now();
                let mut map = map.write().await;
                let before = map.len();
                map.retain(|_, (expires, _)| *expires > now);
                before - map.len()
            }
            Backend::Redis(_) => 0,
        }
    }
}

#[cfg(test)]
impl Cache {
    /// Entries held in memory, expired or not.
    pub async fn stored(&self) -> usize {
        match &self.backend {
            Backend::Memory(map) => map.read().await.len(),
            Backend::Redis(_) => 0,
        }
    }
}

pub fn search_key(query: &str, limit: usize) -> String {
    format!("search:{limit}:{}", query.trim().to_lowercase())
}

pub fn play_key(video_id: &str) -> String {
    format!("play:{video_id}")
}
