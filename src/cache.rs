//! Shared key/value cache with TTL semantics
//!
//! The price cache and the liquidity-graph cache both sit behind
//! [`SharedCache`]. Values are JSON strings; last write wins.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use eyre::Result;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, trace, warn};

use crate::clock::{Clock, SystemClock};

#[async_trait]
pub trait SharedCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()>;

    /// Only used on explicit forced refresh
    async fn delete(&self, key: &str) -> Result<()>;
}

/// Read and decode a JSON value. Cache errors and undecodable entries read as a miss.
pub async fn get_json<T: DeserializeOwned>(cache: &dyn SharedCache, key: &str) -> Option<T> {
    match cache.get(key).await {
        Ok(Some(raw)) => match serde_json::from_str(&raw) {
            Ok(value) => {
                trace!("Cache HIT for {}", key);
                Some(value)
            }
            Err(e) => {
                warn!("Undecodable cache entry for {}: {}", key, e);
                None
            }
        },
        Ok(None) => {
            trace!("Cache MISS for {}", key);
            None
        }
        Err(e) => {
            warn!("Shared cache GET failed for {}: {}", key, e);
            None
        }
    }
}

/// Encode and store a JSON value. Failures are logged, never raised.
pub async fn set_json<T: Serialize>(cache: &dyn SharedCache, key: &str, value: &T, ttl: Duration) {
    let raw = match serde_json::to_string(value) {
        Ok(raw) => raw,
        Err(e) => {
            warn!("Failed to encode cache value for {}: {}", key, e);
            return;
        }
    };
    if let Err(e) = cache.set(key, raw, ttl).await {
        warn!("Shared cache SET failed for {}: {}", key, e);
    }
}

// ============================================
// IN-PROCESS IMPLEMENTATION
// ============================================

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: DateTime<Utc>,
}

/// In-memory [`SharedCache`]; expiry follows the injected clock
#[derive(Debug)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, Entry>>,
    clock: Arc<dyn Clock>,
}

impl MemoryCache {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock,
        }
    }

    pub async fn len(&self) -> usize {
        let now = self.clock.now();
        self.entries
            .read()
            .await
            .values()
            .filter(|e| e.expires_at > now)
            .count()
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

#[async_trait]
impl SharedCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let now = self.clock.now();
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|e| e.expires_at > now)
            .map(|e| e.value.clone()))
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        let ttl = chrono::Duration::from_std(ttl)?;
        let expires_at = self.clock.now() + ttl;
        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), Entry { value, expires_at });
        debug!("Cached {} ({} entries)", key, entries.len());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}
