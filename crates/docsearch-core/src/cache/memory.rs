//! In-memory [`SearchCache`] with TTL expiry.

use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use super::{default_ttl, CacheKey, SearchCache};

struct CacheEntry {
    key: CacheKey,
    ids: Vec<String>,
    created_at: DateTime<Utc>,
}

/// Process-local search cache.
///
/// Expired entries are pruned whenever a new entry is stored and are never
/// returned by [`lookup`](SearchCache::lookup). If duplicates exist the
/// newest one wins.
pub struct InMemoryCache {
    entries: RwLock<Vec<CacheEntry>>,
    ttl: Duration,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::with_ttl(default_ttl())
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            ttl,
        }
    }

    /// Number of stored entries, expired or not.
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn is_live(&self, entry: &CacheEntry, now: DateTime<Utc>) -> bool {
        now - entry.created_at < self.ttl
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SearchCache for InMemoryCache {
    async fn lookup(&self, key: &CacheKey) -> Result<Option<Vec<String>>> {
        let now = Utc::now();
        let entries = self
            .entries
            .read()
            .map_err(|_| anyhow!("cache lock poisoned"))?;
        Ok(entries
            .iter()
            .rev()
            .find(|e| e.key == *key && self.is_live(e, now))
            .map(|e| e.ids.clone()))
    }

    async fn store(&self, key: &CacheKey, ids: &[String]) -> Result<()> {
        let now = Utc::now();
        let mut entries = self
            .entries
            .write()
            .map_err(|_| anyhow!("cache lock poisoned"))?;
        entries.retain(|e| self.is_live(e, now));
        entries.push(CacheEntry {
            key: key.clone(),
            ids: ids.to_vec(),
            created_at: now,
        });
        Ok(())
    }
}
