//! Time-bounded search result cache.
//!
//! A cache entry maps `(collection, query stems, conditions fingerprint)` to
//! the ranked list of matching document ids. An explicit sort order is part
//! of the key too, since it replaces the relevance ranking. Entries expire after a fixed
//! TTL; expiry is the backing store's job, and a lookup never returns an
//! expired entry.
//!
//! One [`SearchCache`] is shared by every model in a process, keyed by
//! collection name.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Duration;
use sha2::{Digest, Sha256};

use crate::query::{Filter, SortOrder, SortSpec};

/// Default lifetime of a cache entry: one hour.
pub const DEFAULT_TTL_SECS: i64 = 3600;

pub fn default_ttl() -> Duration {
    Duration::seconds(DEFAULT_TTL_SECS)
}

/// Identity of a cached search.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub collection: String,
    /// Sorted, deduplicated stems; equality is set equality.
    pub stems: Vec<String>,
    /// Canonical JSON of the extra conditions, if any.
    pub conditions: Option<String>,
    /// `field:1,field:-1` form of an explicit sort.
    pub sort: Option<String>,
}

impl CacheKey {
    pub fn new(collection: impl Into<String>, stems: &[String], conditions: Option<&Filter>) -> Self {
        let mut stems = stems.to_vec();
        stems.sort();
        stems.dedup();
        Self {
            collection: collection.into(),
            stems,
            conditions: conditions.map(fingerprint),
            sort: None,
        }
    }

    pub fn with_sort(mut self, sort: Option<&SortSpec>) -> Self {
        self.sort = sort.filter(|s| !s.is_empty()).map(sort_fingerprint);
        self
    }

    /// SHA-256 hex digest over all key parts, for indexed lookups.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.collection.as_bytes());
        hasher.update([0u8]);
        for stem in &self.stems {
            hasher.update(stem.as_bytes());
            hasher.update([0u8]);
        }
        if let Some(conditions) = &self.conditions {
            hasher.update([1u8]);
            hasher.update(conditions.as_bytes());
        }
        if let Some(sort) = &self.sort {
            hasher.update([2u8]);
            hasher.update(sort.as_bytes());
        }
        format!("{:x}", hasher.finalize())
    }
}

/// Canonical serialization of a filter.
///
/// `serde_json::Map` keeps keys sorted, so nested objects serialize the same
/// way regardless of the order they were built in.
pub fn fingerprint(conditions: &Filter) -> String {
    serde_json::Value::Object(conditions.clone()).to_string()
}

fn sort_fingerprint(sort: &SortSpec) -> String {
    sort.keys()
        .iter()
        .map(|(field, order)| match order {
            SortOrder::Ascending => format!("{}:1", field),
            SortOrder::Descending => format!("{}:-1", field),
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Storage for ranked search results.
#[async_trait]
pub trait SearchCache: Send + Sync {
    /// The cached ranked ids for `key`, or `None` if absent or expired.
    async fn lookup(&self, key: &CacheKey) -> Result<Option<Vec<String>>>;

    /// Record the ranked ids for `key`. Duplicate stores are tolerated.
    async fn store(&self, key: &CacheKey, ids: &[String]) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn stems(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn stem_order_does_not_matter() {
        let a = CacheKey::new("c", &stems(&["b", "a", "a"]), None);
        let b = CacheKey::new("c", &stems(&["a", "b"]), None);
        assert_eq!(a, b);
        assert_eq!(a.digest(), b.digest());
    }

    #[test]
    fn conditions_separate_entries() {
        let cond = json!({"index": {"$gt": 1}, "active": true})
            .as_object()
            .cloned()
            .unwrap();
        let plain = CacheKey::new("c", &stems(&["a"]), None);
        let filtered = CacheKey::new("c", &stems(&["a"]), Some(&cond));
        assert_ne!(plain, filtered);
        assert_ne!(plain.digest(), filtered.digest());
        assert_eq!(
            filtered.conditions.as_deref(),
            Some(r#"{"active":true,"index":{"$gt":1}}"#)
        );
    }

    #[test]
    fn sort_order_separates_entries() {
        let base = CacheKey::new("c", &stems(&["a"]), None);
        let asc = base.clone().with_sort(Some(&SortSpec::new().asc("index")));
        let desc = base.clone().with_sort(Some(&SortSpec::new().desc("index")));
        assert_eq!(asc.sort.as_deref(), Some("index:1"));
        assert_ne!(asc.digest(), desc.digest());
        assert_ne!(base.digest(), asc.digest());
        assert_eq!(base.clone().with_sort(Some(&SortSpec::new())), base);
    }

    #[test]
    fn collections_separate_entries() {
        let a = CacheKey::new("a", &stems(&["x"]), None);
        let b = CacheKey::new("b", &stems(&["x"]), None);
        assert_ne!(a.digest(), b.digest());
    }
}
