//! In-memory [`DocumentStore`] implementation for tests and embedding.
//!
//! Collections are `Vec`s of JSON documents in insertion order behind a
//! `std::sync::RwLock`. Every query is a full scan; indexes are recorded
//! but not used.

use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::Value;

use crate::models::{Document, ID_FIELD};
use crate::query::{matches, run_pipeline, Filter, FindQuery, Stage};

use super::DocumentStore;

/// In-memory document store.
pub struct InMemoryStore {
    collections: RwLock<HashMap<String, Vec<Value>>>,
    indexes: RwLock<BTreeSet<(String, String)>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            indexes: RwLock::new(BTreeSet::new()),
        }
    }

    /// Whether `path` was declared indexed for `collection`.
    pub fn is_indexed(&self, collection: &str, path: &str) -> bool {
        self.indexes
            .read()
            .map(|idx| idx.contains(&(collection.to_string(), path.to_string())))
            .unwrap_or(false)
    }

    /// Number of documents in a collection.
    pub fn len(&self, collection: &str) -> usize {
        self.collections
            .read()
            .map(|c| c.get(collection).map_or(0, Vec::len))
            .unwrap_or(0)
    }

    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }

    fn snapshot(&self, collection: &str) -> Result<Vec<Value>> {
        let collections = self
            .collections
            .read()
            .map_err(|_| anyhow!("store lock poisoned"))?;
        Ok(collections.get(collection).cloned().unwrap_or_default())
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn doc_id(doc: &Value) -> Option<&str> {
    doc.get(ID_FIELD).and_then(Value::as_str)
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn ensure_index(&self, collection: &str, path: &str) -> Result<()> {
        let mut indexes = self
            .indexes
            .write()
            .map_err(|_| anyhow!("store lock poisoned"))?;
        indexes.insert((collection.to_string(), path.to_string()));
        Ok(())
    }

    async fn save(&self, collection: &str, doc: &Document) -> Result<()> {
        let value = doc.to_value();
        let mut collections = self
            .collections
            .write()
            .map_err(|_| anyhow!("store lock poisoned"))?;
        let docs = collections.entry(collection.to_string()).or_default();
        match docs.iter_mut().find(|d| doc_id(d) == Some(doc.id())) {
            Some(existing) => *existing = value,
            None => docs.push(value),
        }
        Ok(())
    }

    async fn remove(&self, collection: &str, filter: &Filter) -> Result<usize> {
        let mut collections = self
            .collections
            .write()
            .map_err(|_| anyhow!("store lock poisoned"))?;
        let Some(docs) = collections.get_mut(collection) else {
            return Ok(0);
        };
        let doomed = docs
            .iter()
            .map(|doc| matches(doc, filter))
            .collect::<Result<Vec<bool>>>()?;
        let mut flags = doomed.iter();
        docs.retain(|_| !flags.next().copied().unwrap_or(false));
        Ok(doomed.iter().filter(|d| **d).count())
    }

    async fn find(&self, collection: &str, query: &FindQuery) -> Result<Vec<Value>> {
        let docs = self.snapshot(collection)?;
        query.apply(&docs)
    }

    async fn aggregate(&self, collection: &str, pipeline: &[Stage]) -> Result<Vec<Value>> {
        let docs = self.snapshot(collection)?;
        run_pipeline(docs, pipeline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn save_replaces_by_id() {
        let store = InMemoryStore::new();
        let mut doc = Document::with_id("a");
        doc.set("v", 1);
        store.save("things", &doc).await.unwrap();
        doc.set("v", 2);
        store.save("things", &doc).await.unwrap();

        let all = store.find("things", &FindQuery::default()).await.unwrap();
        assert_eq!(all, vec![json!({"_id": "a", "v": 2})]);
    }

    #[tokio::test]
    async fn remove_by_filter() {
        let store = InMemoryStore::new();
        for i in 0..4 {
            let mut doc = Document::with_id(format!("d{i}"));
            doc.set("even", i % 2 == 0);
            store.save("things", &doc).await.unwrap();
        }
        let filter = json!({"even": true}).as_object().cloned().unwrap();
        assert_eq!(store.remove("things", &filter).await.unwrap(), 2);
        assert_eq!(store.len("things"), 2);
        assert_eq!(store.remove("missing", &filter).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn unknown_collection_is_empty() {
        let store = InMemoryStore::new();
        assert!(store.find("nope", &FindQuery::default()).await.unwrap().is_empty());
        assert!(store.aggregate("nope", &[]).await.unwrap().is_empty());
        assert!(store.is_empty("nope"));
    }
}
