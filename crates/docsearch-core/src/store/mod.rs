//! Document storage abstraction.
//!
//! The [`DocumentStore`] trait is the storage collaborator the search
//! pipeline consumes: save, filtered find with projection and options,
//! aggregation, and declaring indexed paths. Reference population is built
//! on top of `find` in [`crate::populate`].
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::models::Document;
use crate::query::{FindQuery, Filter, Stage};

/// Abstract document database, one namespace per collection.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`ensure_index`](DocumentStore::ensure_index) | Declare a path used for membership lookups |
/// | [`save`](DocumentStore::save) | Insert or replace a document by id |
/// | [`remove`](DocumentStore::remove) | Delete documents matching a filter |
/// | [`find`](DocumentStore::find) | Filter, sort, page, and project documents |
/// | [`aggregate`](DocumentStore::aggregate) | Run a pipeline of stages |
///
/// `find` and `aggregate` return documents in their JSON form (with
/// `_id`), in natural storage order unless sorted.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Declare `path` as indexed for `collection`. Idempotent.
    async fn ensure_index(&self, collection: &str, path: &str) -> Result<()>;

    /// Insert or replace a document.
    async fn save(&self, collection: &str, doc: &Document) -> Result<()>;

    /// Delete every document matching `filter`, returning how many.
    async fn remove(&self, collection: &str, filter: &Filter) -> Result<usize>;

    async fn find(&self, collection: &str, query: &FindQuery) -> Result<Vec<Value>>;

    async fn aggregate(&self, collection: &str, pipeline: &[Stage]) -> Result<Vec<Value>>;
}
