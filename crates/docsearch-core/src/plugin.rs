//! Installing keyword search onto a model.
//!
//! [`SearchPlugin`] holds the process-wide collaborators (document store and
//! search cache). [`SearchPlugin::install`] validates [`PluginOptions`],
//! declares the keyword index, and returns a [`SearchModel`]: the model's
//! collection decorated with the derived `_keywords` / `_relevance`
//! attributes, a pre-save keyword hook, search, and bulk rebuild.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use futures::future::join_all;
use serde::Deserialize;
use serde_json::Value;
use tracing::{error, info};

use crate::cache::SearchCache;
use crate::keywords::{extract_keywords, unique_stems};
use crate::models::Document;
use crate::query::{id_membership, FindQuery, Projection};
use crate::search::{run_search, SearchOptions, SearchResponse};
use crate::store::DocumentStore;
use crate::text::{distance_by_name, stemmer_by_name, Distance, Stemmer, DEFAULT_DISTANCE, DEFAULT_STEMMER};

/// Install-time configuration of the search plugin.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PluginOptions {
    /// Source fields the keyword set is computed from.
    pub fields: Vec<String>,
    #[serde(default = "default_stemmer")]
    pub stemmer: String,
    #[serde(default = "default_distance")]
    pub distance: String,
    #[serde(default = "default_keywords_path")]
    pub keywords_path: String,
    #[serde(default = "default_relevance_path")]
    pub relevance_path: String,
}

fn default_stemmer() -> String {
    DEFAULT_STEMMER.to_string()
}
fn default_distance() -> String {
    DEFAULT_DISTANCE.to_string()
}
fn default_keywords_path() -> String {
    "_keywords".to_string()
}
fn default_relevance_path() -> String {
    "_relevance".to_string()
}

impl PluginOptions {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
            stemmer: default_stemmer(),
            distance: default_distance(),
            keywords_path: default_keywords_path(),
            relevance_path: default_relevance_path(),
        }
    }

    pub fn stemmer(mut self, name: impl Into<String>) -> Self {
        self.stemmer = name.into();
        self
    }

    pub fn distance(mut self, name: impl Into<String>) -> Self {
        self.distance = name.into();
        self
    }

    pub fn keywords_path(mut self, path: impl Into<String>) -> Self {
        self.keywords_path = path.into();
        self
    }

    pub fn relevance_path(mut self, path: impl Into<String>) -> Self {
        self.relevance_path = path.into();
        self
    }

    /// Check everything except algorithm names.
    pub fn validate(&self) -> Result<()> {
        if self.fields.is_empty() {
            bail!("search plugin requires at least one source field");
        }
        if self.fields.iter().any(|f| f.trim().is_empty()) {
            bail!("search plugin source fields must not be empty");
        }
        if self.keywords_path.is_empty() || self.relevance_path.is_empty() {
            bail!("keywords_path and relevance_path must not be empty");
        }
        if self.keywords_path == self.relevance_path {
            bail!("keywords_path and relevance_path must differ");
        }
        Ok(())
    }
}

/// A model's collection name and its declared references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelDefinition {
    name: String,
    references: BTreeMap<String, String>,
}

impl ModelDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            references: BTreeMap::new(),
        }
    }

    /// Declare that `path` holds ids of documents in `collection`.
    pub fn reference(mut self, path: impl Into<String>, collection: impl Into<String>) -> Self {
        self.references.insert(path.into(), collection.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Outcome of [`SearchModel::rebuild_all_keywords`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RebuildReport {
    pub total: usize,
    pub rebuilt: usize,
    pub failed: usize,
}

/// Shared store and cache, injected once per process.
#[derive(Clone)]
pub struct SearchPlugin {
    store: Arc<dyn DocumentStore>,
    cache: Arc<dyn SearchCache>,
}

impl SearchPlugin {
    pub fn new(store: Arc<dyn DocumentStore>, cache: Arc<dyn SearchCache>) -> Self {
        Self { store, cache }
    }

    /// Install on a model with the stemmer and distance named in `options`.
    pub async fn install(&self, definition: ModelDefinition, options: PluginOptions) -> Result<SearchModel> {
        let stemmer = Arc::new(stemmer_by_name(&options.stemmer)?);
        let distance = Arc::new(distance_by_name(&options.distance)?);
        self.install_with(definition, options, stemmer, distance).await
    }

    /// Install with caller-supplied text algorithms; the names in
    /// `options` are ignored.
    pub async fn install_with(
        &self,
        definition: ModelDefinition,
        options: PluginOptions,
        stemmer: Arc<dyn Stemmer>,
        distance: Arc<dyn Distance>,
    ) -> Result<SearchModel> {
        options.validate()?;
        self.store
            .ensure_index(definition.name(), &options.keywords_path)
            .await?;
        Ok(SearchModel {
            definition,
            options,
            stemmer,
            distance,
            store: Arc::clone(&self.store),
            cache: Arc::clone(&self.cache),
        })
    }
}

/// A model with keyword search installed.
#[derive(Clone)]
pub struct SearchModel {
    definition: ModelDefinition,
    options: PluginOptions,
    stemmer: Arc<dyn Stemmer>,
    distance: Arc<dyn Distance>,
    store: Arc<dyn DocumentStore>,
    cache: Arc<dyn SearchCache>,
}

impl SearchModel {
    pub fn name(&self) -> &str {
        self.definition.name()
    }

    pub fn keywords_path(&self) -> &str {
        &self.options.keywords_path
    }

    pub fn relevance_path(&self) -> &str {
        &self.options.relevance_path
    }

    pub(crate) fn store(&self) -> &dyn DocumentStore {
        self.store.as_ref()
    }

    pub(crate) fn cache(&self) -> &dyn SearchCache {
        self.cache.as_ref()
    }

    pub(crate) fn distance(&self) -> &dyn Distance {
        self.distance.as_ref()
    }

    /// Collection referenced by `path`.
    pub fn reference(&self, path: &str) -> Result<&str> {
        self.definition
            .references
            .get(path)
            .map(String::as_str)
            .ok_or_else(|| anyhow!("{} has no reference declared at {}", self.name(), path))
    }

    /// Unique stems of a query string.
    pub fn query_stems(&self, query: &str) -> Result<Vec<String>> {
        Ok(unique_stems(self.stemmer.tokenize_and_stem(query)?))
    }

    /// Keyword set for `doc` from the configured fields.
    pub fn process_keywords(&self, doc: &Document) -> Result<Vec<String>> {
        extract_keywords(doc, &self.options.fields, self.stemmer.as_ref())
    }

    /// Recompute and set the keyword attribute without saving.
    pub fn update_keywords(&self, doc: &mut Document) -> Result<()> {
        let keywords = self.process_keywords(doc)?;
        doc.set(&self.options.keywords_path, keywords);
        Ok(())
    }

    fn keywords_stale(&self, doc: &Document) -> bool {
        doc.is_new() || self.options.fields.iter().any(|f| doc.is_modified(f))
    }

    /// Save through the store, refreshing keywords first when the document
    /// is new or a source field changed.
    pub async fn save(&self, doc: &mut Document) -> Result<()> {
        if self.keywords_stale(doc) {
            self.update_keywords(doc)?;
        }
        self.store.save(self.name(), doc).await?;
        doc.mark_persisted();
        Ok(())
    }

    /// Load one document by id.
    pub async fn find_by_id(&self, id: &str) -> Result<Option<Document>> {
        let query = FindQuery::new(id_membership(&[id.to_string()])).limit(Some(1));
        match self.store.find(self.name(), &query).await?.into_iter().next() {
            Some(value) => Ok(Some(Document::from_stored(value)?)),
            None => Ok(None),
        }
    }

    /// Search with default fields and options.
    pub async fn search(&self, query: &str) -> Result<SearchResponse> {
        run_search(self, query, None, &SearchOptions::default()).await
    }

    /// Search with an output projection.
    pub async fn search_fields(&self, query: &str, fields: Option<&Projection>) -> Result<SearchResponse> {
        run_search(self, query, fields, &SearchOptions::default()).await
    }

    /// Search with an output projection and options.
    pub async fn search_with(
        &self,
        query: &str,
        fields: Option<&Projection>,
        options: &SearchOptions,
    ) -> Result<SearchResponse> {
        run_search(self, query, fields, options).await
    }

    /// Recompute and save keywords for every document in the collection.
    ///
    /// Saves run concurrently. A failing document is logged and counted;
    /// it never fails the batch. Only the initial load can return `Err`.
    pub async fn rebuild_all_keywords(&self) -> Result<RebuildReport> {
        let docs = self.store.find(self.name(), &FindQuery::default()).await?;
        let total = docs.len();
        if total == 0 {
            return Ok(RebuildReport::default());
        }

        let outcomes = join_all(docs.into_iter().map(|value| self.rebuild_one(value))).await;
        let failed = outcomes.iter().filter(|ok| !**ok).count();
        let report = RebuildReport {
            total,
            rebuilt: total - failed,
            failed,
        };
        info!(
            collection = self.name(),
            total = report.total,
            rebuilt = report.rebuilt,
            failed = report.failed,
            "keyword rebuild finished"
        );
        Ok(report)
    }

    async fn rebuild_one(&self, value: Value) -> bool {
        let result = async {
            let mut doc = Document::from_stored(value)?;
            self.update_keywords(&mut doc)?;
            self.store.save(self.name(), &doc).await?;
            Ok::<_, anyhow::Error>(())
        }
        .await;
        match result {
            Ok(()) => true,
            Err(e) => {
                error!(collection = self.name(), error = %e, "keyword rebuild failed for document");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::memory::InMemoryCache;
    use crate::store::memory::InMemoryStore;
    use serde_json::json;

    fn plugin() -> (Arc<InMemoryStore>, SearchPlugin) {
        let store = Arc::new(InMemoryStore::new());
        let plugin = SearchPlugin::new(store.clone(), Arc::new(InMemoryCache::new()));
        (store, plugin)
    }

    #[test]
    fn options_deserialize_with_defaults() {
        let opts: PluginOptions = serde_json::from_value(json!({"fields": ["title"]})).unwrap();
        assert_eq!(opts, PluginOptions::new(["title"]));
        assert_eq!(opts.keywords_path, "_keywords");
        assert_eq!(opts.relevance_path, "_relevance");
        assert_eq!(opts.stemmer, DEFAULT_STEMMER);
        assert_eq!(opts.distance, DEFAULT_DISTANCE);
    }

    #[test]
    fn validation_rejects_bad_options() {
        assert!(PluginOptions::new(Vec::<String>::new()).validate().is_err());
        assert!(PluginOptions::new([""]).validate().is_err());
        assert!(PluginOptions::new(["t"]).keywords_path("x").relevance_path("x").validate().is_err());
    }

    #[tokio::test]
    async fn install_declares_keyword_index() {
        let (store, plugin) = plugin();
        plugin
            .install(ModelDefinition::new("articles"), PluginOptions::new(["title"]).keywords_path("kw"))
            .await
            .unwrap();
        assert!(store.is_indexed("articles", "kw"));
    }

    #[tokio::test]
    async fn install_rejects_unknown_algorithms() {
        let (_, plugin) = plugin();
        let def = ModelDefinition::new("articles");
        assert!(plugin
            .install(def.clone(), PluginOptions::new(["title"]).stemmer("nope"))
            .await
            .is_err());
        assert!(plugin
            .install(def, PluginOptions::new(["title"]).distance("nope"))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn save_hook_only_runs_when_sources_change() {
        let (_, plugin) = plugin();
        let model = plugin
            .install(ModelDefinition::new("articles"), PluginOptions::new(["title"]))
            .await
            .unwrap();

        let mut doc = Document::new();
        doc.set("title", "searching engines");
        doc.set("views", 1);
        model.save(&mut doc).await.unwrap();
        assert_eq!(doc.get("_keywords"), Some(&json!(["search", "engin"])));
        assert!(!doc.is_new());

        // Overwrite keywords by hand; an unrelated change must not recompute.
        doc.set("_keywords", json!(["manual"]));
        doc.set("views", 2);
        model.save(&mut doc).await.unwrap();
        let stored = model.find_by_id(doc.id()).await.unwrap().unwrap();
        assert_eq!(stored.get("_keywords"), Some(&json!(["manual"])));

        doc.set("title", "running");
        model.save(&mut doc).await.unwrap();
        let stored = model.find_by_id(doc.id()).await.unwrap().unwrap();
        assert_eq!(stored.get("_keywords"), Some(&json!(["run"])));
    }

    #[tokio::test]
    async fn update_keywords_does_not_persist() {
        let (store, plugin) = plugin();
        let model = plugin
            .install(ModelDefinition::new("articles"), PluginOptions::new(["title"]))
            .await
            .unwrap();
        let mut doc = Document::new();
        doc.set("title", "cats");
        model.update_keywords(&mut doc).unwrap();
        assert_eq!(doc.get("_keywords"), Some(&json!(["cat"])));
        assert!(store.is_empty("articles"));
    }

    #[tokio::test]
    async fn missing_reference_is_an_error() {
        let (_, plugin) = plugin();
        let model = plugin
            .install(
                ModelDefinition::new("articles").reference("author", "authors"),
                PluginOptions::new(["title"]),
            )
            .await
            .unwrap();
        assert_eq!(model.reference("author").unwrap(), "authors");
        assert!(model.reference("editor").is_err());
    }
}
