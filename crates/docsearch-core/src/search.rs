//! The cached keyword search pipeline.
//!
//! # Algorithm
//!
//! 1. Tokenize, stem, and deduplicate the query text.
//! 2. Look up `(collection, stems, conditions, sort)` in the [`SearchCache`](crate::cache::SearchCache).
//! 3. On a miss, find documents whose keyword set intersects the stems
//!    (restricted by `conditions`), rank them by descending relevance unless
//!    an explicit sort was given, and store the ranked ids in the cache.
//! 4. Slice the ranked ids with `skip` / `limit`.
//! 5. Fetch the page through `find` (with projection, sort, and populate)
//!    or through an aggregation pipeline.
//! 6. Without an explicit sort, reorder the page to match the ranked ids.
//!
//! The ranking is frozen into the cache entry, so paging through the same
//! query within the TTL sees a stable order.

use std::collections::HashMap;
use std::ops::Range;

use anyhow::Result;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::cache::CacheKey;
use crate::models::ID_FIELD;
use crate::plugin::SearchModel;
use crate::populate::{populate, PopulateSpec};
use crate::query::{id_membership, merge_filters, Filter, FindQuery, Projection, SortSpec, Stage};
use crate::relevance::{rank_order, score};

/// Options for [`SearchModel::search_with`].
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    /// Explicit order. Disables relevance ranking; store order is kept.
    pub sort: Option<SortSpec>,
    /// Page size over the ranked id list. `Some(0)` means no limit.
    pub limit: Option<usize>,
    /// Number of ranked ids to skip.
    pub skip: Option<usize>,
    /// Extra filter, merged into both the candidate query and the fetch,
    /// and part of the cache key.
    pub conditions: Option<Filter>,
    /// Stages appended after the id-membership match; replaces the plain
    /// fetch with an aggregation.
    pub aggregate: Option<Vec<Stage>>,
    /// References to resolve in the fetched documents.
    pub populate: Vec<PopulateSpec>,
}

impl SearchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sort(mut self, sort: SortSpec) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn skip(mut self, skip: usize) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn conditions(mut self, conditions: Filter) -> Self {
        self.conditions = Some(conditions);
        self
    }

    pub fn aggregate(mut self, stages: Vec<Stage>) -> Self {
        self.aggregate = Some(stages);
        self
    }

    pub fn populate(mut self, spec: PopulateSpec) -> Self {
        self.populate.push(spec);
        self
    }
}

/// Search output: the size of the full ranked list and the current page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResponse {
    pub total_count: usize,
    pub results: Vec<Value>,
}

/// Run a search for `model`.
pub async fn run_search(
    model: &SearchModel,
    query: &str,
    fields: Option<&Projection>,
    options: &SearchOptions,
) -> Result<SearchResponse> {
    let stems = model.query_stems(query)?;
    let key = CacheKey::new(model.name(), &stems, options.conditions.as_ref())
        .with_sort(options.sort.as_ref());

    let ids = match model.cache().lookup(&key).await? {
        Some(ids) => {
            debug!(collection = model.name(), ?stems, hits = ids.len(), "search cache hit");
            ids
        }
        None => {
            let ids = ranked_ids(model, &stems, options).await?;
            debug!(collection = model.name(), ?stems, candidates = ids.len(), "search cache miss");
            model.cache().store(&key, &ids).await?;
            ids
        }
    };

    let total_count = ids.len();
    let page = &ids[page_bounds(total_count, options.skip, options.limit)];
    let mut results = fetch_page(model, page, fields, options).await?;
    if options.sort.is_none() {
        order_by_rank(&mut results, page);
    }

    Ok(SearchResponse {
        total_count,
        results,
    })
}

/// Candidate lookup and ranking for a cache miss.
async fn ranked_ids(model: &SearchModel, stems: &[String], options: &SearchOptions) -> Result<Vec<String>> {
    let keywords_path = model.keywords_path();
    let mut membership = Filter::new();
    membership.insert(keywords_path.to_string(), json!({ "$in": stems }));

    let query = FindQuery::new(merge_filters(options.conditions.as_ref(), membership))
        .projection(Some(Projection::include([keywords_path])))
        .sort(options.sort.clone());
    let candidates = model.store().find(model.name(), &query).await?;

    if options.sort.is_some() {
        return Ok(candidates.iter().filter_map(doc_id).map(str::to_string).collect());
    }

    let mut scored = Vec::with_capacity(candidates.len());
    for mut candidate in candidates {
        let keywords = string_list(candidate.get(keywords_path));
        let relevance = score(stems, &keywords, model.distance())?;
        if let Value::Object(map) = &mut candidate {
            map.insert(model.relevance_path().to_string(), json!(relevance));
        }
        scored.push((candidate, relevance));
    }
    scored.sort_by(|(a, a_score), (b, b_score)| {
        rank_order(
            (doc_id(a).unwrap_or_default(), *a_score),
            (doc_id(b).unwrap_or_default(), *b_score),
        )
    });

    Ok(scored
        .iter()
        .filter_map(|(doc, _)| doc_id(doc))
        .map(str::to_string)
        .collect())
}

async fn fetch_page(
    model: &SearchModel,
    page: &[String],
    fields: Option<&Projection>,
    options: &SearchOptions,
) -> Result<Vec<Value>> {
    if let Some(stages) = &options.aggregate {
        let mut pipeline = vec![Stage::Match(id_membership(page)), Stage::Limit(page.len())];
        pipeline.extend(stages.iter().cloned());
        return model.store().aggregate(model.name(), &pipeline).await;
    }

    let query = FindQuery::new(merge_filters(options.conditions.as_ref(), id_membership(page)))
        .projection(fields.cloned())
        .sort(options.sort.clone());
    let mut docs = model.store().find(model.name(), &query).await?;
    for spec in &options.populate {
        let collection = model.reference(&spec.path)?;
        populate(model.store(), &mut docs, spec, collection).await?;
    }
    Ok(docs)
}

/// Index range of the page within a ranked list of `len` ids.
pub fn page_bounds(len: usize, skip: Option<usize>, limit: Option<usize>) -> Range<usize> {
    let start = skip.unwrap_or(0).min(len);
    let end = match limit.filter(|l| *l > 0) {
        Some(limit) => start.saturating_add(limit).min(len),
        None => len,
    };
    start..end
}

/// Stable reorder of fetched documents by their position in `ranked`.
fn order_by_rank(docs: &mut [Value], ranked: &[String]) {
    let position: HashMap<&str, usize> = ranked
        .iter()
        .enumerate()
        .map(|(i, id)| (id.as_str(), i))
        .collect();
    docs.sort_by_key(|doc| {
        doc_id(doc)
            .and_then(|id| position.get(id).copied())
            .unwrap_or(usize::MAX)
    });
}

fn doc_id(doc: &Value) -> Option<&str> {
    doc.get(ID_FIELD).and_then(Value::as_str)
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}
