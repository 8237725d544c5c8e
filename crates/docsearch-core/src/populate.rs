//! Reference population: replace id fields with the referenced documents.

use std::collections::HashMap;

use anyhow::Result;
use serde_json::Value;

use crate::models::{lookup_path, set_path, ID_FIELD};
use crate::query::{id_membership, FindQuery, Projection};
use crate::store::DocumentStore;

/// Populate instruction: the reference path and an optional projection
/// applied to the embedded documents.
#[derive(Debug, Clone, PartialEq)]
pub struct PopulateSpec {
    pub path: String,
    pub fields: Option<Projection>,
}

impl PopulateSpec {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            fields: None,
        }
    }

    pub fn fields(mut self, fields: Projection) -> Self {
        self.fields = Some(fields);
        self
    }
}

fn referenced_ids(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(id)) => vec![id.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

/// Replace the reference at `spec.path` in every document with the
/// document(s) it points to in `collection`.
///
/// A single id becomes the referenced document, or `null` when it does not
/// exist; an array of ids becomes the array of found documents in the
/// original order. Documents without the path are left untouched.
pub async fn populate(
    store: &dyn DocumentStore,
    docs: &mut [Value],
    spec: &PopulateSpec,
    collection: &str,
) -> Result<()> {
    let mut ids: Vec<String> = docs
        .iter()
        .flat_map(|doc| referenced_ids(lookup_path(doc, &spec.path)))
        .collect();
    ids.sort();
    ids.dedup();
    if ids.is_empty() {
        return Ok(());
    }

    let found = store
        .find(collection, &FindQuery::new(id_membership(&ids)))
        .await?;
    let by_id: HashMap<String, Value> = found
        .into_iter()
        .filter_map(|doc| {
            let id = doc.get(ID_FIELD)?.as_str()?.to_string();
            let shaped = match &spec.fields {
                Some(p) => p.apply(&doc),
                None => doc,
            };
            Some((id, shaped))
        })
        .collect();

    for doc in docs.iter_mut() {
        let replacement = match lookup_path(doc, &spec.path) {
            Some(Value::String(id)) => by_id.get(id).cloned().unwrap_or(Value::Null),
            Some(Value::Array(items)) => Value::Array(
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .filter_map(|id| by_id.get(id).cloned())
                    .collect(),
            ),
            _ => continue,
        };
        if let Value::Object(map) = doc {
            set_path(map, &spec.path, replacement);
        }
    }
    Ok(())
}
