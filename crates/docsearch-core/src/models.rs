//! Document model shared by stores, the keyword extractor, and the search
//! pipeline.
//!
//! A [`Document`] is an identifier plus a JSON object of fields. It tracks
//! whether it has been persisted yet and which paths were modified since it
//! was loaded, which is what the pre-save keyword hook keys off.

use std::collections::BTreeSet;

use anyhow::{bail, Result};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Name of the identifier attribute in the JSON form of a document.
pub const ID_FIELD: &str = "_id";

/// A schemaless document with change tracking.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    id: String,
    fields: Map<String, Value>,
    is_new: bool,
    modified: BTreeSet<String>,
}

impl Document {
    /// Create an empty, unsaved document with a fresh UUID.
    pub fn new() -> Self {
        Self::with_id(Uuid::new_v4().to_string())
    }

    /// Create an empty, unsaved document with the given identifier.
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fields: Map::new(),
            is_new: true,
            modified: BTreeSet::new(),
        }
    }

    /// Build an unsaved document from a JSON object.
    ///
    /// An `_id` string in the object is kept; otherwise a UUID is assigned.
    /// Every top-level field counts as modified.
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(mut fields) = value else {
            bail!("document must be a JSON object");
        };
        let id = match fields.remove(ID_FIELD) {
            Some(Value::String(id)) => id,
            Some(other) => bail!("document {} must be a string, got {}", ID_FIELD, other),
            None => Uuid::new_v4().to_string(),
        };
        let modified = fields.keys().cloned().collect();
        Ok(Self {
            id,
            fields,
            is_new: true,
            modified,
        })
    }

    /// Rebuild a persisted document from its stored JSON form.
    pub fn from_stored(value: Value) -> Result<Self> {
        let mut doc = Self::from_value(value)?;
        doc.mark_persisted();
        Ok(doc)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// True until the document has been saved or was loaded from a store.
    pub fn is_new(&self) -> bool {
        self.is_new
    }

    /// Whether `path`, a parent of it, or a child of it was set since the
    /// last save.
    pub fn is_modified(&self, path: &str) -> bool {
        self.modified.iter().any(|m| {
            m == path || is_parent_path(m, path) || is_parent_path(path, m)
        })
    }

    /// Read a field by dotted path.
    pub fn get(&self, path: &str) -> Option<&Value> {
        let (head, rest) = split_path(path);
        let value = self.fields.get(head)?;
        match rest {
            Some(rest) => lookup_path(value, rest),
            None => Some(value),
        }
    }

    /// Set a field by dotted path, creating intermediate objects, and record
    /// the path as modified.
    pub fn set(&mut self, path: &str, value: impl Into<Value>) {
        set_path(&mut self.fields, path, value.into());
        self.modified.insert(path.to_string());
    }

    /// Clear change tracking after the store accepted the document.
    pub fn mark_persisted(&mut self) {
        self.is_new = false;
        self.modified.clear();
    }

    /// JSON form with `_id` included, as handed to stores.
    pub fn to_value(&self) -> Value {
        let mut map = Map::with_capacity(self.fields.len() + 1);
        map.insert(ID_FIELD.to_string(), Value::String(self.id.clone()));
        for (k, v) in &self.fields {
            map.insert(k.clone(), v.clone());
        }
        Value::Object(map)
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

fn is_parent_path(parent: &str, child: &str) -> bool {
    child.len() > parent.len()
        && child.starts_with(parent)
        && child.as_bytes()[parent.len()] == b'.'
}

fn split_path(path: &str) -> (&str, Option<&str>) {
    match path.split_once('.') {
        Some((head, rest)) => (head, Some(rest)),
        None => (path, None),
    }
}

/// Resolve a dotted path inside a JSON value. Only objects are traversed.
pub fn lookup_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        _ => None,
    })
}

/// Set a dotted path inside a JSON object, replacing non-object
/// intermediates with empty objects.
pub fn set_path(map: &mut Map<String, Value>, path: &str, value: Value) {
    match split_path(path) {
        (head, None) => {
            map.insert(head.to_string(), value);
        }
        (head, Some(rest)) => {
            let entry = map
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            if let Value::Object(inner) = entry {
                set_path(inner, rest, value);
            }
        }
    }
}

/// Remove a dotted path from a JSON object, returning the removed value.
pub fn remove_path(map: &mut Map<String, Value>, path: &str) -> Option<Value> {
    match split_path(path) {
        (head, None) => map.remove(head),
        (head, Some(rest)) => match map.get_mut(head) {
            Some(Value::Object(inner)) => remove_path(inner, rest),
            _ => None,
        },
    }
}
