//! A small Mongo-style query language evaluated over JSON documents.
//!
//! Stores accept a [`FindQuery`] (filter, projection, sort, skip, limit) or
//! an aggregation pipeline of [`Stage`]s. Both in-memory and SQLite stores
//! evaluate them through the functions here, so filter semantics are the
//! same regardless of backend.
//!
//! # Filter operators
//!
//! | Operator | Meaning |
//! |----------|---------|
//! | literal | equality; an array field matches if any element is equal |
//! | `$eq` / `$ne` | equality / inequality |
//! | `$in` / `$nin` | membership in / absence from a list |
//! | `$gt` `$gte` `$lt` `$lte` | ordered comparison within the same type |
//! | `$exists` | field presence |
//! | `$and` / `$or` | top-level conjunction / disjunction of filters |

use std::cmp::Ordering;

use anyhow::{bail, Result};
use serde_json::{json, Map, Value};

use crate::models::{lookup_path, remove_path, set_path, ID_FIELD};

/// A filter document, e.g. `{"index": {"$gte": 2}, "tags": "rust"}`.
pub type Filter = Map<String, Value>;

/// Build `{"_id": {"$in": ids}}`.
pub fn id_membership(ids: &[String]) -> Filter {
    let mut filter = Filter::new();
    filter.insert(ID_FIELD.to_string(), json!({ "$in": ids }));
    filter
}

/// Merge extra conditions with another filter.
///
/// Keys are combined directly when they do not collide; otherwise both
/// filters are wrapped in `$and` so neither predicate is lost.
pub fn merge_filters(conditions: Option<&Filter>, extra: Filter) -> Filter {
    let Some(conditions) = conditions.filter(|c| !c.is_empty()) else {
        return extra;
    };
    if extra.keys().any(|k| conditions.contains_key(k)) {
        let mut merged = Filter::new();
        merged.insert(
            "$and".to_string(),
            Value::Array(vec![
                Value::Object(conditions.clone()),
                Value::Object(extra),
            ]),
        );
        return merged;
    }
    let mut merged = conditions.clone();
    merged.extend(extra);
    merged
}

/// Evaluate a filter against a document in its JSON form.
pub fn matches(doc: &Value, filter: &Filter) -> Result<bool> {
    for (key, predicate) in filter {
        let ok = match key.as_str() {
            "$and" => {
                let mut all = true;
                for sub in sub_filters(key, predicate)? {
                    if !matches(doc, sub)? {
                        all = false;
                        break;
                    }
                }
                all
            }
            "$or" => {
                let mut any = false;
                for sub in sub_filters(key, predicate)? {
                    if matches(doc, sub)? {
                        any = true;
                        break;
                    }
                }
                any
            }
            op if op.starts_with('$') => bail!("unknown top-level operator: {}", op),
            path => field_matches(lookup_path(doc, path), predicate)?,
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn sub_filters<'a>(op: &str, value: &'a Value) -> Result<Vec<&'a Filter>> {
    let Value::Array(items) = value else {
        bail!("{} expects an array of filters", op);
    };
    items
        .iter()
        .map(|item| match item {
            Value::Object(map) => Ok(map),
            other => bail!("{} expects filter objects, got {}", op, other),
        })
        .collect()
}

fn is_operator_object(predicate: &Value) -> bool {
    match predicate {
        Value::Object(map) => !map.is_empty() && map.keys().all(|k| k.starts_with('$')),
        _ => false,
    }
}

fn field_matches(field: Option<&Value>, predicate: &Value) -> Result<bool> {
    if !is_operator_object(predicate) {
        return Ok(equals(field, predicate));
    }
    let Value::Object(ops) = predicate else {
        unreachable!("checked by is_operator_object");
    };
    for (op, arg) in ops {
        let ok = match op.as_str() {
            "$eq" => equals(field, arg),
            "$ne" => !equals(field, arg),
            "$in" => one_of(field, op, arg)?,
            "$nin" => !one_of(field, op, arg)?,
            "$gt" => compares(field, arg, |o| o == Ordering::Greater),
            "$gte" => compares(field, arg, |o| o != Ordering::Less),
            "$lt" => compares(field, arg, |o| o == Ordering::Less),
            "$lte" => compares(field, arg, |o| o != Ordering::Greater),
            "$exists" => match arg {
                Value::Bool(expected) => field.is_some() == *expected,
                other => bail!("$exists expects a boolean, got {}", other),
            },
            other => bail!("unknown operator: {}", other),
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn equals(field: Option<&Value>, target: &Value) -> bool {
    match field {
        None => target.is_null(),
        Some(value) if value == target => true,
        Some(Value::Array(items)) => items.iter().any(|item| item == target),
        Some(_) => false,
    }
}

fn one_of(field: Option<&Value>, op: &str, arg: &Value) -> Result<bool> {
    let Value::Array(candidates) = arg else {
        bail!("{} expects an array, got {}", op, arg);
    };
    Ok(candidates.iter().any(|c| equals(field, c)))
}

fn compares(field: Option<&Value>, target: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
    let comparable = |value: &Value| {
        type_rank(value) == type_rank(target) && accept(compare_values(value, target))
    };
    match field {
        None => false,
        Some(Value::Array(items)) if !target.is_array() => items.iter().any(comparable),
        Some(value) => comparable(value),
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Number(_) => 1,
        Value::String(_) => 2,
        Value::Object(_) => 3,
        Value::Array(_) => 4,
        Value::Bool(_) => 5,
    }
}

/// Total order over JSON values: by type rank, then by value.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    let rank = type_rank(a).cmp(&type_rank(b));
    if rank != Ordering::Equal {
        return rank;
    }
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(0.0);
            let y = y.as_f64().unwrap_or(0.0);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => x
            .iter()
            .zip(y.iter())
            .map(|(l, r)| compare_values(l, r))
            .find(|o| *o != Ordering::Equal)
            .unwrap_or_else(|| x.len().cmp(&y.len())),
        (Value::Object(x), Value::Object(y)) => {
            let x = Value::Object(x.clone()).to_string();
            let y = Value::Object(y.clone()).to_string();
            x.cmp(&y)
        }
        _ => Ordering::Equal,
    }
}

// ─── Projection ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProjectionMode {
    Include,
    Exclude,
}

/// Field projection, e.g. `{"title": 0}` or `{"title": 1, "tags": 1}`.
#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    mode: ProjectionMode,
    fields: Vec<String>,
    include_id: bool,
}

impl Projection {
    /// Keep only these fields (plus `_id`).
    pub fn include<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            mode: ProjectionMode::Include,
            fields: fields.into_iter().map(Into::into).collect(),
            include_id: true,
        }
    }

    /// Drop these fields.
    pub fn exclude<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            mode: ProjectionMode::Exclude,
            fields: fields.into_iter().map(Into::into).collect(),
            include_id: true,
        }
    }

    /// Also drop `_id` from the output.
    pub fn without_id(mut self) -> Self {
        self.include_id = false;
        self
    }

    /// Parse `{"field": 0|1, ...}`. Only `_id` may disagree with the rest.
    pub fn from_value(value: &Value) -> Result<Self> {
        let Value::Object(map) = value else {
            bail!("projection must be an object, got {}", value);
        };
        let mut include_id = true;
        let mut mode = None;
        let mut fields = Vec::new();
        for (key, flag) in map {
            let on = match flag {
                Value::Bool(b) => *b,
                Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
                other => bail!("projection value for {} must be 0 or 1, got {}", key, other),
            };
            if key == ID_FIELD {
                include_id = on;
                continue;
            }
            let this = if on {
                ProjectionMode::Include
            } else {
                ProjectionMode::Exclude
            };
            match mode {
                Some(m) if m != this => {
                    bail!("projection cannot mix inclusion and exclusion")
                }
                _ => mode = Some(this),
            }
            fields.push(key.clone());
        }
        Ok(Self {
            mode: mode.unwrap_or(ProjectionMode::Exclude),
            fields,
            include_id,
        })
    }

    pub fn apply(&self, doc: &Value) -> Value {
        let Value::Object(source) = doc else {
            return doc.clone();
        };
        let mut out = match self.mode {
            ProjectionMode::Exclude => {
                let mut out = source.clone();
                for field in &self.fields {
                    remove_path(&mut out, field);
                }
                out
            }
            ProjectionMode::Include => {
                let mut out = Map::new();
                if let Some(id) = source.get(ID_FIELD) {
                    out.insert(ID_FIELD.to_string(), id.clone());
                }
                for field in &self.fields {
                    if let Some(value) = lookup_path(doc, field) {
                        set_path(&mut out, field, value.clone());
                    }
                }
                out
            }
        };
        if !self.include_id {
            out.remove(ID_FIELD);
        }
        Value::Object(out)
    }
}

// ─── Sort ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// Ordered list of sort keys.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SortSpec {
    keys: Vec<(String, SortOrder)>,
}

impl SortSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn asc(mut self, field: impl Into<String>) -> Self {
        self.keys.push((field.into(), SortOrder::Ascending));
        self
    }

    pub fn desc(mut self, field: impl Into<String>) -> Self {
        self.keys.push((field.into(), SortOrder::Descending));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn keys(&self) -> &[(String, SortOrder)] {
        &self.keys
    }

    /// Parse `"index"`, `"-index"`, `"index:desc"`, or a comma-separated
    /// list of those.
    pub fn parse(spec: &str) -> Result<Self> {
        let mut out = Self::new();
        for part in spec.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            out = match part.split_once(':') {
                Some((field, "asc")) | Some((field, "1")) => out.asc(field),
                Some((field, "desc")) | Some((field, "-1")) => out.desc(field),
                Some((_, dir)) => bail!("unknown sort direction: {}", dir),
                None => match part.strip_prefix('-') {
                    Some(field) => out.desc(field),
                    None => out.asc(part),
                },
            };
        }
        if out.is_empty() {
            bail!("empty sort specification");
        }
        Ok(out)
    }

    /// Parse `{"field": 1|-1}` or a string accepted by [`SortSpec::parse`].
    pub fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::String(s) => Self::parse(s),
            Value::Object(map) => {
                let mut out = Self::new();
                for (field, dir) in map {
                    out = match dir.as_i64() {
                        Some(1) => out.asc(field.as_str()),
                        Some(-1) => out.desc(field.as_str()),
                        _ => bail!("sort direction for {} must be 1 or -1", field),
                    };
                }
                Ok(out)
            }
            other => bail!("sort must be an object or string, got {}", other),
        }
    }

    pub fn compare(&self, a: &Value, b: &Value) -> Ordering {
        for (field, order) in &self.keys {
            let left = lookup_path(a, field).unwrap_or(&Value::Null);
            let right = lookup_path(b, field).unwrap_or(&Value::Null);
            let ord = compare_values(left, right);
            let ord = match order {
                SortOrder::Ascending => ord,
                SortOrder::Descending => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }

    /// Stable in-place sort.
    pub fn sort(&self, docs: &mut [Value]) {
        docs.sort_by(|a, b| self.compare(a, b));
    }
}

// ─── Find ───────────────────────────────────────────────────────────

/// Filter + projection + options, the shape of a store `find` call.
#[derive(Debug, Clone, Default)]
pub struct FindQuery {
    pub filter: Filter,
    pub projection: Option<Projection>,
    pub sort: Option<SortSpec>,
    pub skip: usize,
    pub limit: Option<usize>,
}

impl FindQuery {
    pub fn new(filter: Filter) -> Self {
        Self {
            filter,
            ..Self::default()
        }
    }

    pub fn projection(mut self, projection: Option<Projection>) -> Self {
        self.projection = projection;
        self
    }

    pub fn sort(mut self, sort: Option<SortSpec>) -> Self {
        self.sort = sort;
        self
    }

    pub fn skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }

    pub fn limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    /// Evaluate against documents given in natural (storage) order.
    pub fn apply<'a, I>(&self, docs: I) -> Result<Vec<Value>>
    where
        I: IntoIterator<Item = &'a Value>,
    {
        let mut selected = Vec::new();
        for doc in docs {
            if matches(doc, &self.filter)? {
                selected.push(doc.clone());
            }
        }
        if let Some(sort) = &self.sort {
            sort.sort(&mut selected);
        }
        let page = selected
            .into_iter()
            .skip(self.skip)
            .take(self.limit.unwrap_or(usize::MAX));
        Ok(match &self.projection {
            Some(p) => page.map(|d| p.apply(&d)).collect(),
            None => page.collect(),
        })
    }
}

// ─── Aggregation ────────────────────────────────────────────────────

/// One aggregation pipeline stage.
#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    Match(Filter),
    Sort(SortSpec),
    Skip(usize),
    Limit(usize),
    Project(Projection),
}

impl Stage {
    /// Parse a JSON pipeline, e.g. `[{"$match": {...}}, {"$limit": 5}]`.
    pub fn parse_pipeline(value: &Value) -> Result<Vec<Stage>> {
        let Value::Array(stages) = value else {
            bail!("pipeline must be an array of stages");
        };
        stages.iter().map(Stage::from_value).collect()
    }

    pub fn from_value(value: &Value) -> Result<Stage> {
        let Some((name, arg)) = value.as_object().filter(|m| m.len() == 1).and_then(|m| m.iter().next())
        else {
            bail!("pipeline stage must be an object with a single key, got {}", value);
        };
        let count = |arg: &Value| {
            arg.as_u64()
                .map(|n| n as usize)
                .ok_or_else(|| anyhow::anyhow!("{} expects a non-negative integer", name))
        };
        Ok(match name.as_str() {
            "$match" => match arg {
                Value::Object(filter) => Stage::Match(filter.clone()),
                _ => bail!("$match expects a filter object"),
            },
            "$sort" => Stage::Sort(SortSpec::from_value(arg)?),
            "$skip" => Stage::Skip(count(arg)?),
            "$limit" => Stage::Limit(count(arg)?),
            "$project" => Stage::Project(Projection::from_value(arg)?),
            other => bail!("unsupported pipeline stage: {}", other),
        })
    }
}

/// Run a pipeline over documents in natural order.
pub fn run_pipeline(mut docs: Vec<Value>, stages: &[Stage]) -> Result<Vec<Value>> {
    for stage in stages {
        docs = match stage {
            Stage::Match(filter) => {
                let mut kept = Vec::with_capacity(docs.len());
                for doc in docs {
                    if matches(&doc, filter)? {
                        kept.push(doc);
                    }
                }
                kept
            }
            Stage::Sort(spec) => {
                spec.sort(&mut docs);
                docs
            }
            Stage::Skip(n) => docs.into_iter().skip(*n).collect(),
            Stage::Limit(n) => {
                docs.truncate(*n);
                docs
            }
            Stage::Project(p) => docs.iter().map(|d| p.apply(d)).collect(),
        };
    }
    Ok(docs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(value: Value) -> Filter {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn equality_matches_array_elements() {
        let doc = json!({"tags": ["rust", "search"], "title": "x"});
        assert!(matches(&doc, &filter(json!({"tags": "rust"}))).unwrap());
        assert!(!matches(&doc, &filter(json!({"tags": "go"}))).unwrap());
        assert!(matches(&doc, &filter(json!({"title": "x"}))).unwrap());
    }

    #[test]
    fn in_operator_over_arrays() {
        let doc = json!({"_keywords": ["objet", "procur"]});
        let f = filter(json!({"_keywords": {"$in": ["ach", "objet"]}}));
        assert!(matches(&doc, &f).unwrap());
        let f = filter(json!({"_keywords": {"$in": []}}));
        assert!(!matches(&doc, &f).unwrap());
    }

    #[test]
    fn comparisons_require_same_type() {
        let doc = json!({"index": 3});
        assert!(matches(&doc, &filter(json!({"index": {"$gte": 3, "$lt": 4}}))).unwrap());
        assert!(!matches(&doc, &filter(json!({"index": {"$gt": "a"}}))).unwrap());
        assert!(!matches(&json!({}), &filter(json!({"index": {"$lt": 10}}))).unwrap());
    }

    #[test]
    fn missing_field_equals_null() {
        let doc = json!({"a": 1});
        assert!(matches(&doc, &filter(json!({"b": null}))).unwrap());
        assert!(matches(&doc, &filter(json!({"b": {"$exists": false}}))).unwrap());
    }

    #[test]
    fn and_or_combinators() {
        let doc = json!({"a": 1, "b": 2});
        let f = filter(json!({"$or": [{"a": 5}, {"b": 2}]}));
        assert!(matches(&doc, &f).unwrap());
        let f = filter(json!({"$and": [{"a": 1}, {"b": 3}]}));
        assert!(!matches(&doc, &f).unwrap());
    }

    #[test]
    fn unknown_operator_is_an_error() {
        let doc = json!({"a": 1});
        assert!(matches(&doc, &filter(json!({"a": {"$regex": "x"}}))).is_err());
        assert!(matches(&doc, &filter(json!({"$nor": []}))).is_err());
    }

    #[test]
    fn merge_wraps_on_collision() {
        let conditions = filter(json!({"_id": "a"}));
        let merged = merge_filters(Some(&conditions), id_membership(&["a".to_string(), "b".to_string()]));
        assert!(merged.contains_key("$and"));

        let conditions = filter(json!({"index": 1}));
        let merged = merge_filters(Some(&conditions), id_membership(&["a".to_string()]));
        assert!(merged.contains_key("index"));
        assert!(merged.contains_key("_id"));
    }

    #[test]
    fn exclusion_projection() {
        let p = Projection::from_value(&json!({"title": 0})).unwrap();
        let out = p.apply(&json!({"_id": "1", "title": "t", "body": "b"}));
        assert_eq!(out, json!({"_id": "1", "body": "b"}));
    }

    #[test]
    fn inclusion_projection_keeps_id_unless_disabled() {
        let p = Projection::from_value(&json!({"title": 1})).unwrap();
        let out = p.apply(&json!({"_id": "1", "title": "t", "body": "b"}));
        assert_eq!(out, json!({"_id": "1", "title": "t"}));

        let p = Projection::from_value(&json!({"title": 1, "_id": 0})).unwrap();
        let out = p.apply(&json!({"_id": "1", "title": "t"}));
        assert_eq!(out, json!({"title": "t"}));
    }

    #[test]
    fn mixed_projection_rejected() {
        assert!(Projection::from_value(&json!({"a": 1, "b": 0})).is_err());
    }

    #[test]
    fn sort_parse_forms() {
        let s = SortSpec::parse("index, -title,views:desc").unwrap();
        assert_eq!(
            s.keys(),
            &[
                ("index".to_string(), SortOrder::Ascending),
                ("title".to_string(), SortOrder::Descending),
                ("views".to_string(), SortOrder::Descending),
            ]
        );
        assert!(SortSpec::parse("a:sideways").is_err());
        assert!(SortSpec::parse(" , ").is_err());
    }

    #[test]
    fn sort_places_missing_first() {
        let mut docs = vec![json!({"i": 2}), json!({}), json!({"i": 1})];
        SortSpec::new().asc("i").sort(&mut docs);
        assert_eq!(docs, vec![json!({}), json!({"i": 1}), json!({"i": 2})]);
    }

    #[test]
    fn find_query_applies_in_order() {
        let docs = vec![
            json!({"_id": "a", "i": 3}),
            json!({"_id": "b", "i": 1}),
            json!({"_id": "c", "i": 2}),
        ];
        let q = FindQuery::new(filter(json!({"i": {"$gte": 1}})))
            .sort(Some(SortSpec::new().desc("i")))
            .skip(1)
            .limit(Some(1))
            .projection(Some(Projection::include(["i"]).without_id()));
        assert_eq!(q.apply(&docs).unwrap(), vec![json!({"i": 2})]);
    }

    #[test]
    fn pipeline_parse_and_run() {
        let stages = Stage::parse_pipeline(&json!([
            {"$match": {"i": {"$gt": 1}}},
            {"$sort": {"i": -1}},
            {"$limit": 1},
            {"$project": {"_id": 0, "i": 1}}
        ]))
        .unwrap();
        let docs = vec![json!({"_id": "a", "i": 1}), json!({"_id": "b", "i": 5}), json!({"_id": "c", "i": 3})];
        assert_eq!(run_pipeline(docs, &stages).unwrap(), vec![json!({"i": 5})]);
        assert!(Stage::parse_pipeline(&json!([{"$group": {}}])).is_err());
    }
}
