//! Keyword extraction from a document's configured source fields.

use std::collections::HashSet;

use anyhow::Result;
use serde_json::Value;

use crate::models::Document;
use crate::text::Stemmer;

/// Text contribution of one field: strings verbatim, arrays of strings
/// joined with a space, anything else empty.
fn field_text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join(" "),
        _ => String::new(),
    }
}

/// Concatenated source text of the configured fields.
pub fn source_text(doc: &Document, fields: &[String]) -> String {
    fields
        .iter()
        .map(|field| field_text(doc.get(field)))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Deduplicate, keeping the first occurrence of each stem.
pub fn unique_stems(stems: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::with_capacity(stems.len());
    stems
        .into_iter()
        .filter(|stem| seen.insert(stem.clone()))
        .collect()
}

/// Compute a document's keyword set.
pub fn extract_keywords(doc: &Document, fields: &[String], stemmer: &dyn Stemmer) -> Result<Vec<String>> {
    let text = source_text(doc, fields);
    Ok(unique_stems(stemmer.tokenize_and_stem(&text)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::stemmer_by_name;
    use serde_json::json;

    fn fields(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn strings_and_arrays_contribute() {
        let doc = Document::from_value(json!({
            "title": "Rust search",
            "tags": ["fast", 3, "search"],
            "views": 10
        }))
        .unwrap();
        assert_eq!(
            source_text(&doc, &fields(&["title", "tags", "views", "missing"])),
            "Rust search fast search  "
        );
    }

    #[test]
    fn keywords_are_unique_stems() {
        let stemmer = stemmer_by_name("english").unwrap();
        let doc = Document::from_value(json!({
            "title": "Searching searches",
            "tags": ["search", "engines"]
        }))
        .unwrap();
        let keywords = extract_keywords(&doc, &fields(&["title", "tags"]), &stemmer).unwrap();
        assert_eq!(keywords, vec!["search", "engin"]);
    }

    #[test]
    fn empty_sources_give_empty_keywords() {
        let stemmer = stemmer_by_name("english").unwrap();
        let doc = Document::from_value(json!({"title": null})).unwrap();
        assert!(extract_keywords(&doc, &fields(&["title"]), &stemmer)
            .unwrap()
            .is_empty());
    }
}
