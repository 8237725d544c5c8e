//! `docsearch import`: load documents from a JSON file into a model.
//!
//! The file holds either one JSON array of objects or one object per line
//! (JSON lines). Each document is saved through the model, so the
//! pre-save keyword hook runs for every one of them.

use anyhow::{bail, Context, Result};
use serde_json::Value;
use std::path::Path;
use tracing::info;

use docsearch_core::{Document, SearchModel};

use crate::config::Config;
use crate::context::SearchContext;

/// Parse a JSON array or JSON-lines payload into document objects.
pub fn parse_documents(content: &str) -> Result<Vec<Value>> {
    let trimmed = content.trim_start();
    let values = if trimmed.starts_with('[') {
        match serde_json::from_str::<Value>(trimmed).context("Invalid JSON array")? {
            Value::Array(items) => items,
            _ => bail!("expected a JSON array of documents"),
        }
    } else {
        let mut items = Vec::new();
        for (n, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let value = serde_json::from_str(line)
                .with_context(|| format!("Invalid JSON on line {}", n + 1))?;
            items.push(value);
        }
        items
    };

    for (i, value) in values.iter().enumerate() {
        if !value.is_object() {
            bail!("document {} is not a JSON object", i + 1);
        }
    }
    Ok(values)
}

/// Save every value through `model`, returning how many were stored.
pub async fn import_documents(model: &SearchModel, values: Vec<Value>) -> Result<usize> {
    let mut saved = 0;
    for value in values {
        let mut doc = Document::from_value(value)?;
        model
            .save(&mut doc)
            .await
            .with_context(|| format!("Failed to save document {}", doc.id()))?;
        saved += 1;
    }
    Ok(saved)
}

pub async fn run_import(config: &Config, model_name: &str, path: &Path) -> Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let values = parse_documents(&content)?;

    let ctx = SearchContext::open(config).await?;
    let model = ctx.model(model_name).await?;
    let saved = import_documents(&model, values).await?;
    info!(collection = model_name, saved, "import finished");
    ctx.close().await;

    println!("Imported {} documents into {}", saved, model_name);
    Ok(())
}
