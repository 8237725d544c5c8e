//! TOML configuration: database location, cache TTL, and one section per
//! searchable model.
//!
//! ```toml
//! [db]
//! path = "./data/docsearch.sqlite"
//!
//! [cache]
//! ttl_secs = 3600
//!
//! [models.articles]
//! fields = ["title", "description", "tags"]
//! stemmer = "portuguese"
//! references = { author = "authors" }
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use docsearch_core::cache::DEFAULT_TTL_SECS;
use docsearch_core::text::{distance_by_name, stemmer_by_name};
use docsearch_core::{ModelDefinition, PluginOptions};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub models: BTreeMap<String, ModelConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: i64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
        }
    }
}

fn default_ttl_secs() -> i64 {
    DEFAULT_TTL_SECS
}

/// Upper bound on `cache.ttl_secs`: one year.
pub const MAX_TTL_SECS: i64 = 365 * 24 * 3600;

impl CacheConfig {
    /// The TTL as a duration, clamped to [`MAX_TTL_SECS`].
    pub fn ttl(&self) -> chrono::Duration {
        chrono::TimeDelta::try_seconds(self.ttl_secs.min(MAX_TTL_SECS))
            .unwrap_or_else(|| chrono::TimeDelta::seconds(MAX_TTL_SECS))
    }
}

/// Plugin options for one model plus the collections its reference paths
/// point to.
#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    #[serde(flatten)]
    pub plugin: PluginOptions,
    #[serde(default)]
    pub references: BTreeMap<String, String>,
    /// Keys matching neither the plugin options nor `references`.
    #[serde(flatten)]
    pub unknown: BTreeMap<String, toml::Value>,
}

impl ModelConfig {
    pub fn definition(&self, name: &str) -> ModelDefinition {
        self.references
            .iter()
            .fold(ModelDefinition::new(name), |def, (path, collection)| {
                def.reference(path.as_str(), collection.as_str())
            })
    }
}

impl Config {
    pub fn model(&self, name: &str) -> Result<&ModelConfig> {
        self.models.get(name).with_context(|| {
            let known: Vec<&str> = self.models.keys().map(String::as_str).collect();
            format!("Unknown model '{}'. Configured models: {}", name, known.join(", "))
        })
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.cache.ttl_secs <= 0 {
        bail!("cache.ttl_secs must be > 0");
    }
    if config.cache.ttl_secs > MAX_TTL_SECS {
        bail!(
            "cache.ttl_secs must be <= {} (got {})",
            MAX_TTL_SECS,
            config.cache.ttl_secs
        );
    }

    if config.models.is_empty() {
        bail!("at least one [models.<name>] section is required");
    }

    for (name, model) in &config.models {
        if !model.unknown.is_empty() {
            let keys: Vec<&str> = model.unknown.keys().map(String::as_str).collect();
            bail!(
                "Unknown keys in [models.{}]: {}. Expected fields, stemmer, distance, \
                 keywords_path, relevance_path, references",
                name,
                keys.join(", ")
            );
        }
        model
            .plugin
            .validate()
            .with_context(|| format!("Invalid options for model '{}'", name))?;
        stemmer_by_name(&model.plugin.stemmer)
            .with_context(|| format!("Invalid stemmer for model '{}'", name))?;
        distance_by_name(&model.plugin.distance)
            .with_context(|| format!("Invalid distance for model '{}'", name))?;
    }

    Ok(config)
}
