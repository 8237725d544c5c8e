//! Wiring between configuration and the search core.
//!
//! A [`SearchContext`] owns the database pool and one [`SearchPlugin`]
//! backed by [`SqliteStore`] and [`SqliteCache`]. Every CLI command goes
//! through it, so all models share one store and one cache.

use std::sync::Arc;

use anyhow::Result;
use sqlx::SqlitePool;

use docsearch_core::{SearchModel, SearchPlugin};

use crate::config::Config;
use crate::db;
use crate::migrate;
use crate::sqlite_cache::SqliteCache;
use crate::sqlite_store::SqliteStore;

pub struct SearchContext {
    config: Config,
    pool: SqlitePool,
    plugin: SearchPlugin,
}

impl SearchContext {
    /// Connect to the configured database and make sure the schema exists.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::migrate(&pool).await?;

        let store = Arc::new(SqliteStore::new(pool.clone()));
        let cache = Arc::new(SqliteCache::with_ttl(pool.clone(), config.cache.ttl()));
        Ok(Self {
            config: config.clone(),
            pool,
            plugin: SearchPlugin::new(store, cache),
        })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Install the search plugin on the named model.
    pub async fn model(&self, name: &str) -> Result<SearchModel> {
        let model = self.config.model(name)?;
        self.plugin
            .install(model.definition(name), model.plugin.clone())
            .await
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}
