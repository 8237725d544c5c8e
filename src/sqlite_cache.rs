//! SQLite-backed [`SearchCache`].
//!
//! Entries live in `search_results`, looked up by the key digest. Rows whose
//! age reaches the TTL are ignored by lookups and deleted on the next store.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::{Row, SqlitePool};

use docsearch_core::cache::{default_ttl, CacheKey, SearchCache};

pub struct SqliteCache {
    pool: SqlitePool,
    ttl: Duration,
}

impl SqliteCache {
    pub fn new(pool: SqlitePool) -> Self {
        Self::with_ttl(pool, default_ttl())
    }

    pub fn with_ttl(pool: SqlitePool, ttl: Duration) -> Self {
        Self { pool, ttl }
    }

    /// Oldest `created_at` (unix millis) still considered live. A TTL that
    /// reaches past the earliest representable time keeps every entry.
    fn live_after(&self) -> i64 {
        Utc::now()
            .checked_sub_signed(self.ttl)
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
            .timestamp_millis()
    }

    /// Number of live entries per collection.
    pub async fn live_entries(&self) -> Result<Vec<(String, i64)>> {
        let rows = sqlx::query(
            r#"
            SELECT collection, COUNT(*) AS entries
            FROM search_results
            WHERE created_at > ?
            GROUP BY collection
            ORDER BY collection
            "#,
        )
        .bind(self.live_after())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|row| (row.get("collection"), row.get("entries")))
            .collect())
    }
}

#[async_trait]
impl SearchCache for SqliteCache {
    async fn lookup(&self, key: &CacheKey) -> Result<Option<Vec<String>>> {
        let row = sqlx::query(
            r#"
            SELECT results FROM search_results
            WHERE key_digest = ? AND collection = ? AND created_at > ?
            ORDER BY id DESC
            LIMIT 1
            "#,
        )
        .bind(key.digest())
        .bind(&key.collection)
        .bind(self.live_after())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let results: String = row.get("results");
                Ok(Some(serde_json::from_str(&results)?))
            }
            None => Ok(None),
        }
    }

    async fn store(&self, key: &CacheKey, ids: &[String]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM search_results WHERE created_at <= ?")
            .bind(self.live_after())
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO search_results (key_digest, collection, stems, conditions, results, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(key.digest())
        .bind(&key.collection)
        .bind(serde_json::to_string(&key.stems)?)
        .bind(&key.conditions)
        .bind(serde_json::to_string(ids)?)
        .bind(Utc::now().timestamp_millis())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}
