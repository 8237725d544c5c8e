//! SQLite-backed [`DocumentStore`] implementation.
//!
//! Every collection lives in the `documents` table as JSON text keyed by
//! `(collection, id)`. Paths declared through
//! [`ensure_index`](DocumentStore::ensure_index) are mirrored into
//! `document_terms`, one row per string value, so keyword membership
//! queries only load the documents that can match. The final filter,
//! sort, and projection always run through the shared matcher in
//! [`docsearch_core::query`].

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};

use docsearch_core::models::{lookup_path, Document, ID_FIELD};
use docsearch_core::query::{matches, run_pipeline, Filter, FindQuery, Stage};
use docsearch_core::store::DocumentStore;

/// SQLite implementation of the [`DocumentStore`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn indexed_paths(&self, collection: &str) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT path FROM indexed_paths WHERE collection = ? ORDER BY path")
            .bind(collection)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(|row| row.get("path")).collect())
    }

    /// Documents that can match `filter`, in insertion order. The result
    /// is a superset; callers still evaluate the filter.
    async fn candidates(&self, collection: &str, filter: &Filter) -> Result<Vec<Value>> {
        let narrowing = self.narrowing(collection, filter).await?;
        let rows = match narrowing {
            Narrowing::All => {
                sqlx::query("SELECT body FROM documents WHERE collection = ? ORDER BY rowid")
                    .bind(collection)
                    .fetch_all(&self.pool)
                    .await?
            }
            Narrowing::Ids(ids) => {
                sqlx::query(
                    r#"
                    SELECT body FROM documents
                    WHERE collection = ? AND id IN (SELECT value FROM json_each(?))
                    ORDER BY rowid
                    "#,
                )
                .bind(collection)
                .bind(serde_json::to_string(&ids)?)
                .fetch_all(&self.pool)
                .await?
            }
            Narrowing::Terms { path, terms } => {
                sqlx::query(
                    r#"
                    SELECT body FROM documents
                    WHERE collection = ? AND id IN (
                        SELECT doc_id FROM document_terms
                        WHERE collection = ? AND path = ?
                          AND term IN (SELECT value FROM json_each(?))
                    )
                    ORDER BY rowid
                    "#,
                )
                .bind(collection)
                .bind(collection)
                .bind(&path)
                .bind(serde_json::to_string(&terms)?)
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.iter()
            .map(|row| -> Result<Value> {
                let body: String = row.get("body");
                Ok(serde_json::from_str(&body)?)
            })
            .collect()
    }

    async fn narrowing(&self, collection: &str, filter: &Filter) -> Result<Narrowing> {
        if let Some(ids) = filter.get(ID_FIELD).and_then(string_targets) {
            return Ok(Narrowing::Ids(ids));
        }
        for path in self.indexed_paths(collection).await? {
            if let Some(terms) = filter.get(&path).and_then(string_targets) {
                return Ok(Narrowing::Terms { path, terms });
            }
        }
        Ok(Narrowing::All)
    }
}

enum Narrowing {
    All,
    Ids(Vec<String>),
    Terms { path: String, terms: Vec<String> },
}

/// String values a predicate requires the field to contain, when the
/// predicate is a plain string, `$eq` of a string, or `$in` of strings.
fn string_targets(predicate: &Value) -> Option<Vec<String>> {
    match predicate {
        Value::String(s) => Some(vec![s.clone()]),
        Value::Object(ops) => {
            if let Some(Value::String(s)) = ops.get("$eq") {
                return Some(vec![s.clone()]);
            }
            let Some(Value::Array(items)) = ops.get("$in") else {
                return None;
            };
            items
                .iter()
                .map(|item| item.as_str().map(str::to_string))
                .collect()
        }
        _ => None,
    }
}

/// Indexable strings at `path`: the string itself or the strings of an array.
fn terms_at(doc: &Value, path: &str) -> Vec<String> {
    let mut terms: Vec<String> = match lookup_path(doc, path) {
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    };
    terms.sort();
    terms.dedup();
    terms
}

async fn write_terms(
    tx: &mut Transaction<'_, Sqlite>,
    collection: &str,
    path: &str,
    doc_id: &str,
    doc: &Value,
) -> Result<()> {
    for term in terms_at(doc, path) {
        sqlx::query(
            "INSERT INTO document_terms (collection, path, term, doc_id) VALUES (?, ?, ?, ?)",
        )
        .bind(collection)
        .bind(path)
        .bind(&term)
        .bind(doc_id)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn ensure_index(&self, collection: &str, path: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let inserted =
            sqlx::query("INSERT OR IGNORE INTO indexed_paths (collection, path) VALUES (?, ?)")
                .bind(collection)
                .bind(path)
                .execute(&mut *tx)
                .await?
                .rows_affected();

        // Backfill terms for documents saved before the index existed.
        if inserted > 0 {
            let rows = sqlx::query("SELECT id, body FROM documents WHERE collection = ?")
                .bind(collection)
                .fetch_all(&mut *tx)
                .await?;
            for row in &rows {
                let id: String = row.get("id");
                let body: String = row.get("body");
                let doc: Value = serde_json::from_str(&body)?;
                write_terms(&mut tx, collection, path, &id, &doc).await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn save(&self, collection: &str, doc: &Document) -> Result<()> {
        let value = doc.to_value();
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO documents (collection, id, body, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(collection, id) DO UPDATE SET
                body = excluded.body,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(collection)
        .bind(doc.id())
        .bind(value.to_string())
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM document_terms WHERE collection = ? AND doc_id = ?")
            .bind(collection)
            .bind(doc.id())
            .execute(&mut *tx)
            .await?;

        let paths = sqlx::query("SELECT path FROM indexed_paths WHERE collection = ?")
            .bind(collection)
            .fetch_all(&mut *tx)
            .await?;
        for row in &paths {
            let path: String = row.get("path");
            write_terms(&mut tx, collection, &path, doc.id(), &value).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn remove(&self, collection: &str, filter: &Filter) -> Result<usize> {
        let mut doomed = Vec::new();
        for doc in self.candidates(collection, filter).await? {
            if matches(&doc, filter)? {
                if let Some(id) = doc.get(ID_FIELD).and_then(Value::as_str) {
                    doomed.push(id.to_string());
                }
            }
        }
        if doomed.is_empty() {
            return Ok(0);
        }

        let ids = serde_json::to_string(&doomed)?;
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "DELETE FROM document_terms WHERE collection = ? AND doc_id IN (SELECT value FROM json_each(?))",
        )
        .bind(collection)
        .bind(&ids)
        .execute(&mut *tx)
        .await?;
        let removed = sqlx::query(
            "DELETE FROM documents WHERE collection = ? AND id IN (SELECT value FROM json_each(?))",
        )
        .bind(collection)
        .bind(&ids)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        tx.commit().await?;

        Ok(removed as usize)
    }

    async fn find(&self, collection: &str, query: &FindQuery) -> Result<Vec<Value>> {
        let docs = self.candidates(collection, &query.filter).await?;
        query.apply(&docs)
    }

    async fn aggregate(&self, collection: &str, pipeline: &[Stage]) -> Result<Vec<Value>> {
        let docs = match pipeline.first() {
            Some(Stage::Match(filter)) => self.candidates(collection, filter).await?,
            _ => self.candidates(collection, &Filter::new()).await?,
        };
        run_pipeline(docs, pipeline)
    }
}
