//! `docsearch stats`: what is stored and what is cached.
//!
//! Lists every collection that is either configured as a model or present
//! in the database, with its document count, indexed paths, live cache
//! entries, and when it was last written.

use anyhow::Result;
use sqlx::Row;
use std::collections::BTreeMap;

use crate::config::Config;
use crate::context::SearchContext;
use crate::sqlite_cache::SqliteCache;

#[derive(Debug, Default, Clone, PartialEq)]
pub struct CollectionStats {
    pub documents: i64,
    pub indexed_paths: Vec<String>,
    pub cached_searches: i64,
    pub last_write_ts: Option<i64>,
}

pub async fn collect_stats(config: &Config) -> Result<BTreeMap<String, CollectionStats>> {
    let ctx = SearchContext::open(config).await?;
    let pool = ctx.pool();

    let mut stats: BTreeMap<String, CollectionStats> = config
        .models
        .keys()
        .map(|name| (name.clone(), CollectionStats::default()))
        .collect();

    let doc_rows = sqlx::query(
        r#"
        SELECT collection, COUNT(*) AS documents, MAX(updated_at) AS last_write
        FROM documents
        GROUP BY collection
        "#,
    )
    .fetch_all(pool)
    .await?;
    for row in &doc_rows {
        let entry = stats.entry(row.get("collection")).or_default();
        entry.documents = row.get("documents");
        entry.last_write_ts = row.get("last_write");
    }

    let index_rows = sqlx::query("SELECT collection, path FROM indexed_paths ORDER BY path")
        .fetch_all(pool)
        .await?;
    for row in &index_rows {
        stats
            .entry(row.get("collection"))
            .or_default()
            .indexed_paths
            .push(row.get("path"));
    }

    let cache = SqliteCache::with_ttl(pool.clone(), config.cache.ttl());
    for (collection, entries) in cache.live_entries().await? {
        stats.entry(collection).or_default().cached_searches = entries;
    }

    ctx.close().await;
    Ok(stats)
}

pub async fn run_stats(config: &Config) -> Result<()> {
    let stats = collect_stats(config).await?;
    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("docsearch: database stats");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!("  Cache TTL:   {}s", config.cache.ttl_secs);
    println!();
    println!(
        "  {:<20} {:>6} {:>8}   {:<20} {}",
        "COLLECTION", "DOCS", "CACHED", "INDEXED", "LAST WRITE"
    );
    println!("  {}", "-".repeat(72));

    for (name, s) in &stats {
        let last_write = match s.last_write_ts {
            Some(ts) => format_ts_relative(ts),
            None => "never".to_string(),
        };
        let indexed = if s.indexed_paths.is_empty() {
            "-".to_string()
        } else {
            s.indexed_paths.join(",")
        };
        println!(
            "  {:<20} {:>6} {:>8}   {:<20} {}",
            name, s.documents, s.cached_searches, indexed, last_write
        );
    }
    println!();
    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

/// Unix seconds as "3 hours ago", falling back to a date for old writes.
fn format_ts_relative(ts: i64) -> String {
    let delta = chrono::Utc::now().timestamp() - ts;
    match delta {
        d if d < 0 => format_ts_date(ts),
        d if d < 60 => "just now".to_string(),
        d if d < 3600 => plural(d / 60, "min"),
        d if d < 86400 => plural(d / 3600, "hour"),
        d if d < 86400 * 30 => plural(d / 86400, "day"),
        _ => format_ts_date(ts),
    }
}

fn plural(n: i64, unit: &str) -> String {
    format!("{} {}{} ago", n, unit, if n == 1 { "" } else { "s" })
}

fn format_ts_date(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}
