//! SQLite store and cache behavior, and the search pipeline on top of them.

use std::path::Path;

use serde_json::{json, Value};
use sqlx::SqlitePool;
use tempfile::TempDir;

use docsearch::cache::{CacheKey, SearchCache};
use docsearch::config::{load_config, Config};
use docsearch::context::SearchContext;
use docsearch::models::Document;
use docsearch::query::{Filter, FindQuery, Projection, SortSpec, Stage};
use docsearch::sqlite_cache::SqliteCache;
use docsearch::sqlite_store::SqliteStore;
use docsearch::store::DocumentStore;
use docsearch::{db, migrate, SearchOptions};

async fn open_pool(dir: &Path) -> SqlitePool {
    let pool = db::connect_path(&dir.join("data").join("test.sqlite"))
        .await
        .unwrap();
    migrate::migrate(&pool).await.unwrap();
    pool
}

fn filter(value: Value) -> Filter {
    value.as_object().cloned().unwrap()
}

fn stems(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn ids(docs: &[Value]) -> Vec<&str> {
    docs.iter().map(|d| d["_id"].as_str().unwrap()).collect()
}

async fn put(store: &SqliteStore, id: &str, body: Value) {
    let mut value = body;
    value["_id"] = json!(id);
    store
        .save("things", &Document::from_value(value).unwrap())
        .await
        .unwrap();
}

#[tokio::test]
async fn save_replaces_in_place_and_keeps_insertion_order() {
    let tmp = TempDir::new().unwrap();
    let store = SqliteStore::new(open_pool(tmp.path()).await);

    put(&store, "b", json!({"v": 1})).await;
    put(&store, "a", json!({"v": 2})).await;
    put(&store, "b", json!({"v": 3})).await;

    let all = store.find("things", &FindQuery::default()).await.unwrap();
    assert_eq!(all, vec![json!({"_id": "b", "v": 3}), json!({"_id": "a", "v": 2})]);

    let sorted = store
        .find("things", &FindQuery::default().sort(Some(SortSpec::new().asc("v"))))
        .await
        .unwrap();
    assert_eq!(ids(&sorted), vec!["a", "b"]);
    assert!(store.find("missing", &FindQuery::default()).await.unwrap().is_empty());
}

#[tokio::test]
async fn indexed_membership_queries() {
    let tmp = TempDir::new().unwrap();
    let store = SqliteStore::new(open_pool(tmp.path()).await);

    // Saved before the index exists; ensure_index must backfill.
    put(&store, "d1", json!({"kw": ["objet", "procur"], "n": 1})).await;
    store.ensure_index("things", "kw").await.unwrap();
    store.ensure_index("things", "kw").await.unwrap();
    put(&store, "d2", json!({"kw": ["objet", "ach"], "n": 2})).await;
    put(&store, "d3", json!({"kw": "ach", "n": 3})).await;

    let query = FindQuery::new(filter(json!({"kw": {"$in": ["procur", "ach"]}})));
    let found = store.find("things", &query).await.unwrap();
    assert_eq!(ids(&found), vec!["d1", "d2", "d3"]);

    let query = FindQuery::new(filter(json!({"kw": "objet", "n": {"$gt": 1}})))
        .projection(Some(Projection::include(["n"])));
    let found = store.find("things", &query).await.unwrap();
    assert_eq!(found, vec![json!({"_id": "d2", "n": 2})]);

    // Rewriting a document replaces its terms.
    put(&store, "d1", json!({"kw": ["other"], "n": 1})).await;
    let query = FindQuery::new(filter(json!({"kw": {"$in": ["procur"]}})));
    assert!(store.find("things", &query).await.unwrap().is_empty());

    let by_id = FindQuery::new(filter(json!({"_id": {"$in": ["d3", "d1", "nope"]}})));
    assert_eq!(ids(&store.find("things", &by_id).await.unwrap()), vec!["d1", "d3"]);
}

#[tokio::test]
async fn remove_and_aggregate() {
    let tmp = TempDir::new().unwrap();
    let store = SqliteStore::new(open_pool(tmp.path()).await);
    store.ensure_index("things", "kw").await.unwrap();
    for i in 0..5 {
        put(&store, &format!("d{i}"), json!({"kw": ["x"], "n": i})).await;
    }

    let removed = store
        .remove("things", &filter(json!({"n": {"$gte": 3}})))
        .await
        .unwrap();
    assert_eq!(removed, 2);
    assert_eq!(store.remove("things", &filter(json!({"n": 99}))).await.unwrap(), 0);

    let pipeline = vec![
        Stage::Match(filter(json!({"kw": {"$in": ["x"]}}))),
        Stage::Sort(SortSpec::new().desc("n")),
        Stage::Limit(2),
        Stage::Project(Projection::include(["n"]).without_id()),
    ];
    let out = store.aggregate("things", &pipeline).await.unwrap();
    assert_eq!(out, vec![json!({"n": 2}), json!({"n": 1})]);

    let terms: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM document_terms")
        .fetch_one(store.pool())
        .await
        .unwrap();
    assert_eq!(terms, 3);
}

#[tokio::test]
async fn cache_round_trip_and_expiry() {
    let tmp = TempDir::new().unwrap();
    let pool = open_pool(tmp.path()).await;
    let cache = SqliteCache::new(pool.clone());

    let key = CacheKey::new("articles", &stems(&["b", "a"]), None);
    assert_eq!(cache.lookup(&key).await.unwrap(), None);

    let ranked = stems(&["id2", "id1"]);
    cache.store(&key, &ranked).await.unwrap();
    let same = CacheKey::new("articles", &stems(&["a", "b"]), None);
    assert_eq!(cache.lookup(&same).await.unwrap(), Some(ranked.clone()));

    let other = CacheKey::new("articles", &stems(&["a", "b"]), Some(&filter(json!({"n": 1}))));
    assert_eq!(cache.lookup(&other).await.unwrap(), None);

    // Newest entry wins.
    cache.store(&key, &stems(&["id3"])).await.unwrap();
    assert_eq!(cache.lookup(&key).await.unwrap(), Some(stems(&["id3"])));
    assert_eq!(cache.live_entries().await.unwrap(), vec![("articles".to_string(), 2)]);

    let expired = SqliteCache::with_ttl(pool, chrono::Duration::zero());
    assert_eq!(expired.lookup(&key).await.unwrap(), None);
    expired.store(&key, &ranked).await.unwrap();
    assert_eq!(expired.lookup(&key).await.unwrap(), None);
}

#[tokio::test]
async fn ttl_past_the_earliest_date_keeps_entries() {
    let tmp = TempDir::new().unwrap();
    let pool = open_pool(tmp.path()).await;
    let cache = SqliteCache::with_ttl(pool, chrono::Duration::seconds(10_000_000_000_000));

    let key = CacheKey::new("articles", &stems(&["objet"]), None);
    assert_eq!(cache.lookup(&key).await.unwrap(), None);
    cache.store(&key, &stems(&["a1"])).await.unwrap();
    assert_eq!(cache.lookup(&key).await.unwrap(), Some(stems(&["a1"])));
    assert_eq!(cache.live_entries().await.unwrap(), vec![("articles".to_string(), 1)]);
}

fn write_config(dir: &Path, ttl_secs: i64) -> Config {
    let path = dir.join("docsearch.toml");
    std::fs::write(
        &path,
        format!(
            r#"
[db]
path = "{}/data/docsearch.sqlite"

[cache]
ttl_secs = {}

[models.articles]
fields = ["title", "tags"]
references = {{ author = "authors" }}

[models.authors]
fields = ["name"]
"#,
            dir.display(),
            ttl_secs
        ),
    )
    .unwrap();
    load_config(&path).unwrap()
}

#[tokio::test]
async fn search_pipeline_over_sqlite() {
    let tmp = TempDir::new().unwrap();
    let config = write_config(tmp.path(), 3600);
    let ctx = SearchContext::open(&config).await.unwrap();

    let authors = ctx.model("authors").await.unwrap();
    let mut ana = Document::with_id("u1");
    ana.set("name", "Ana");
    ana.set("email", "ana@example.com");
    authors.save(&mut ana).await.unwrap();

    let articles = ctx.model("articles").await.unwrap();
    for (i, title) in ["searching engines", "search objects", "cooking"].iter().enumerate() {
        let mut doc = Document::with_id(format!("a{i}"));
        doc.set("title", *title);
        doc.set("index", i as i64);
        doc.set("author", "u1");
        articles.save(&mut doc).await.unwrap();
    }

    let response = articles.search("search").await.unwrap();
    assert_eq!(response.total_count, 2);
    let mut found = ids(&response.results);
    found.sort();
    assert_eq!(found, vec!["a0", "a1"]);

    let options = SearchOptions::new()
        .sort(SortSpec::new().desc("index"))
        .populate(docsearch::populate::PopulateSpec::new("author").fields(Projection::include(["name"])));
    let response = articles.search_with("search", None, &options).await.unwrap();
    assert_eq!(ids(&response.results), vec!["a1", "a0"]);
    assert_eq!(response.results[0]["author"], json!({"_id": "u1", "name": "Ana"}));

    ctx.close().await;

    // Cached ids survive a new connection.
    let ctx = SearchContext::open(&config).await.unwrap();
    let articles = ctx.model("articles").await.unwrap();
    let mut late = Document::with_id("a9");
    late.set("title", "search again");
    articles.save(&mut late).await.unwrap();
    assert_eq!(articles.search("search").await.unwrap().total_count, 2);

    let report = articles.rebuild_all_keywords().await.unwrap();
    assert_eq!(report.total, 4);
    assert_eq!(report.failed, 0);
    ctx.close().await;
}

#[tokio::test]
async fn unknown_model_is_an_error() {
    let tmp = TempDir::new().unwrap();
    let config = write_config(tmp.path(), 60);
    let ctx = SearchContext::open(&config).await.unwrap();
    let err = ctx.model("nope").await.err().unwrap().to_string();
    assert!(err.contains("Unknown model 'nope'"), "{err}");
    ctx.close().await;
}
