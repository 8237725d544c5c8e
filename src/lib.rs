//! # docsearch
//!
//! Keyword search with relevance ranking and cached results for JSON
//! document collections.
//!
//! The search logic lives in `docsearch-core`; this crate supplies the
//! SQLite-backed store and cache, TOML configuration, and the `docsearch`
//! command-line interface.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────────┐   ┌─────────────────────┐
//! │   CLI    │──▶│ SearchContext │──▶│ docsearch-core      │
//! │ commands │   │ (config+pool) │   │ SearchPlugin/Model  │
//! └──────────┘   └───────────────┘   └──────────┬──────────┘
//!                                               │
//!                         ┌─────────────────────┤
//!                         ▼                     ▼
//!                  ┌─────────────┐       ┌─────────────┐
//!                  │ SqliteStore │       │ SqliteCache │
//!                  └─────────────┘       └─────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | `DocumentStore` over SQLite |
//! | [`sqlite_cache`] | `SearchCache` over SQLite |
//! | [`context`] | Builds searchable models from config |
//! | [`import`], [`search`], [`rebuild`], [`stats`] | CLI commands |

pub mod config;
pub mod context;
pub mod db;
pub mod import;
pub mod migrate;
pub mod rebuild;
pub mod search;
pub mod sqlite_cache;
pub mod sqlite_store;
pub mod stats;

pub use docsearch_core::{cache, keywords, models, populate, query, relevance, store, text};
pub use docsearch_core::{
    Document, ModelDefinition, PluginOptions, RebuildReport, SearchModel, SearchOptions,
    SearchPlugin, SearchResponse,
};
