//! # docsearch core
//!
//! Storage-agnostic logic for docsearch: the document model, a small
//! Mongo-style query language, the [`store::DocumentStore`] and
//! [`cache::SearchCache`] traits with in-memory implementations, text
//! capabilities (stemming and string distance), keyword extraction,
//! relevance scoring, and the cached search pipeline.
//!
//! This crate has no tokio, sqlx, or filesystem dependencies. Applications
//! plug in their own store and cache through [`plugin::SearchPlugin`].
//!
//! ```text
//! query text ──▶ stems ──▶ cache ──(miss)──▶ keyword $in lookup ──▶ rank
//!                             │                                     │
//!                             └──(hit)──▶ ranked ids ◀──── store ◀───┘
//!                                            │
//!                                      skip/limit page
//!                                            │
//!                           find / aggregate + populate ──▶ results
//! ```

pub mod cache;
pub mod keywords;
pub mod models;
pub mod plugin;
pub mod populate;
pub mod query;
pub mod relevance;
pub mod search;
pub mod store;
pub mod text;

pub use models::Document;
pub use plugin::{ModelDefinition, PluginOptions, RebuildReport, SearchModel, SearchPlugin};
pub use search::{SearchOptions, SearchResponse};
