//! notebase-store - SQLite storage layer
//!
//! This crate provides persistent storage for pages, content blocks, the
//! page link graph, databases with their property schema and saved views,
//! and page-backed items with per-property values.

mod blocks;
mod databases;
mod items;
mod pages;
mod schema;
mod sqlite;

pub use sqlite::SqliteStore;

// Re-export schema for testing/migrations
pub use schema::{SCHEMA, SCHEMA_VERSION};
