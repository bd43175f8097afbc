//! Core traits defining the interfaces between components.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::Result;
use crate::types::{
    Block, Database, DatabaseSnapshot, Item, ItemUpdate, NewBlock, NewDatabase, NewItem, NewPage,
    NewProperty, NewView, Page, PageDocument, PageUpdate, Property, PropertyValue, View,
};

/// Storage layer trait.
///
/// Every mutating method is all-or-nothing: on error nothing it wrote is
/// visible afterwards.
#[async_trait]
pub trait Store: Send + Sync {
    // Page operations
    async fn create_page(&self, page: NewPage) -> Result<Page>;
    async fn get_page(&self, id: &str) -> Result<Option<Page>>;
    async fn list_pages(&self) -> Result<Vec<Page>>;
    async fn list_child_pages(&self, parent_id: &str) -> Result<Vec<Page>>;
    async fn update_page(&self, id: &str, update: PageUpdate) -> Result<Page>;
    async fn delete_page(&self, id: &str) -> Result<()>;
    async fn get_page_document(&self, id: &str) -> Result<Option<PageDocument>>;

    // Block and link operations
    async fn replace_blocks(&self, page_id: &str, blocks: Vec<NewBlock>) -> Result<Vec<Block>>;
    async fn list_blocks(&self, page_id: &str) -> Result<Vec<Block>>;
    async fn get_block(&self, id: &str) -> Result<Option<Block>>;
    async fn list_backlinks(&self, page_id: &str) -> Result<Vec<Page>>;

    /// The view a `database_view` block embeds, if any.
    async fn get_block_view(&self, block_id: &str) -> Result<Option<View>>;

    // Database and schema operations
    async fn create_database(&self, database: NewDatabase) -> Result<Database>;
    async fn get_database(&self, id: &str) -> Result<Option<Database>>;
    async fn list_databases(&self) -> Result<Vec<Database>>;
    async fn delete_database(&self, id: &str) -> Result<()>;
    async fn define_property(&self, database_id: &str, property: NewProperty) -> Result<Property>;

    // View operations
    async fn create_view(&self, database_id: &str, view: NewView) -> Result<View>;
    async fn get_view(&self, database_id: &str, view_id: &str) -> Result<Option<View>>;
    async fn update_view(&self, database_id: &str, view_id: &str, view: NewView) -> Result<View>;
    async fn delete_view(&self, database_id: &str, view_id: &str) -> Result<()>;

    // Item operations
    async fn create_item(&self, database_id: &str, item: NewItem) -> Result<Item>;
    async fn get_item(&self, id: &str) -> Result<Option<Item>>;
    async fn list_items(&self, database_id: &str, include_archived: bool) -> Result<Vec<Item>>;
    async fn update_item(&self, id: &str, update: ItemUpdate) -> Result<Item>;
    async fn delete_item(&self, id: &str) -> Result<()>;

    /// Schema and all items of a database from one consistent read.
    async fn get_database_snapshot(&self, database_id: &str) -> Result<Option<DatabaseSnapshot>>;

    // Value operations

    /// Upsert the value of one property, referenced by id or slug.
    async fn set_value(&self, item_id: &str, property: &str, value: Value)
        -> Result<PropertyValue>;

    /// Stored values keyed by property id.
    async fn get_values(&self, item_id: &str) -> Result<BTreeMap<String, PropertyValue>>;

    // Health
    async fn ping(&self) -> Result<()>;
}
