//! SQLite-based storage implementation.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{types::Type, Connection, OpenFlags, OptionalExtension, Transaction};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::info;

use notebase_core::{
    Block, Database, DatabaseConfig, DatabaseSnapshot, Item, ItemUpdate, MonotonicClock,
    NewBlock, NewDatabase, NewItem, NewPage, NewProperty, NewView, NotebaseError, Page,
    PageDocument, PageUpdate, Property, PropertyValue, Result, Store, View,
};

use crate::schema::{SCHEMA, SCHEMA_VERSION, WATERMARK_QUERY};
use crate::{blocks, databases, items, pages};

/// SQLite-based store implementation.
///
/// The store owns exactly one connection. Every operation takes the
/// connection lock for its whole duration and never awaits while holding
/// it, so writes are serialized and each mutation either commits in full
/// or its transaction is dropped and rolled back.
pub struct SqliteStore {
    /// The single connection, guarded by a blocking Mutex.
    conn: Arc<Mutex<Connection>>,

    /// Timestamp source; seeded from the highest persisted stamp.
    clock: Arc<Mutex<MonotonicClock>>,
}

impl SqliteStore {
    /// Open or create a database at the given path with default settings.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let config = DatabaseConfig {
            path: path.as_ref().to_path_buf(),
            ..DatabaseConfig::default()
        };
        Self::open_with_config(&config)
    }

    /// Open or create the database described by `config`.
    pub fn open_with_config(config: &DatabaseConfig) -> Result<Self> {
        let path = config.path.as_path();

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| NotebaseError::database(format!("Failed to open database: {}", e)))?;

        Self::init(conn, config, path)
    }

    /// Open an in-memory database (for testing).
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| {
            NotebaseError::database(format!("Failed to open in-memory database: {}", e))
        })?;

        Self::init(conn, &DatabaseConfig::default(), Path::new(":memory:"))
    }

    /// Initialize the store with a connection.
    fn init(conn: Connection, config: &DatabaseConfig, path: &Path) -> Result<Self> {
        Self::configure_connection(&conn, config)?;

        conn.execute_batch(SCHEMA)
            .map_err(|e| NotebaseError::database(format!("Failed to initialize schema: {}", e)))?;
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)
            .map_err(db_err)?;

        let watermark: Option<i64> = conn
            .query_row(WATERMARK_QUERY, [], |row| row.get(0))
            .optional()
            .map_err(db_err)?
            .flatten();
        let clock = MonotonicClock::starting_after(watermark.unwrap_or(0).max(0) as u64);

        info!("Database opened at {:?}", path);

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            clock: Arc::new(Mutex::new(clock)),
        })
    }

    /// Apply connection pragmas from configuration.
    fn configure_connection(conn: &Connection, config: &DatabaseConfig) -> Result<()> {
        let journal_mode = if config.wal_mode { "WAL" } else { "DELETE" };
        conn.execute_batch(&format!(
            r#"
            PRAGMA journal_mode = {};
            PRAGMA synchronous = NORMAL;
            PRAGMA cache_size = {};
            PRAGMA busy_timeout = {};
            PRAGMA temp_store = MEMORY;
            PRAGMA foreign_keys = ON;
            "#,
            journal_mode, config.cache_size, config.busy_timeout_ms
        ))
        .map_err(|e| NotebaseError::database(format!("Failed to configure connection: {}", e)))?;

        Ok(())
    }

    /// Issue the next timestamp.
    fn next_timestamp(&self) -> Result<u64> {
        let mut clock = self
            .clock
            .lock()
            .map_err(|e| NotebaseError::internal(e.to_string()))?;
        Ok(clock.tick())
    }

    /// Execute a read on the connection.
    pub(crate) fn with_conn<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Connection) -> Result<R>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| NotebaseError::database(e.to_string()))?;
        f(&conn)
    }

    /// Execute a mutation inside a transaction.
    ///
    /// The transaction commits only if `f` succeeds; any error drops it,
    /// which rolls back every statement `f` ran.
    fn with_transaction<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Transaction<'_>) -> Result<R>,
    {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| NotebaseError::database(e.to_string()))?;
        let tx = conn.transaction().map_err(db_err)?;
        let result = f(&tx)?;
        tx.commit().map_err(db_err)?;
        Ok(result)
    }
}

#[async_trait]
impl Store for SqliteStore {
    // Page operations

    async fn create_page(&self, page: NewPage) -> Result<Page> {
        let now = self.next_timestamp()?;
        self.with_transaction(|tx| pages::insert_page(tx, &page, now))
    }

    async fn get_page(&self, id: &str) -> Result<Option<Page>> {
        self.with_conn(|conn| pages::get_page(conn, id))
    }

    async fn list_pages(&self) -> Result<Vec<Page>> {
        self.with_conn(pages::list_pages)
    }

    async fn list_child_pages(&self, parent_id: &str) -> Result<Vec<Page>> {
        self.with_conn(|conn| pages::list_child_pages(conn, parent_id))
    }

    async fn update_page(&self, id: &str, update: PageUpdate) -> Result<Page> {
        let now = self.next_timestamp()?;
        self.with_transaction(|tx| pages::update_page(tx, id, &update, now))
    }

    async fn delete_page(&self, id: &str) -> Result<()> {
        self.with_transaction(|tx| pages::delete_page(tx, id))
    }

    async fn get_page_document(&self, id: &str) -> Result<Option<PageDocument>> {
        self.with_conn(|conn| {
            let Some(page) = pages::get_page(conn, id)? else {
                return Ok(None);
            };
            Ok(Some(PageDocument {
                blocks: blocks::list_blocks(conn, id)?,
                backlinks: pages::list_backlinks(conn, id)?,
                page,
            }))
        })
    }

    // Block and link operations

    async fn replace_blocks(&self, page_id: &str, new_blocks: Vec<NewBlock>) -> Result<Vec<Block>> {
        let now = self.next_timestamp()?;
        self.with_transaction(|tx| blocks::replace_blocks(tx, page_id, &new_blocks, now))
    }

    async fn list_blocks(&self, page_id: &str) -> Result<Vec<Block>> {
        self.with_conn(|conn| {
            pages::require_page(conn, page_id)?;
            blocks::list_blocks(conn, page_id)
        })
    }

    async fn get_block(&self, id: &str) -> Result<Option<Block>> {
        self.with_conn(|conn| blocks::get_block(conn, id))
    }

    async fn list_backlinks(&self, page_id: &str) -> Result<Vec<Page>> {
        self.with_conn(|conn| {
            pages::require_page(conn, page_id)?;
            pages::list_backlinks(conn, page_id)
        })
    }

    async fn get_block_view(&self, block_id: &str) -> Result<Option<View>> {
        self.with_conn(|conn| blocks::get_block_view(conn, block_id))
    }

    // Database and schema operations

    async fn create_database(&self, database: NewDatabase) -> Result<Database> {
        let now = self.next_timestamp()?;
        self.with_transaction(|tx| databases::insert_database(tx, &database, now))
    }

    async fn get_database(&self, id: &str) -> Result<Option<Database>> {
        self.with_conn(|conn| databases::load_database(conn, id))
    }

    async fn list_databases(&self) -> Result<Vec<Database>> {
        self.with_conn(databases::list_databases)
    }

    async fn delete_database(&self, id: &str) -> Result<()> {
        self.with_transaction(|tx| databases::delete_database(tx, id))
    }

    async fn define_property(&self, database_id: &str, property: NewProperty) -> Result<Property> {
        let now = self.next_timestamp()?;
        self.with_transaction(|tx| databases::define_property(tx, database_id, &property, now))
    }

    // View operations

    async fn create_view(&self, database_id: &str, view: NewView) -> Result<View> {
        let now = self.next_timestamp()?;
        self.with_transaction(|tx| databases::create_view(tx, database_id, &view, now))
    }

    async fn get_view(&self, database_id: &str, view_id: &str) -> Result<Option<View>> {
        self.with_conn(|conn| databases::get_view(conn, database_id, view_id))
    }

    async fn update_view(&self, database_id: &str, view_id: &str, view: NewView) -> Result<View> {
        let now = self.next_timestamp()?;
        self.with_transaction(|tx| databases::update_view(tx, database_id, view_id, &view, now))
    }

    async fn delete_view(&self, database_id: &str, view_id: &str) -> Result<()> {
        self.with_transaction(|tx| databases::delete_view(tx, database_id, view_id))
    }

    // Item operations

    async fn create_item(&self, database_id: &str, item: NewItem) -> Result<Item> {
        let now = self.next_timestamp()?;
        self.with_transaction(|tx| items::insert_item(tx, database_id, &item, now))
    }

    async fn get_item(&self, id: &str) -> Result<Option<Item>> {
        self.with_conn(|conn| items::load_item(conn, id))
    }

    async fn list_items(&self, database_id: &str, include_archived: bool) -> Result<Vec<Item>> {
        self.with_conn(|conn| {
            databases::require_database(conn, database_id)?;
            items::list_items(conn, database_id, include_archived)
        })
    }

    async fn update_item(&self, id: &str, update: ItemUpdate) -> Result<Item> {
        let now = self.next_timestamp()?;
        self.with_transaction(|tx| items::update_item(tx, id, &update, now))
    }

    async fn delete_item(&self, id: &str) -> Result<()> {
        self.with_transaction(|tx| items::delete_item(tx, id))
    }

    async fn get_database_snapshot(&self, database_id: &str) -> Result<Option<DatabaseSnapshot>> {
        self.with_conn(|conn| {
            let Some(database) = databases::load_database(conn, database_id)? else {
                return Ok(None);
            };
            let items = items::list_items(conn, database_id, true)?;
            Ok(Some(DatabaseSnapshot { database, items }))
        })
    }

    // Value operations

    async fn set_value(&self, item_id: &str, property: &str, value: Value) -> Result<PropertyValue> {
        let now = self.next_timestamp()?;
        self.with_transaction(|tx| items::set_value(tx, item_id, property, &value, now))
    }

    async fn get_values(&self, item_id: &str) -> Result<BTreeMap<String, PropertyValue>> {
        self.with_conn(|conn| items::get_values(conn, item_id))
    }

    // Health

    async fn ping(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
                .map_err(db_err)?;
            Ok(())
        })
    }
}

/// Map a driver error to an opaque storage error.
pub(crate) fn db_err(e: rusqlite::Error) -> NotebaseError {
    NotebaseError::database(e.to_string())
}

/// Whether the error is a UNIQUE or PRIMARY KEY violation.
pub(crate) fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
    )
}

/// Serialize a value for a JSON text column.
pub(crate) fn to_json<T: serde::Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

/// Decode a JSON text column.
pub(crate) fn json_column<T: DeserializeOwned>(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let text: String = row.get(idx)?;
    serde_json::from_str(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Decode an enum stored by its string name.
pub(crate) fn enum_column<T>(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: std::str::FromStr<Err = NotebaseError>,
{
    let text: String = row.get(idx)?;
    text.parse()
        .map_err(|e: NotebaseError| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Read a non-negative INTEGER timestamp column.
pub(crate) fn millis_column(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<u64> {
    Ok(row.get::<_, i64>(idx)?.max(0) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use notebase_core::{NewProperty, PropertyType};

    #[tokio::test]
    async fn test_open_memory() {
        let store = SqliteStore::open_memory().unwrap();
        store.ping().await.unwrap();
        assert!(store.list_pages().await.unwrap().is_empty());
        assert!(store.list_databases().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_open_file_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("notebase.db");

        let created_at = {
            let store = SqliteStore::open(&path).unwrap();
            let page = store.create_page(NewPage::titled("Home")).await.unwrap();
            page.created_at
        };

        let store = SqliteStore::open(&path).unwrap();
        let pages = store.list_pages().await.unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].title, "Home");

        // The clock resumes after the persisted high-water mark.
        let next = store.create_page(NewPage::titled("Next")).await.unwrap();
        assert!(next.created_at > created_at);
    }

    #[tokio::test]
    async fn test_open_with_config_without_wal() {
        let dir = tempfile::tempdir().unwrap();
        let config = DatabaseConfig {
            path: dir.path().join("plain.db"),
            wal_mode: false,
            ..DatabaseConfig::default()
        };
        let store = SqliteStore::open_with_config(&config).unwrap();
        store.ping().await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_mutation_rolls_back() {
        let store = SqliteStore::open_memory().unwrap();
        let db = store
            .create_database(NewDatabase {
                slug: "tasks".to_string(),
                title: "Tasks".to_string(),
                properties: vec![NewProperty::new("Name", "name", PropertyType::Title)],
                ..Default::default()
            })
            .await
            .unwrap();

        let err = store
            .create_item(&db.id, NewItem::titled("Orphan").with_value("ghost", Value::Bool(true)))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "UNKNOWN_PROPERTY");

        // Neither the backing page nor the item survived.
        assert!(store.list_pages().await.unwrap().is_empty());
        assert!(store.list_items(&db.id, true).await.unwrap().is_empty());
    }
}
