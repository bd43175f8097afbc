//! Page-backed items and their per-property values.

use std::collections::{BTreeMap, HashMap, HashSet};

use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use tracing::debug;

use notebase_core::{new_id, Item, ItemUpdate, NewItem, NotebaseError, Property, PropertyValue, Result};

use crate::databases::{list_properties, require_database};
use crate::pages::{insert_page, page_at, PAGE_COLUMNS};
use crate::sqlite::{db_err, json_column, millis_column, to_json};

/// Item columns followed by the backing page's columns.
fn item_query(filter: &str) -> String {
    let page_columns = PAGE_COLUMNS
        .split(", ")
        .map(|c| format!("p.{}", c))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "SELECT i.id, i.database_id, i.position, i.is_archived, i.created_at, i.updated_at, {} \
         FROM database_items i JOIN pages p ON p.id = i.page_id {}",
        page_columns, filter
    )
}

fn row_to_item(row: &rusqlite::Row<'_>) -> rusqlite::Result<Item> {
    Ok(Item {
        id: row.get(0)?,
        database_id: row.get(1)?,
        position: row.get(2)?,
        is_archived: row.get(3)?,
        created_at: millis_column(row, 4)?,
        updated_at: millis_column(row, 5)?,
        page: page_at(row, 6)?,
        properties: BTreeMap::new(),
    })
}

const VALUE_COLUMNS: &str =
    "v.id, v.item_id, v.property_id, v.value, v.is_computed, v.created_at, v.updated_at, p.slug";

/// Convert a row to a value and the slug of its property.
fn row_to_value(row: &rusqlite::Row<'_>) -> rusqlite::Result<(PropertyValue, String)> {
    Ok((
        PropertyValue {
            id: row.get(0)?,
            item_id: row.get(1)?,
            property_id: row.get(2)?,
            value: json_column(row, 3)?,
            is_computed: row.get(4)?,
            transient: false,
            created_at: millis_column(row, 5)?,
            updated_at: millis_column(row, 6)?,
        },
        row.get(7)?,
    ))
}

fn find_property<'a>(properties: &'a [Property], key: &str) -> Option<&'a Property> {
    properties
        .iter()
        .find(|p| p.slug == key)
        .or_else(|| properties.iter().find(|p| p.id == key))
}

/// Resolve a slug-or-id keyed value map into the full set to persist.
///
/// Unknown keys are rejected. Properties left unset fall back to their
/// non-null default; a required property without one is an error.
fn resolve_values<'a>(
    database_id: &str,
    properties: &'a [Property],
    values: &BTreeMap<String, Value>,
) -> Result<Vec<(&'a Property, Value)>> {
    let mut resolved = Vec::with_capacity(properties.len());
    let mut seen = HashSet::new();

    for (key, value) in values {
        let property = find_property(properties, key).ok_or_else(|| {
            NotebaseError::UnknownProperty {
                database_id: database_id.to_string(),
                key: key.clone(),
            }
        })?;
        if !seen.insert(property.id.as_str()) {
            return Err(NotebaseError::invalid_argument(format!(
                "property '{}' given more than once",
                property.slug
            )));
        }
        if value.is_null() && property.is_required {
            continue;
        }
        resolved.push((property, value.clone()));
    }

    for property in properties {
        if resolved.iter().any(|(p, _)| p.id == property.id) {
            continue;
        }
        if !property.default_value.is_null() {
            resolved.push((property, property.default_value.clone()));
        } else if property.is_required {
            return Err(NotebaseError::MissingRequiredProperty {
                slug: property.slug.clone(),
            });
        }
    }

    Ok(resolved)
}

fn insert_values(
    conn: &Connection,
    item_id: &str,
    values: &[(&Property, Value)],
    now: u64,
) -> Result<()> {
    let mut stmt = conn
        .prepare(
            "INSERT INTO database_values \
             (id, item_id, property_id, value, is_computed, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .map_err(db_err)?;

    for (property, value) in values {
        stmt.execute(params![
            new_id(),
            item_id,
            property.id,
            to_json(&value)?,
            property.property_type.is_computed(),
            now as i64,
            now as i64,
        ])
        .map_err(db_err)?;
    }
    Ok(())
}

/// Values of one item keyed by property slug.
fn values_by_slug(conn: &Connection, item_id: &str) -> Result<BTreeMap<String, PropertyValue>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {} FROM database_values v \
             JOIN database_properties p ON p.id = v.property_id \
             WHERE v.item_id = ?1",
            VALUE_COLUMNS
        ))
        .map_err(db_err)?;

    let values = stmt
        .query_map(params![item_id], row_to_value)
        .map_err(db_err)?
        .map(|r| r.map(|(value, slug)| (slug, value)))
        .collect::<std::result::Result<BTreeMap<_, _>, _>>()
        .map_err(db_err)?;

    Ok(values)
}

// Item operations

/// Create the backing page, the item and its values.
pub(crate) fn insert_item(
    conn: &Connection,
    database_id: &str,
    item: &NewItem,
    now: u64,
) -> Result<Item> {
    require_database(conn, database_id)?;
    let properties = list_properties(conn, database_id)?;

    let page = insert_page(conn, &item.page, now)?;
    let values = resolve_values(database_id, &properties, &item.values)?;

    let id = new_id();
    conn.execute(
        "INSERT INTO database_items (id, database_id, page_id, position, is_archived, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![id, database_id, page.id, item.position, false, now as i64, now as i64],
    )
    .map_err(db_err)?;
    insert_values(conn, &id, &values, now)?;

    debug!(
        "Created item {} in database {} with {} values",
        id,
        database_id,
        values.len()
    );

    load_item(conn, &id)?.ok_or_else(|| NotebaseError::internal("item vanished after insert"))
}

pub(crate) fn load_item(conn: &Connection, id: &str) -> Result<Option<Item>> {
    let item = conn
        .query_row(&item_query("WHERE i.id = ?1"), params![id], row_to_item)
        .optional()
        .map_err(db_err)?;

    let Some(mut item) = item else {
        return Ok(None);
    };
    item.properties = values_by_slug(conn, id)?;
    Ok(Some(item))
}

fn require_item(conn: &Connection, id: &str) -> Result<Item> {
    load_item(conn, id)?.ok_or_else(|| NotebaseError::ItemNotFound { id: id.to_string() })
}

/// Items of a database by position, then creation.
pub(crate) fn list_items(
    conn: &Connection,
    database_id: &str,
    include_archived: bool,
) -> Result<Vec<Item>> {
    let filter = if include_archived {
        "WHERE i.database_id = ?1 ORDER BY i.position, i.created_at, i.rowid"
    } else {
        "WHERE i.database_id = ?1 AND i.is_archived = 0 ORDER BY i.position, i.created_at, i.rowid"
    };

    let mut stmt = conn.prepare(&item_query(filter)).map_err(db_err)?;
    let mut items = stmt
        .query_map(params![database_id], row_to_item)
        .map_err(db_err)?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(db_err)?;

    // One pass over every value of the database, grouped per item.
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {} FROM database_values v \
             JOIN database_properties p ON p.id = v.property_id \
             JOIN database_items i ON i.id = v.item_id \
             WHERE i.database_id = ?1",
            VALUE_COLUMNS
        ))
        .map_err(db_err)?;
    let mut grouped: HashMap<String, BTreeMap<String, PropertyValue>> = HashMap::new();
    let rows = stmt
        .query_map(params![database_id], row_to_value)
        .map_err(db_err)?;
    for row in rows {
        let (value, slug) = row.map_err(db_err)?;
        grouped
            .entry(value.item_id.clone())
            .or_default()
            .insert(slug, value);
    }

    for item in &mut items {
        if let Some(values) = grouped.remove(&item.id) {
            item.properties = values;
        }
    }

    Ok(items)
}

/// Apply a partial update; a present value map replaces all values.
pub(crate) fn update_item(
    conn: &Connection,
    id: &str,
    update: &ItemUpdate,
    now: u64,
) -> Result<Item> {
    let item = require_item(conn, id)?;

    if let Some(title) = &update.title {
        if title.trim().is_empty() {
            return Err(NotebaseError::invalid_argument("page title must not be empty"));
        }
        conn.execute(
            "UPDATE pages SET title = ?2, updated_at = ?3 WHERE id = ?1",
            params![item.page.id, title, now as i64],
        )
        .map_err(db_err)?;
    }

    if let Some(values) = &update.values {
        let properties = list_properties(conn, &item.database_id)?;
        let resolved = resolve_values(&item.database_id, &properties, values)?;
        conn.execute("DELETE FROM database_values WHERE item_id = ?1", params![id])
            .map_err(db_err)?;
        insert_values(conn, id, &resolved, now)?;
    }

    conn.execute(
        "UPDATE database_items SET position = ?2, is_archived = ?3, updated_at = ?4 WHERE id = ?1",
        params![
            id,
            update.position.unwrap_or(item.position),
            update.is_archived.unwrap_or(item.is_archived),
            now as i64,
        ],
    )
    .map_err(db_err)?;

    debug!("Updated item {}", id);
    require_item(conn, id)
}

/// Delete an item by deleting its page; the item and values cascade.
pub(crate) fn delete_item(conn: &Connection, id: &str) -> Result<()> {
    let page_id: Option<String> = conn
        .query_row(
            "SELECT page_id FROM database_items WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )
        .optional()
        .map_err(db_err)?;

    let Some(page_id) = page_id else {
        return Err(NotebaseError::ItemNotFound { id: id.to_string() });
    };

    conn.execute("DELETE FROM pages WHERE id = ?1", params![page_id])
        .map_err(db_err)?;

    debug!("Deleted item {}", id);
    Ok(())
}

// Value operations

/// A null written to a required property takes its default, or fails.
fn required_fallback(property: &Property, value: &Value) -> Result<Value> {
    if !value.is_null() || !property.is_required {
        return Ok(value.clone());
    }
    if property.default_value.is_null() {
        return Err(NotebaseError::MissingRequiredProperty {
            slug: property.slug.clone(),
        });
    }
    Ok(property.default_value.clone())
}

/// Upsert the value of one property of an item.
pub(crate) fn set_value(
    conn: &Connection,
    item_id: &str,
    property_ref: &str,
    value: &Value,
    now: u64,
) -> Result<PropertyValue> {
    let database_id: String = conn
        .query_row(
            "SELECT database_id FROM database_items WHERE id = ?1",
            params![item_id],
            |row| row.get(0),
        )
        .optional()
        .map_err(db_err)?
        .ok_or_else(|| NotebaseError::ItemNotFound {
            id: item_id.to_string(),
        })?;

    let properties = list_properties(conn, &database_id)?;
    let property = find_property(&properties, property_ref).ok_or_else(|| {
        NotebaseError::UnknownProperty {
            database_id: database_id.clone(),
            key: property_ref.to_string(),
        }
    })?;
    let value = required_fallback(property, value)?;

    conn.execute(
        r#"
        INSERT INTO database_values (id, item_id, property_id, value, is_computed, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
        ON CONFLICT (item_id, property_id) DO UPDATE SET
            value = excluded.value,
            is_computed = excluded.is_computed,
            updated_at = excluded.updated_at
        "#,
        params![
            new_id(),
            item_id,
            property.id,
            to_json(&value)?,
            property.property_type.is_computed(),
            now as i64,
        ],
    )
    .map_err(db_err)?;
    conn.execute(
        "UPDATE database_items SET updated_at = ?2 WHERE id = ?1",
        params![item_id, now as i64],
    )
    .map_err(db_err)?;

    debug!("Set {} on item {}", property.slug, item_id);

    let (stored, _) = conn
        .query_row(
            &format!(
                "SELECT {} FROM database_values v \
                 JOIN database_properties p ON p.id = v.property_id \
                 WHERE v.item_id = ?1 AND v.property_id = ?2",
                VALUE_COLUMNS
            ),
            params![item_id, property.id],
            row_to_value,
        )
        .map_err(db_err)?;
    Ok(stored)
}

/// Stored values of an item keyed by property id.
pub(crate) fn get_values(conn: &Connection, item_id: &str) -> Result<BTreeMap<String, PropertyValue>> {
    let exists = conn
        .query_row(
            "SELECT 1 FROM database_items WHERE id = ?1",
            params![item_id],
            |_| Ok(()),
        )
        .optional()
        .map_err(db_err)?;
    if exists.is_none() {
        return Err(NotebaseError::ItemNotFound {
            id: item_id.to_string(),
        });
    }

    Ok(values_by_slug(conn, item_id)?
        .into_values()
        .map(|value| (value.property_id.clone(), value))
        .collect())
}

#[cfg(test)]
mod tests {
    use crate::SqliteStore;
    use notebase_core::{
        Database, ItemUpdate, NewDatabase, NewItem, NewProperty, PropertyType, Store,
    };
    use serde_json::{json, Value};

    async fn inventory(store: &SqliteStore) -> Database {
        store
            .create_database(NewDatabase {
                slug: "inventory".to_string(),
                title: "Inventory".to_string(),
                properties: vec![
                    NewProperty::new("Name", "name", PropertyType::Text),
                    NewProperty::new("Quantity", "qty", PropertyType::Number).with_order(1),
                    NewProperty::new("Total", "total", PropertyType::Formula).with_order(2),
                ],
                ..Default::default()
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_item_with_values() {
        let store = SqliteStore::open_memory().unwrap();
        let db = inventory(&store).await;

        let item = store
            .create_item(
                &db.id,
                NewItem::titled("Hammer")
                    .with_value("name", json!("Hammer"))
                    .with_value("qty", json!(2)),
            )
            .await
            .unwrap();

        assert_eq!(item.page.title, "Hammer");
        assert_eq!(item.properties["name"].value, json!("Hammer"));
        assert_eq!(item.properties["qty"].value, json!(2));
        assert!(!item.properties.contains_key("total"));

        let listed = store.list_items(&db.id, false).await.unwrap();
        assert_eq!(listed, vec![item.clone()]);
        assert_eq!(store.get_item(&item.id).await.unwrap().unwrap(), item);
    }

    #[tokio::test]
    async fn test_keys_by_id_and_computed_flag() {
        let store = SqliteStore::open_memory().unwrap();
        let db = inventory(&store).await;
        let total = db.property("total").unwrap();

        let item = store
            .create_item(
                &db.id,
                NewItem::titled("Saw").with_value(total.id.clone(), json!(10)),
            )
            .await
            .unwrap();

        let stored = &item.properties["total"];
        assert_eq!(stored.property_id, total.id);
        assert!(stored.is_computed);
    }

    #[tokio::test]
    async fn test_unknown_property_leaves_nothing() {
        let store = SqliteStore::open_memory().unwrap();
        let db = inventory(&store).await;

        let err = store
            .create_item(&db.id, NewItem::titled("Drill").with_value("color", json!("red")))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "UNKNOWN_PROPERTY");
        assert!(store.list_items(&db.id, true).await.unwrap().is_empty());
        assert!(store.list_pages().await.unwrap().is_empty());

        let err = store
            .create_item("missing", NewItem::titled("Drill"))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "DATABASE_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_required_and_default_values() {
        let store = SqliteStore::open_memory().unwrap();
        let db = store
            .create_database(NewDatabase {
                slug: "tasks".to_string(),
                title: "Tasks".to_string(),
                properties: vec![
                    NewProperty::new("Title", "title", PropertyType::Title).required(),
                    NewProperty::new("Status", "status", PropertyType::Select)
                        .with_default(json!({"name": "Todo"})),
                    NewProperty::new("Done", "done", PropertyType::Checkbox)
                        .required()
                        .with_default(json!(false)),
                ],
                ..Default::default()
            })
            .await
            .unwrap();

        let err = store
            .create_item(&db.id, NewItem::titled("No title"))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "MISSING_REQUIRED_PROPERTY");

        let item = store
            .create_item(&db.id, NewItem::titled("Write").with_value("title", json!("Write")))
            .await
            .unwrap();
        assert_eq!(item.properties["status"].value, json!({"name": "Todo"}));
        assert_eq!(item.properties["done"].value, json!(false));
    }

    #[tokio::test]
    async fn test_list_items_order_and_archive() {
        let store = SqliteStore::open_memory().unwrap();
        let db = inventory(&store).await;

        store
            .create_item(&db.id, NewItem::titled("Late").at(5))
            .await
            .unwrap();
        let first = store
            .create_item(&db.id, NewItem::titled("First").at(1))
            .await
            .unwrap();
        store
            .create_item(&db.id, NewItem::titled("Second").at(1))
            .await
            .unwrap();

        let titles = |items: Vec<notebase_core::Item>| {
            items.into_iter().map(|i| i.page.title).collect::<Vec<_>>()
        };
        assert_eq!(
            titles(store.list_items(&db.id, false).await.unwrap()),
            vec!["First", "Second", "Late"]
        );

        store
            .update_item(
                &first.id,
                ItemUpdate {
                    is_archived: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(
            titles(store.list_items(&db.id, false).await.unwrap()),
            vec!["Second", "Late"]
        );
        assert_eq!(store.list_items(&db.id, true).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_update_item_replaces_values() {
        let store = SqliteStore::open_memory().unwrap();
        let db = inventory(&store).await;
        let item = store
            .create_item(
                &db.id,
                NewItem::titled("Hammer")
                    .with_value("name", json!("Hammer"))
                    .with_value("qty", json!(2)),
            )
            .await
            .unwrap();

        let mut values = std::collections::BTreeMap::new();
        values.insert("qty".to_string(), json!(7));
        let updated = store
            .update_item(
                &item.id,
                ItemUpdate {
                    title: Some("Mallet".to_string()),
                    position: Some(3),
                    values: Some(values),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.page.title, "Mallet");
        assert_eq!(updated.position, 3);
        assert_eq!(updated.properties.len(), 1);
        assert_eq!(updated.properties["qty"].value, json!(7));

        let mut bad = std::collections::BTreeMap::new();
        bad.insert("ghost".to_string(), json!(1));
        let err = store
            .update_item(
                &item.id,
                ItemUpdate {
                    values: Some(bad),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "UNKNOWN_PROPERTY");
        assert_eq!(store.get_item(&item.id).await.unwrap().unwrap(), updated);
    }

    #[tokio::test]
    async fn test_set_and_get_values() {
        let store = SqliteStore::open_memory().unwrap();
        let db = inventory(&store).await;
        let item = store
            .create_item(&db.id, NewItem::titled("Hammer"))
            .await
            .unwrap();
        assert!(store.get_values(&item.id).await.unwrap().is_empty());

        let first = store.set_value(&item.id, "qty", json!(1)).await.unwrap();
        let second = store.set_value(&item.id, "qty", json!(4)).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.value, json!(4));
        assert_eq!(second.created_at, first.created_at);
        assert!(second.updated_at > first.updated_at);

        let values = store.get_values(&item.id).await.unwrap();
        let qty_id = &db.property("qty").unwrap().id;
        assert_eq!(values.len(), 1);
        assert_eq!(values[qty_id].value, json!(4));

        let err = store.set_value(&item.id, "ghost", json!(1)).await.unwrap_err();
        assert_eq!(err.error_code(), "UNKNOWN_PROPERTY");
        let err = store.set_value("missing", "qty", json!(1)).await.unwrap_err();
        assert_eq!(err.error_code(), "ITEM_NOT_FOUND");
        let err = store.get_values("missing").await.unwrap_err();
        assert_eq!(err.error_code(), "ITEM_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_set_null_on_required_property() {
        let store = SqliteStore::open_memory().unwrap();
        let db = store
            .create_database(NewDatabase {
                slug: "tasks".to_string(),
                title: "Tasks".to_string(),
                properties: vec![
                    NewProperty::new("Title", "title", PropertyType::Title).required(),
                    NewProperty::new("Done", "done", PropertyType::Checkbox)
                        .required()
                        .with_default(json!(false)),
                ],
                ..Default::default()
            })
            .await
            .unwrap();
        let item = store
            .create_item(&db.id, NewItem::titled("Write").with_value("title", json!("Write")))
            .await
            .unwrap();

        let err = store
            .set_value(&item.id, "title", Value::Null)
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "MISSING_REQUIRED_PROPERTY");
        let title_id = &db.property("title").unwrap().id;
        assert_eq!(
            store.get_values(&item.id).await.unwrap()[title_id].value,
            json!("Write")
        );

        store.set_value(&item.id, "done", json!(true)).await.unwrap();
        let reset = store.set_value(&item.id, "done", Value::Null).await.unwrap();
        assert_eq!(reset.value, json!(false));
    }

    #[tokio::test]
    async fn test_property_of_other_database_rejected() {
        let store = SqliteStore::open_memory().unwrap();
        let db = inventory(&store).await;
        let other = store
            .create_database(NewDatabase {
                slug: "other".to_string(),
                title: "Other".to_string(),
                properties: vec![NewProperty::new("Color", "color", PropertyType::Text)],
                ..Default::default()
            })
            .await
            .unwrap();
        let item = store
            .create_item(&db.id, NewItem::titled("Hammer"))
            .await
            .unwrap();

        let foreign = &other.properties[0].id;
        let err = store.set_value(&item.id, foreign, json!("red")).await.unwrap_err();
        assert_eq!(err.error_code(), "UNKNOWN_PROPERTY");
    }

    #[tokio::test]
    async fn test_delete_item_and_backing_page() {
        let store = SqliteStore::open_memory().unwrap();
        let db = inventory(&store).await;
        let item = store
            .create_item(&db.id, NewItem::titled("Hammer").with_value("qty", json!(1)))
            .await
            .unwrap();

        store.delete_item(&item.id).await.unwrap();
        assert!(store.get_item(&item.id).await.unwrap().is_none());
        assert!(store.get_page(&item.page.id).await.unwrap().is_none());

        let err = store.delete_item(&item.id).await.unwrap_err();
        assert_eq!(err.error_code(), "ITEM_NOT_FOUND");

        // Deleting the page directly removes the item as well
        let other = store
            .create_item(&db.id, NewItem::titled("Saw"))
            .await
            .unwrap();
        store.delete_page(&other.page.id).await.unwrap();
        assert!(store.get_item(&other.id).await.unwrap().is_none());
    }
}
