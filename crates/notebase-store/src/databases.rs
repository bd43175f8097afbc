//! Databases, their property schema, and saved view definitions.

use std::collections::HashSet;

use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use notebase_core::{
    new_id, Database, NewDatabase, NewProperty, NewView, NotebaseError, Property, Result, View,
};

use crate::sqlite::{db_err, enum_column, is_unique_violation, json_column, millis_column, to_json};

const DATABASE_COLUMNS: &str =
    "id, slug, title, description, icon, cover_image_id, is_archived, created_at, updated_at";

const PROPERTY_COLUMNS: &str = "id, database_id, name, slug, property_type, config, is_required, \
     default_value, order_index, created_at, updated_at";

pub(crate) const VIEW_COLUMNS: &str = "id, database_id, name, view_type, filters, sorts, grouping, \
     display_properties, layout_options, created_at, updated_at";

/// Convert a row to a Database without its schema.
fn row_to_database(row: &rusqlite::Row<'_>) -> rusqlite::Result<Database> {
    Ok(Database {
        id: row.get(0)?,
        slug: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        icon: row.get(4)?,
        cover_image_id: row.get(5)?,
        is_archived: row.get(6)?,
        created_at: millis_column(row, 7)?,
        updated_at: millis_column(row, 8)?,
        properties: Vec::new(),
        views: Vec::new(),
    })
}

fn row_to_property(row: &rusqlite::Row<'_>) -> rusqlite::Result<Property> {
    Ok(Property {
        id: row.get(0)?,
        database_id: row.get(1)?,
        name: row.get(2)?,
        slug: row.get(3)?,
        property_type: enum_column(row, 4)?,
        config: json_column(row, 5)?,
        is_required: row.get(6)?,
        default_value: json_column(row, 7)?,
        order_index: row.get(8)?,
        created_at: millis_column(row, 9)?,
        updated_at: millis_column(row, 10)?,
    })
}

pub(crate) fn row_to_view(row: &rusqlite::Row<'_>) -> rusqlite::Result<View> {
    Ok(View {
        id: row.get(0)?,
        database_id: row.get(1)?,
        name: row.get(2)?,
        view_type: enum_column(row, 3)?,
        filters: json_column(row, 4)?,
        sorts: json_column(row, 5)?,
        grouping: json_column(row, 6)?,
        display_properties: json_column(row, 7)?,
        layout_options: json_column(row, 8)?,
        created_at: millis_column(row, 9)?,
        updated_at: millis_column(row, 10)?,
    })
}

fn require_text(value: &str, what: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(NotebaseError::invalid_argument(format!(
            "{} must not be empty",
            what
        )));
    }
    Ok(())
}

/// Check every view reference against a property list.
fn validate_view(database_id: &str, properties: &[Property], view: &NewView) -> Result<()> {
    require_text(&view.name, "view name")?;

    for reference in view.property_refs() {
        let known = properties
            .iter()
            .any(|p| p.id == reference || p.slug == reference);
        if !known {
            return Err(NotebaseError::UnknownProperty {
                database_id: database_id.to_string(),
                key: reference.to_string(),
            });
        }
    }
    Ok(())
}

fn validate_property(property: &NewProperty) -> Result<()> {
    require_text(&property.name, "property name")?;
    require_text(&property.slug, "property slug")
}

pub(crate) fn require_database(conn: &Connection, id: &str) -> Result<()> {
    let found = conn
        .query_row("SELECT 1 FROM databases WHERE id = ?1", params![id], |_| Ok(()))
        .optional()
        .map_err(db_err)?;

    match found {
        Some(()) => Ok(()),
        None => Err(NotebaseError::DatabaseNotFound { id: id.to_string() }),
    }
}

fn touch_database(conn: &Connection, id: &str, now: u64) -> Result<()> {
    conn.execute(
        "UPDATE databases SET updated_at = ?2 WHERE id = ?1",
        params![id, now as i64],
    )
    .map_err(db_err)?;
    Ok(())
}

// Property operations

/// Properties by `order_index`, ties in creation order.
pub(crate) fn list_properties(conn: &Connection, database_id: &str) -> Result<Vec<Property>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {} FROM database_properties WHERE database_id = ?1 \
             ORDER BY order_index, created_at, rowid",
            PROPERTY_COLUMNS
        ))
        .map_err(db_err)?;

    let properties = stmt
        .query_map(params![database_id], row_to_property)
        .map_err(db_err)?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(db_err)?;

    Ok(properties)
}

fn insert_property(
    conn: &Connection,
    database_id: &str,
    property: &NewProperty,
    now: u64,
) -> Result<Property> {
    validate_property(property)?;

    let created = Property {
        id: new_id(),
        database_id: database_id.to_string(),
        name: property.name.clone(),
        slug: property.slug.clone(),
        property_type: property.property_type,
        config: property.config.clone(),
        is_required: property.is_required,
        default_value: property.default_value.clone(),
        order_index: property.order_index,
        created_at: now,
        updated_at: now,
    };

    conn.execute(
        &format!(
            "INSERT INTO database_properties ({}) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            PROPERTY_COLUMNS
        ),
        params![
            created.id,
            created.database_id,
            created.name,
            created.slug,
            created.property_type.as_str(),
            to_json(&created.config)?,
            created.is_required,
            to_json(&created.default_value)?,
            created.order_index,
            now as i64,
            now as i64,
        ],
    )
    .map_err(|e| {
        if is_unique_violation(&e) {
            NotebaseError::conflict(format!(
                "property slug '{}' already exists in database {}",
                created.slug, database_id
            ))
        } else {
            db_err(e)
        }
    })?;

    debug!("Defined property {} ({})", created.slug, created.property_type);
    Ok(created)
}

/// Add a property to an existing database.
pub(crate) fn define_property(
    conn: &Connection,
    database_id: &str,
    property: &NewProperty,
    now: u64,
) -> Result<Property> {
    require_database(conn, database_id)?;
    let created = insert_property(conn, database_id, property, now)?;
    touch_database(conn, database_id, now)?;
    Ok(created)
}

// View operations

/// Views of a database in creation order.
pub(crate) fn list_views(conn: &Connection, database_id: &str) -> Result<Vec<View>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {} FROM database_views WHERE database_id = ?1 ORDER BY created_at, rowid",
            VIEW_COLUMNS
        ))
        .map_err(db_err)?;

    let views = stmt
        .query_map(params![database_id], row_to_view)
        .map_err(db_err)?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(db_err)?;

    Ok(views)
}

fn insert_view(conn: &Connection, database_id: &str, view: &NewView, now: u64) -> Result<View> {
    let created = View {
        id: new_id(),
        database_id: database_id.to_string(),
        name: view.name.clone(),
        view_type: view.view_type,
        filters: view.filters.clone(),
        sorts: view.sorts.clone(),
        grouping: view.grouping.clone(),
        display_properties: view.display_properties.clone(),
        layout_options: view.layout_options.clone(),
        created_at: now,
        updated_at: now,
    };

    conn.execute(
        &format!(
            "INSERT INTO database_views ({}) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            VIEW_COLUMNS
        ),
        params![
            created.id,
            created.database_id,
            created.name,
            created.view_type.as_str(),
            to_json(&created.filters)?,
            to_json(&created.sorts)?,
            to_json(&created.grouping)?,
            to_json(&created.display_properties)?,
            to_json(&created.layout_options)?,
            now as i64,
            now as i64,
        ],
    )
    .map_err(db_err)?;

    debug!("Created {} view {}", created.view_type, created.id);
    Ok(created)
}

pub(crate) fn create_view(
    conn: &Connection,
    database_id: &str,
    view: &NewView,
    now: u64,
) -> Result<View> {
    require_database(conn, database_id)?;
    let properties = list_properties(conn, database_id)?;
    validate_view(database_id, &properties, view)?;
    insert_view(conn, database_id, view, now)
}

/// A view of the given database; views of other databases are absent.
pub(crate) fn get_view(conn: &Connection, database_id: &str, view_id: &str) -> Result<Option<View>> {
    conn.query_row(
        &format!(
            "SELECT {} FROM database_views WHERE id = ?1 AND database_id = ?2",
            VIEW_COLUMNS
        ),
        params![view_id, database_id],
        row_to_view,
    )
    .optional()
    .map_err(db_err)
}

/// Replace a view's whole configuration.
pub(crate) fn update_view(
    conn: &Connection,
    database_id: &str,
    view_id: &str,
    view: &NewView,
    now: u64,
) -> Result<View> {
    require_database(conn, database_id)?;
    let existing = get_view(conn, database_id, view_id)?
        .ok_or_else(|| NotebaseError::view_not_found(database_id, view_id))?;

    let properties = list_properties(conn, database_id)?;
    validate_view(database_id, &properties, view)?;

    let updated = View {
        id: existing.id,
        database_id: existing.database_id,
        name: view.name.clone(),
        view_type: view.view_type,
        filters: view.filters.clone(),
        sorts: view.sorts.clone(),
        grouping: view.grouping.clone(),
        display_properties: view.display_properties.clone(),
        layout_options: view.layout_options.clone(),
        created_at: existing.created_at,
        updated_at: now,
    };

    conn.execute(
        r#"
        UPDATE database_views
        SET name = ?2, view_type = ?3, filters = ?4, sorts = ?5, grouping = ?6,
            display_properties = ?7, layout_options = ?8, updated_at = ?9
        WHERE id = ?1
        "#,
        params![
            updated.id,
            updated.name,
            updated.view_type.as_str(),
            to_json(&updated.filters)?,
            to_json(&updated.sorts)?,
            to_json(&updated.grouping)?,
            to_json(&updated.display_properties)?,
            to_json(&updated.layout_options)?,
            now as i64,
        ],
    )
    .map_err(db_err)?;

    debug!("Updated view {}", view_id);
    Ok(updated)
}

/// Delete a view; blocks embedding it lose their association.
pub(crate) fn delete_view(conn: &Connection, database_id: &str, view_id: &str) -> Result<()> {
    require_database(conn, database_id)?;
    let deleted = conn
        .execute(
            "DELETE FROM database_views WHERE id = ?1 AND database_id = ?2",
            params![view_id, database_id],
        )
        .map_err(db_err)?;

    if deleted == 0 {
        return Err(NotebaseError::view_not_found(database_id, view_id));
    }

    debug!("Deleted view {}", view_id);
    Ok(())
}

// Database operations

/// Create a database with its initial properties and views.
pub(crate) fn insert_database(conn: &Connection, database: &NewDatabase, now: u64) -> Result<Database> {
    require_text(&database.slug, "database slug")?;
    require_text(&database.title, "database title")?;

    let mut slugs = HashSet::new();
    for property in &database.properties {
        validate_property(property)?;
        if !slugs.insert(property.slug.as_str()) {
            return Err(NotebaseError::conflict(format!(
                "property slug '{}' appears more than once",
                property.slug
            )));
        }
    }

    let id = new_id();
    conn.execute(
        &format!(
            "INSERT INTO databases ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            DATABASE_COLUMNS
        ),
        params![
            id,
            database.slug,
            database.title,
            database.description,
            database.icon,
            database.cover_image_id,
            false,
            now as i64,
            now as i64,
        ],
    )
    .map_err(|e| {
        if is_unique_violation(&e) {
            NotebaseError::conflict(format!("database slug '{}' already exists", database.slug))
        } else {
            db_err(e)
        }
    })?;

    for property in &database.properties {
        insert_property(conn, &id, property, now)?;
    }

    let properties = list_properties(conn, &id)?;
    for view in &database.views {
        validate_view(&id, &properties, view)?;
        insert_view(conn, &id, view, now)?;
    }

    debug!(
        "Created database {} with {} properties and {} views",
        database.slug,
        database.properties.len(),
        database.views.len()
    );

    load_database(conn, &id)?.ok_or_else(|| NotebaseError::internal("database vanished after insert"))
}

/// Load a database with its properties and views.
pub(crate) fn load_database(conn: &Connection, id: &str) -> Result<Option<Database>> {
    let database = conn
        .query_row(
            &format!("SELECT {} FROM databases WHERE id = ?1", DATABASE_COLUMNS),
            params![id],
            row_to_database,
        )
        .optional()
        .map_err(db_err)?;

    let Some(mut database) = database else {
        return Ok(None);
    };
    database.properties = list_properties(conn, id)?;
    database.views = list_views(conn, id)?;
    Ok(Some(database))
}

/// All databases with their schema, most recently updated first.
pub(crate) fn list_databases(conn: &Connection) -> Result<Vec<Database>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {} FROM databases ORDER BY updated_at DESC, rowid DESC",
            DATABASE_COLUMNS
        ))
        .map_err(db_err)?;

    let mut databases = stmt
        .query_map([], row_to_database)
        .map_err(db_err)?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(db_err)?;

    for database in &mut databases {
        database.properties = list_properties(conn, &database.id)?;
        database.views = list_views(conn, &database.id)?;
    }

    Ok(databases)
}

/// Delete a database together with its items' pages.
pub(crate) fn delete_database(conn: &Connection, id: &str) -> Result<()> {
    require_database(conn, id)?;

    let pages = conn
        .execute(
            "DELETE FROM pages WHERE id IN (SELECT page_id FROM database_items WHERE database_id = ?1)",
            params![id],
        )
        .map_err(db_err)?;
    conn.execute("DELETE FROM databases WHERE id = ?1", params![id])
        .map_err(db_err)?;

    debug!("Deleted database {} and {} item pages", id, pages);
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::SqliteStore;
    use notebase_core::{
        BlockType, JsonObject, NewBlock, NewDatabase, NewItem, NewPage, NewProperty, NewView,
        PropertyType, SortDirection, Store, ViewSort, ViewType,
    };
    use serde_json::json;

    fn inventory() -> NewDatabase {
        NewDatabase {
            slug: "inventory".to_string(),
            title: "Inventory".to_string(),
            description: Some("Tools on hand".to_string()),
            properties: vec![
                NewProperty::new("Quantity", "qty", PropertyType::Number).with_order(2),
                NewProperty::new("Name", "name", PropertyType::Text).with_order(1),
                NewProperty::new("Status", "status", PropertyType::Select).with_order(2),
            ],
            views: vec![
                NewView::new("All", ViewType::Table),
                NewView::new("Board", ViewType::Board),
            ],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_and_get_database() {
        let store = SqliteStore::open_memory().unwrap();
        let created = store.create_database(inventory()).await.unwrap();

        let slugs: Vec<_> = created.properties.iter().map(|p| p.slug.as_str()).collect();
        assert_eq!(slugs, vec!["name", "qty", "status"]);
        let views: Vec<_> = created.views.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(views, vec!["All", "Board"]);

        let fetched = store.get_database(&created.id).await.unwrap().unwrap();
        assert_eq!(fetched, created);
        assert_eq!(fetched.description.as_deref(), Some("Tools on hand"));

        assert!(store.get_database("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_slugs_rejected() {
        let store = SqliteStore::open_memory().unwrap();
        store.create_database(inventory()).await.unwrap();

        let err = store.create_database(inventory()).await.unwrap_err();
        assert_eq!(err.error_code(), "CONFLICT");

        let mut twice = inventory();
        twice.slug = "other".to_string();
        twice
            .properties
            .push(NewProperty::new("Qty again", "qty", PropertyType::Number));
        let err = store.create_database(twice).await.unwrap_err();
        assert_eq!(err.error_code(), "CONFLICT");

        assert_eq!(store.list_databases().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_define_property() {
        let store = SqliteStore::open_memory().unwrap();
        let db = store.create_database(inventory()).await.unwrap();

        let mut config = JsonObject::new();
        config.insert("options".to_string(), json!([{"name": "High"}]));
        let mut priority = NewProperty::new("Priority", "priority", PropertyType::Select).with_order(0);
        priority.config = config.clone();
        let created = store.define_property(&db.id, priority).await.unwrap();
        assert_eq!(created.config, config);

        let err = store
            .define_property(&db.id, NewProperty::new("Dup", "qty", PropertyType::Text))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "CONFLICT");

        let fetched = store.get_database(&db.id).await.unwrap().unwrap();
        assert_eq!(fetched.properties.len(), 4);
        assert_eq!(fetched.properties[0].slug, "priority");
        let qty = fetched.property("qty").unwrap();
        assert_eq!(qty.name, "Quantity");
        assert_eq!(qty.property_type, PropertyType::Number);

        let err = store
            .define_property("missing", NewProperty::new("X", "x", PropertyType::Text))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "DATABASE_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_view_lifecycle() {
        let store = SqliteStore::open_memory().unwrap();
        let db = store.create_database(inventory()).await.unwrap();

        let mut gallery = NewView::new("Covers", ViewType::Gallery);
        gallery
            .layout_options
            .insert("cover_property".to_string(), json!("status"));
        gallery.sorts.push(ViewSort {
            property_id: db.properties[1].id.clone(),
            direction: SortDirection::Desc,
        });
        gallery.filters.insert("anything".to_string(), json!({"goes": true}));

        let view = store.create_view(&db.id, gallery.clone()).await.unwrap();
        assert_eq!(
            store.get_view(&db.id, &view.id).await.unwrap().unwrap(),
            view
        );

        gallery.name = "Renamed".to_string();
        gallery.view_type = ViewType::List;
        let updated = store.update_view(&db.id, &view.id, gallery).await.unwrap();
        assert_eq!(updated.name, "Renamed");
        assert_eq!(updated.view_type, ViewType::List);
        assert_eq!(updated.created_at, view.created_at);

        store.delete_view(&db.id, &view.id).await.unwrap();
        assert!(store.get_view(&db.id, &view.id).await.unwrap().is_none());
        let err = store.delete_view(&db.id, &view.id).await.unwrap_err();
        assert_eq!(err.error_code(), "VIEW_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_view_with_dangling_reference_rejected() {
        let store = SqliteStore::open_memory().unwrap();
        let db = store.create_database(inventory()).await.unwrap();

        let mut view = NewView::new("Sorted", ViewType::Table);
        view.sorts.push(ViewSort {
            property_id: "nope".to_string(),
            direction: SortDirection::Asc,
        });
        let err = store.create_view(&db.id, view).await.unwrap_err();
        assert_eq!(err.error_code(), "UNKNOWN_PROPERTY");

        let mut board = NewView::new("Board", ViewType::Board);
        board.grouping.insert("property".to_string(), json!("ghost"));
        let err = store
            .update_view(&db.id, &db.views[0].id, board)
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "UNKNOWN_PROPERTY");
    }

    #[tokio::test]
    async fn test_foreign_view_absent() {
        let store = SqliteStore::open_memory().unwrap();
        let first = store.create_database(inventory()).await.unwrap();
        let mut other = inventory();
        other.slug = "other".to_string();
        let second = store.create_database(other).await.unwrap();

        let foreign = &second.views[0].id;
        assert!(store.get_view(&first.id, foreign).await.unwrap().is_none());
        let err = store.delete_view(&first.id, foreign).await.unwrap_err();
        assert_eq!(err.error_code(), "VIEW_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_delete_database_cascades() {
        let store = SqliteStore::open_memory().unwrap();
        let db = store.create_database(inventory()).await.unwrap();
        let item = store
            .create_item(&db.id, NewItem::titled("Hammer").with_value("qty", json!(2)))
            .await
            .unwrap();

        let home = store.create_page(NewPage::titled("Home")).await.unwrap();
        let blocks = store
            .replace_blocks(
                &home.id,
                vec![NewBlock::new(
                    BlockType::DatabaseView,
                    json!({"view_id": db.views[0].id}).as_object().cloned().unwrap(),
                )],
            )
            .await
            .unwrap();

        store.delete_database(&db.id).await.unwrap();

        assert!(store.get_database(&db.id).await.unwrap().is_none());
        assert!(store.get_item(&item.id).await.unwrap().is_none());
        assert!(store.get_page(&item.page.id).await.unwrap().is_none());
        assert!(store.get_block_view(&blocks[0].id).await.unwrap().is_none());
        // The embedding page and its block survive.
        assert_eq!(store.list_blocks(&home.id).await.unwrap().len(), 1);

        let err = store.delete_database(&db.id).await.unwrap_err();
        assert_eq!(err.error_code(), "DATABASE_NOT_FOUND");
    }
}
