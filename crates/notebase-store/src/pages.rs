//! Page rows, the parent tree, and backlink reads.

use std::collections::HashSet;

use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use notebase_core::{new_id, NewPage, NotebaseError, Page, PageUpdate, Result};

use crate::sqlite::{db_err, is_unique_violation, json_column, millis_column, to_json};

pub(crate) const PAGE_COLUMNS: &str = "id, slug, title, summary, content, parent_page_id, icon, \
     cover_image_id, tags, is_archived, created_at, updated_at";

/// Convert a row to a Page, reading columns starting at `offset`.
pub(crate) fn page_at(row: &rusqlite::Row<'_>, offset: usize) -> rusqlite::Result<Page> {
    Ok(Page {
        id: row.get(offset)?,
        slug: row.get(offset + 1)?,
        title: row.get(offset + 2)?,
        summary: row.get(offset + 3)?,
        content: row.get(offset + 4)?,
        parent_page_id: row.get(offset + 5)?,
        icon: row.get(offset + 6)?,
        cover_image_id: row.get(offset + 7)?,
        tags: json_column(row, offset + 8)?,
        is_archived: row.get(offset + 9)?,
        created_at: millis_column(row, offset + 10)?,
        updated_at: millis_column(row, offset + 11)?,
    })
}

fn row_to_page(row: &rusqlite::Row<'_>) -> rusqlite::Result<Page> {
    page_at(row, 0)
}

fn require_title(title: &str) -> Result<()> {
    if title.trim().is_empty() {
        return Err(NotebaseError::invalid_argument("page title must not be empty"));
    }
    Ok(())
}

/// Blank slugs are stored as NULL so they never collide.
fn normalize_slug(slug: Option<&String>) -> Option<String> {
    slug.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

fn slug_conflict(e: rusqlite::Error, slug: Option<&str>) -> NotebaseError {
    if is_unique_violation(&e) {
        NotebaseError::conflict(format!(
            "page slug '{}' already exists",
            slug.unwrap_or_default()
        ))
    } else {
        db_err(e)
    }
}

pub(crate) fn page_exists(conn: &Connection, id: &str) -> Result<bool> {
    conn.query_row("SELECT 1 FROM pages WHERE id = ?1", params![id], |_| Ok(()))
        .optional()
        .map(|found| found.is_some())
        .map_err(db_err)
}

pub(crate) fn insert_page(conn: &Connection, page: &NewPage, now: u64) -> Result<Page> {
    require_title(&page.title)?;

    if let Some(parent) = page.parent_page_id.as_deref() {
        if !page_exists(conn, parent)? {
            return Err(NotebaseError::UnknownPage {
                id: parent.to_string(),
            });
        }
    }

    let created = Page {
        id: new_id(),
        slug: normalize_slug(page.slug.as_ref()),
        title: page.title.clone(),
        summary: page.summary.clone(),
        content: page.content.clone(),
        parent_page_id: page.parent_page_id.clone(),
        icon: page.icon.clone(),
        cover_image_id: page.cover_image_id.clone(),
        tags: page.tags.clone(),
        is_archived: false,
        created_at: now,
        updated_at: now,
    };

    conn.execute(
        &format!(
            "INSERT INTO pages ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            PAGE_COLUMNS
        ),
        params![
            created.id,
            created.slug,
            created.title,
            created.summary,
            created.content,
            created.parent_page_id,
            created.icon,
            created.cover_image_id,
            to_json(&created.tags)?,
            created.is_archived,
            now as i64,
            now as i64,
        ],
    )
    .map_err(|e| slug_conflict(e, created.slug.as_deref()))?;

    debug!("Created page: {}", created.id);
    Ok(created)
}

pub(crate) fn get_page(conn: &Connection, id: &str) -> Result<Option<Page>> {
    conn.query_row(
        &format!("SELECT {} FROM pages WHERE id = ?1", PAGE_COLUMNS),
        params![id],
        row_to_page,
    )
    .optional()
    .map_err(db_err)
}

pub(crate) fn require_page(conn: &Connection, id: &str) -> Result<Page> {
    get_page(conn, id)?.ok_or_else(|| NotebaseError::PageNotFound { id: id.to_string() })
}

fn query_pages(conn: &Connection, sql: &str, param: Option<&str>) -> Result<Vec<Page>> {
    let mut stmt = conn.prepare(sql).map_err(db_err)?;
    let rows = match param {
        Some(p) => stmt.query_map(params![p], row_to_page),
        None => stmt.query_map([], row_to_page),
    }
    .map_err(db_err)?;

    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(db_err)
}

/// All pages, most recently updated first.
pub(crate) fn list_pages(conn: &Connection) -> Result<Vec<Page>> {
    query_pages(
        conn,
        &format!(
            "SELECT {} FROM pages ORDER BY updated_at DESC, rowid DESC",
            PAGE_COLUMNS
        ),
        None,
    )
}

/// Direct children in creation order.
pub(crate) fn list_child_pages(conn: &Connection, parent_id: &str) -> Result<Vec<Page>> {
    require_page(conn, parent_id)?;
    query_pages(
        conn,
        &format!(
            "SELECT {} FROM pages WHERE parent_page_id = ?1 ORDER BY created_at, rowid",
            PAGE_COLUMNS
        ),
        Some(parent_id),
    )
}

/// Pages whose blocks link to `page_id`, most recently updated first.
pub(crate) fn list_backlinks(conn: &Connection, page_id: &str) -> Result<Vec<Page>> {
    query_pages(
        conn,
        &format!(
            r#"
            SELECT {} FROM pages
            WHERE id IN (SELECT source_page_id FROM page_links WHERE target_page_id = ?1)
            ORDER BY updated_at DESC, rowid DESC
            "#,
            PAGE_COLUMNS
        ),
        Some(page_id),
    )
}

/// Reject a parent assignment that would put `page_id` in its own ancestry.
fn check_parent(conn: &Connection, page_id: &str, parent_id: &str) -> Result<()> {
    if parent_id == page_id {
        return Err(NotebaseError::invalid_argument(
            "a page cannot be its own parent",
        ));
    }
    if !page_exists(conn, parent_id)? {
        return Err(NotebaseError::UnknownPage {
            id: parent_id.to_string(),
        });
    }

    let mut seen = HashSet::new();
    let mut cursor = Some(parent_id.to_string());
    while let Some(current) = cursor {
        if current == page_id {
            return Err(NotebaseError::invalid_argument(format!(
                "page {} is an ancestor of {}",
                page_id, parent_id
            )));
        }
        if !seen.insert(current.clone()) {
            break;
        }
        cursor = conn
            .query_row(
                "SELECT parent_page_id FROM pages WHERE id = ?1",
                params![current],
                |row| row.get::<_, Option<String>>(0),
            )
            .optional()
            .map_err(db_err)?
            .flatten();
    }
    Ok(())
}

pub(crate) fn update_page(
    conn: &Connection,
    id: &str,
    update: &PageUpdate,
    now: u64,
) -> Result<Page> {
    let mut page = require_page(conn, id)?;

    if let Some(title) = &update.title {
        require_title(title)?;
        page.title = title.clone();
    }
    if let Some(summary) = &update.summary {
        page.summary = Some(summary.clone());
    }
    if let Some(content) = &update.content {
        page.content = content.clone();
    }
    if let Some(icon) = &update.icon {
        page.icon = Some(icon.clone());
    }
    if let Some(tags) = &update.tags {
        page.tags = tags.clone();
    }
    if let Some(parent) = &update.parent_page_id {
        if let Some(parent_id) = parent.as_deref() {
            check_parent(conn, id, parent_id)?;
        }
        page.parent_page_id = parent.clone();
    }
    if let Some(archived) = update.is_archived {
        page.is_archived = archived;
    }
    page.updated_at = now;

    conn.execute(
        r#"
        UPDATE pages
        SET title = ?2, summary = ?3, content = ?4, parent_page_id = ?5, icon = ?6,
            tags = ?7, is_archived = ?8, updated_at = ?9
        WHERE id = ?1
        "#,
        params![
            page.id,
            page.title,
            page.summary,
            page.content,
            page.parent_page_id,
            page.icon,
            to_json(&page.tags)?,
            page.is_archived,
            now as i64,
        ],
    )
    .map_err(db_err)?;

    debug!("Updated page: {}", id);
    Ok(page)
}

pub(crate) fn touch_page(conn: &Connection, id: &str, now: u64) -> Result<()> {
    conn.execute(
        "UPDATE pages SET updated_at = ?2 WHERE id = ?1",
        params![id, now as i64],
    )
    .map_err(db_err)?;
    Ok(())
}

/// Delete a page. Blocks, link edges in both directions, block-view
/// associations and a backing item cascade; children become root pages.
pub(crate) fn delete_page(conn: &Connection, id: &str) -> Result<()> {
    let deleted = conn
        .execute("DELETE FROM pages WHERE id = ?1", params![id])
        .map_err(db_err)?;

    if deleted == 0 {
        return Err(NotebaseError::PageNotFound { id: id.to_string() });
    }

    debug!("Deleted page: {}", id);
    Ok(())
}
