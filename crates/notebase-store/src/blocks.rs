//! Block storage and link-graph maintenance.

use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use notebase_core::{new_id, Block, NewBlock, NotebaseError, Result, View};

use crate::databases::{row_to_view, VIEW_COLUMNS};
use crate::pages::{page_exists, require_page, touch_page};
use crate::sqlite::{db_err, enum_column, is_unique_violation, json_column, millis_column, to_json};

const BLOCK_COLUMNS: &str = "id, page_id, position, block_type, data, created_at, updated_at";

fn row_to_block(row: &rusqlite::Row<'_>) -> rusqlite::Result<Block> {
    Ok(Block {
        id: row.get(0)?,
        page_id: row.get(1)?,
        position: row.get(2)?,
        block_type: enum_column(row, 3)?,
        data: json_column(row, 4)?,
        created_at: millis_column(row, 5)?,
        updated_at: millis_column(row, 6)?,
    })
}

fn view_exists(conn: &Connection, view_id: &str) -> Result<bool> {
    conn.query_row(
        "SELECT 1 FROM database_views WHERE id = ?1",
        params![view_id],
        |_| Ok(()),
    )
    .optional()
    .map(|found| found.is_some())
    .map_err(db_err)
}

/// Replace the whole block list of a page and recompute its outgoing links.
///
/// Must run inside a transaction: the old blocks, edges and view
/// associations are deleted before the new ones are validated, so a
/// rejected batch relies on rollback to restore them.
pub(crate) fn replace_blocks(
    conn: &Connection,
    page_id: &str,
    blocks: &[NewBlock],
    now: u64,
) -> Result<Vec<Block>> {
    require_page(conn, page_id)?;

    conn.execute(
        "DELETE FROM page_links WHERE source_page_id = ?1",
        params![page_id],
    )
    .map_err(db_err)?;
    conn.execute(
        "DELETE FROM block_views WHERE block_id IN (SELECT id FROM blocks WHERE page_id = ?1)",
        params![page_id],
    )
    .map_err(db_err)?;
    conn.execute("DELETE FROM blocks WHERE page_id = ?1", params![page_id])
        .map_err(db_err)?;

    let mut insert_block = conn
        .prepare(&format!(
            "INSERT INTO blocks ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            BLOCK_COLUMNS
        ))
        .map_err(db_err)?;
    let mut insert_link = conn
        .prepare(
            "INSERT OR IGNORE INTO page_links (source_page_id, target_page_id, created_at) \
             VALUES (?1, ?2, ?3)",
        )
        .map_err(db_err)?;
    let mut insert_view = conn
        .prepare("INSERT INTO block_views (block_id, view_id) VALUES (?1, ?2)")
        .map_err(db_err)?;

    let mut persisted = Vec::with_capacity(blocks.len());
    let mut link_count = 0usize;

    for (index, block) in blocks.iter().enumerate() {
        let id = block
            .id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(new_id);
        let position = u32::try_from(index)
            .map_err(|_| NotebaseError::invalid_argument("too many blocks"))?;

        insert_block
            .execute(params![
                id,
                page_id,
                position,
                block.block_type.as_str(),
                to_json(&block.data)?,
                now as i64,
                now as i64,
            ])
            .map_err(|e| {
                if is_unique_violation(&e) {
                    NotebaseError::conflict(format!("block id '{}' already exists", id))
                } else {
                    db_err(e)
                }
            })?;

        for target in block.link_targets() {
            if !page_exists(conn, target)? {
                return Err(NotebaseError::UnknownPage {
                    id: target.to_string(),
                });
            }
            link_count += insert_link
                .execute(params![page_id, target, now as i64])
                .map_err(db_err)?;
        }

        if let Some(view_id) = block.embedded_view() {
            if !view_exists(conn, view_id)? {
                return Err(NotebaseError::UnknownView {
                    id: view_id.to_string(),
                });
            }
            insert_view.execute(params![id, view_id]).map_err(db_err)?;
        }

        persisted.push(Block {
            id,
            page_id: page_id.to_string(),
            position,
            block_type: block.block_type,
            data: block.data.clone(),
            created_at: now,
            updated_at: now,
        });
    }

    touch_page(conn, page_id, now)?;

    debug!(
        "Replaced blocks of page {}: {} blocks, {} links",
        page_id,
        persisted.len(),
        link_count
    );
    Ok(persisted)
}

/// Blocks of a page by position.
pub(crate) fn list_blocks(conn: &Connection, page_id: &str) -> Result<Vec<Block>> {
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {} FROM blocks WHERE page_id = ?1 ORDER BY position",
            BLOCK_COLUMNS
        ))
        .map_err(db_err)?;

    let blocks = stmt
        .query_map(params![page_id], row_to_block)
        .map_err(db_err)?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(db_err)?;

    Ok(blocks)
}

pub(crate) fn get_block(conn: &Connection, id: &str) -> Result<Option<Block>> {
    conn.query_row(
        &format!("SELECT {} FROM blocks WHERE id = ?1", BLOCK_COLUMNS),
        params![id],
        row_to_block,
    )
    .optional()
    .map_err(db_err)
}

/// The view embedded by a block, if the block carries an association.
pub(crate) fn get_block_view(conn: &Connection, block_id: &str) -> Result<Option<View>> {
    conn.query_row(
        &format!(
            "SELECT {} FROM database_views \
             WHERE id = (SELECT view_id FROM block_views WHERE block_id = ?1)",
            VIEW_COLUMNS
        ),
        params![block_id],
        row_to_view,
    )
    .optional()
    .map_err(db_err)
}

#[cfg(test)]
mod tests {
    use crate::SqliteStore;
    use notebase_core::{
        BlockType, JsonObject, NewBlock, NewDatabase, NewPage, NewView, Store, ViewType,
    };
    use serde_json::{json, Value};

    fn data(value: Value) -> JsonObject {
        value.as_object().cloned().unwrap()
    }

    fn markdown_linking(targets: &[&str]) -> NewBlock {
        NewBlock::new(
            BlockType::Markdown,
            data(json!({"text": "see also", "linked_page_ids": targets})),
        )
    }

    fn page_link(target: &str) -> NewBlock {
        NewBlock::new(BlockType::PageLink, data(json!({"target_page_id": target})))
    }

    #[tokio::test]
    async fn test_duplicate_edges_collapse() {
        let store = SqliteStore::open_memory().unwrap();
        let home = store.create_page(NewPage::titled("Home")).await.unwrap();
        let recipes = store.create_page(NewPage::titled("Recipes")).await.unwrap();

        let blocks = store
            .replace_blocks(
                &home.id,
                vec![markdown_linking(&[&recipes.id]), page_link(&recipes.id)],
            )
            .await
            .unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].position, 0);
        assert_eq!(blocks[1].position, 1);

        let backlinks = store.list_backlinks(&recipes.id).await.unwrap();
        assert_eq!(backlinks.len(), 1);
        assert_eq!(backlinks[0].id, home.id);
    }

    #[tokio::test]
    async fn test_replace_drops_stale_links() {
        let store = SqliteStore::open_memory().unwrap();
        let home = store.create_page(NewPage::titled("Home")).await.unwrap();
        let a = store.create_page(NewPage::titled("A")).await.unwrap();
        let b = store.create_page(NewPage::titled("B")).await.unwrap();

        store
            .replace_blocks(&home.id, vec![page_link(&a.id)])
            .await
            .unwrap();
        assert_eq!(store.list_backlinks(&a.id).await.unwrap().len(), 1);

        store
            .replace_blocks(&home.id, vec![page_link(&b.id)])
            .await
            .unwrap();
        assert!(store.list_backlinks(&a.id).await.unwrap().is_empty());
        assert_eq!(store.list_backlinks(&b.id).await.unwrap().len(), 1);

        let stored = store.list_blocks(&home.id).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].block_type, BlockType::PageLink);
    }

    #[tokio::test]
    async fn test_unknown_target_rolls_back() {
        let store = SqliteStore::open_memory().unwrap();
        let home = store.create_page(NewPage::titled("Home")).await.unwrap();
        let a = store.create_page(NewPage::titled("A")).await.unwrap();

        let original = store
            .replace_blocks(&home.id, vec![page_link(&a.id)])
            .await
            .unwrap();

        let err = store
            .replace_blocks(
                &home.id,
                vec![markdown_linking(&[]), page_link("no-such-page")],
            )
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "UNKNOWN_PAGE");

        // The previous block set and its edge are intact.
        assert_eq!(store.list_blocks(&home.id).await.unwrap(), original);
        assert_eq!(store.list_backlinks(&a.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_explicit_block_ids_kept() {
        let store = SqliteStore::open_memory().unwrap();
        let home = store.create_page(NewPage::titled("Home")).await.unwrap();

        let mut block = NewBlock::new(BlockType::Heading, data(json!({"text": "Intro"})));
        block.id = Some("intro".to_string());
        let blocks = store
            .replace_blocks(&home.id, vec![block.clone()])
            .await
            .unwrap();
        assert_eq!(blocks[0].id, "intro");

        // Re-submitting the same id on the same page is fine
        store
            .replace_blocks(&home.id, vec![block.clone()])
            .await
            .unwrap();

        // Duplicates inside one batch are not
        let err = store
            .replace_blocks(&home.id, vec![block.clone(), block])
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "CONFLICT");
        assert_eq!(store.list_blocks(&home.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_replace_touches_page() {
        let store = SqliteStore::open_memory().unwrap();
        let home = store.create_page(NewPage::titled("Home")).await.unwrap();
        store.replace_blocks(&home.id, vec![]).await.unwrap();

        let touched = store.get_page(&home.id).await.unwrap().unwrap();
        assert!(touched.updated_at > home.updated_at);
    }

    #[tokio::test]
    async fn test_embedded_view_association() {
        let store = SqliteStore::open_memory().unwrap();
        let home = store.create_page(NewPage::titled("Home")).await.unwrap();
        let db = store
            .create_database(NewDatabase {
                slug: "reading".to_string(),
                title: "Reading list".to_string(),
                views: vec![NewView::new("All", ViewType::Table)],
                ..Default::default()
            })
            .await
            .unwrap();
        let view_id = db.views[0].id.clone();

        let blocks = store
            .replace_blocks(
                &home.id,
                vec![NewBlock::new(
                    BlockType::DatabaseView,
                    data(json!({"view_id": view_id})),
                )],
            )
            .await
            .unwrap();

        let view = store.get_block_view(&blocks[0].id).await.unwrap().unwrap();
        assert_eq!(view.id, view_id);
        assert_eq!(view.database_id, db.id);

        let err = store
            .replace_blocks(
                &home.id,
                vec![NewBlock::new(
                    BlockType::DatabaseView,
                    data(json!({"view_id": "gone"})),
                )],
            )
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "UNKNOWN_VIEW");
    }

    #[tokio::test]
    async fn test_delete_source_removes_edges() {
        let store = SqliteStore::open_memory().unwrap();
        let home = store.create_page(NewPage::titled("Home")).await.unwrap();
        let a = store.create_page(NewPage::titled("A")).await.unwrap();

        store
            .replace_blocks(&a.id, vec![page_link(&home.id)])
            .await
            .unwrap();
        assert_eq!(store.list_backlinks(&home.id).await.unwrap().len(), 1);

        store.delete_page(&a.id).await.unwrap();
        assert!(store.list_backlinks(&home.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_target_removes_edges() {
        let store = SqliteStore::open_memory().unwrap();
        let home = store.create_page(NewPage::titled("Home")).await.unwrap();
        let recipes = store.create_page(NewPage::titled("Recipes")).await.unwrap();
        let other = store.create_page(NewPage::titled("Other")).await.unwrap();

        store
            .replace_blocks(
                &home.id,
                vec![page_link(&recipes.id), markdown_linking(&[&other.id])],
            )
            .await
            .unwrap();

        let outgoing = |store: &SqliteStore| {
            store.with_conn(|conn| {
                let mut stmt = conn
                    .prepare(
                        "SELECT target_page_id FROM page_links \
                         WHERE source_page_id = ?1 ORDER BY target_page_id",
                    )
                    .unwrap();
                let targets = stmt
                    .query_map([&home.id], |row| row.get::<_, String>(0))
                    .unwrap()
                    .collect::<Result<Vec<_>, _>>()
                    .unwrap();
                Ok(targets)
            })
        };
        assert_eq!(outgoing(&store).unwrap().len(), 2);

        store.delete_page(&recipes.id).await.unwrap();

        assert_eq!(outgoing(&store).unwrap(), vec![other.id.clone()]);
        assert_eq!(store.list_blocks(&home.id).await.unwrap().len(), 2);
        assert_eq!(
            store.list_backlinks(&other.id).await.unwrap()[0].id,
            home.id
        );
    }

    #[tokio::test]
    async fn test_page_document() {
        let store = SqliteStore::open_memory().unwrap();
        let home = store.create_page(NewPage::titled("Home")).await.unwrap();
        let notes = store.create_page(NewPage::titled("Notes")).await.unwrap();
        store
            .replace_blocks(&notes.id, vec![page_link(&home.id)])
            .await
            .unwrap();
        store
            .replace_blocks(&home.id, vec![markdown_linking(&[])])
            .await
            .unwrap();

        let doc = store.get_page_document(&home.id).await.unwrap().unwrap();
        assert_eq!(doc.page.id, home.id);
        assert_eq!(doc.blocks.len(), 1);
        assert_eq!(doc.backlinks.len(), 1);
        assert_eq!(doc.backlinks[0].id, notes.id);

        assert!(store.get_page_document("missing").await.unwrap().is_none());
    }
}
