//! View resolution: joins schema, items and values for one saved view.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

use notebase_core::{DatabaseSnapshot, NotebaseError, ResolvedView, Result, Store};

use crate::transform::apply_view_transform;

/// Resolves saved views against live data.
///
/// Resolution only reads. Reordering and placeholder values exist in the
/// returned snapshot alone, so repeated calls on unchanged data return
/// identical results. Archived items are returned with their flag set;
/// hiding them is up to the caller.
pub struct ViewResolver<S> {
    /// Storage backend.
    store: Arc<S>,
}

impl<S> Clone for ViewResolver<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S> ViewResolver<S>
where
    S: Store + Send + Sync,
{
    /// Create a new resolver.
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Resolve a view of a database.
    ///
    /// An unknown database is `DatabaseNotFound`. A view that does not exist,
    /// or that belongs to another database, is `ViewNotFound`.
    pub async fn resolve(&self, database_id: &str, view_id: &str) -> Result<ResolvedView> {
        let start = Instant::now();

        let DatabaseSnapshot {
            database,
            mut items,
        } = self
            .store
            .get_database_snapshot(database_id)
            .await?
            .ok_or_else(|| NotebaseError::DatabaseNotFound {
                id: database_id.to_string(),
            })?;

        let view = database
            .view(view_id)
            .cloned()
            .ok_or_else(|| NotebaseError::view_not_found(database_id, view_id))?;
        debug!("Loaded {} items for view {}", items.len(), view_id);

        apply_view_transform(&database, &view, &mut items);

        info!(
            "Resolved {} view {} with {} items in {}ms",
            view.view_type,
            view.id,
            items.len(),
            start.elapsed().as_millis()
        );

        Ok(ResolvedView {
            database,
            view,
            items,
        })
    }

    /// Resolve the view embedded by a `database_view` block.
    pub async fn resolve_embedded(&self, block_id: &str) -> Result<ResolvedView> {
        if self.store.get_block(block_id).await?.is_none() {
            return Err(NotebaseError::BlockNotFound {
                id: block_id.to_string(),
            });
        }

        let view = self.store.get_block_view(block_id).await?.ok_or_else(|| {
            NotebaseError::invalid_argument(format!(
                "block {} does not embed a database view",
                block_id
            ))
        })?;

        self.resolve(&view.database_id, &view.id).await
    }
}
