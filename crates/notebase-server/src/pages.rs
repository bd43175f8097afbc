//! Page, block and backlink endpoints.
//!
//! - `GET /api/pages` / `POST /api/pages`
//! - `GET|PATCH|DELETE /api/pages/:id`
//! - `PUT /api/pages/:id/blocks`
//! - `GET /api/pages/:id/backlinks`
//! - `GET /api/pages/:id/children`
//! - `GET /api/blocks/:id/view`

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, put},
    Router,
};
use serde::{Deserialize, Serialize};

use notebase_core::{NewBlock, NewPage, NotebaseError, PageUpdate, Store};

use crate::error::{ApiResult, Envelope};
use crate::server::AppState;

/// Body of a full block replace.
#[derive(Debug, Serialize, Deserialize)]
pub struct ReplaceBlocksRequest {
    pub blocks: Vec<NewBlock>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/pages", get(list_pages).post(create_page))
        .route(
            "/api/pages/:id",
            get(get_page).patch(update_page).delete(delete_page),
        )
        .route("/api/pages/:id/blocks", put(replace_blocks))
        .route("/api/pages/:id/backlinks", get(list_backlinks))
        .route("/api/pages/:id/children", get(list_children))
        .route("/api/blocks/:id/view", get(resolve_block_view))
}

async fn list_pages(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    Ok(Envelope::ok(state.store.list_pages().await?))
}

async fn create_page(
    State(state): State<AppState>,
    payload: Result<Json<NewPage>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(page) = payload?;
    let created = state.store.create_page(page).await?;
    Ok((StatusCode::CREATED, Envelope::ok(created)))
}

/// The page together with its blocks and backlinks.
async fn get_page(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let document = state
        .store
        .get_page_document(&id)
        .await?
        .ok_or(NotebaseError::PageNotFound { id })?;
    Ok(Envelope::ok(document))
}

async fn update_page(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<PageUpdate>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(update) = payload?;
    Ok(Envelope::ok(state.store.update_page(&id, update).await?))
}

async fn delete_page(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    state.store.delete_page(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn replace_blocks(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<ReplaceBlocksRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(request) = payload?;
    Ok(Envelope::ok(
        state.store.replace_blocks(&id, request.blocks).await?,
    ))
}

async fn list_backlinks(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(Envelope::ok(state.store.list_backlinks(&id).await?))
}

async fn list_children(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(Envelope::ok(state.store.list_child_pages(&id).await?))
}

async fn resolve_block_view(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    Ok(Envelope::ok(state.resolver.resolve_embedded(&id).await?))
}
