//! Database, schema, view and item endpoints.
//!
//! - `GET|POST /api/databases`
//! - `GET|DELETE /api/databases/:id`
//! - `POST /api/databases/:id/properties`
//! - `POST /api/databases/:id/views`
//! - `GET|PUT|DELETE /api/databases/:id/views/:view_id`
//! - `GET /api/databases/:id/views/:view_id/items`
//! - `GET|POST /api/databases/:id/items`
//! - `GET|PATCH|DELETE /api/databases/:id/items/:item_id`
//! - `PUT /api/databases/:id/items/:item_id/values/:property`

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use notebase_core::{
    Item, ItemUpdate, NewDatabase, NewItem, NewProperty, NewView, NotebaseError, Store,
};

use crate::error::{ApiResult, Envelope};
use crate::server::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ListItemsQuery {
    #[serde(default)]
    pub include_archived: bool,
}

/// Body of a single value write.
#[derive(Debug, Serialize, Deserialize)]
pub struct SetValueRequest {
    pub value: Value,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/databases", get(list_databases).post(create_database))
        .route(
            "/api/databases/:id",
            get(get_database).delete(delete_database),
        )
        .route("/api/databases/:id/properties", post(define_property))
        .route("/api/databases/:id/views", post(create_view))
        .route(
            "/api/databases/:id/views/:view_id",
            get(get_view).put(update_view).delete(delete_view),
        )
        .route("/api/databases/:id/views/:view_id/items", get(resolve_view))
        .route(
            "/api/databases/:id/items",
            get(list_items).post(create_item),
        )
        .route(
            "/api/databases/:id/items/:item_id",
            get(get_item).patch(update_item).delete(delete_item),
        )
        .route(
            "/api/databases/:id/items/:item_id/values/:property",
            put(set_value),
        )
}

// Databases

async fn list_databases(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    Ok(Envelope::ok(state.store.list_databases().await?))
}

async fn create_database(
    State(state): State<AppState>,
    payload: Result<Json<NewDatabase>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(database) = payload?;
    let created = state.store.create_database(database).await?;
    Ok((StatusCode::CREATED, Envelope::ok(created)))
}

async fn get_database(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let database = state
        .store
        .get_database(&id)
        .await?
        .ok_or(NotebaseError::DatabaseNotFound { id })?;
    Ok(Envelope::ok(database))
}

async fn delete_database(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    state.store.delete_database(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn define_property(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<NewProperty>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(property) = payload?;
    let created = state.store.define_property(&id, property).await?;
    Ok((StatusCode::CREATED, Envelope::ok(created)))
}

// Views

async fn create_view(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<NewView>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(view) = payload?;
    let created = state.store.create_view(&id, view).await?;
    Ok((StatusCode::CREATED, Envelope::ok(created)))
}

async fn get_view(
    State(state): State<AppState>,
    Path((id, view_id)): Path<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    let view = state
        .store
        .get_view(&id, &view_id)
        .await?
        .ok_or_else(|| NotebaseError::view_not_found(&id, &view_id))?;
    Ok(Envelope::ok(view))
}

async fn update_view(
    State(state): State<AppState>,
    Path((id, view_id)): Path<(String, String)>,
    payload: Result<Json<NewView>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(view) = payload?;
    Ok(Envelope::ok(state.store.update_view(&id, &view_id, view).await?))
}

async fn delete_view(
    State(state): State<AppState>,
    Path((id, view_id)): Path<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    state.store.delete_view(&id, &view_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn resolve_view(
    State(state): State<AppState>,
    Path((id, view_id)): Path<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    Ok(Envelope::ok(state.resolver.resolve(&id, &view_id).await?))
}

// Items

/// An item addressed through a database it does not belong to is absent.
async fn scoped_item(state: &AppState, database_id: &str, item_id: &str) -> ApiResult<Item> {
    match state.store.get_item(item_id).await? {
        Some(item) if item.database_id == database_id => Ok(item),
        _ => Err(NotebaseError::ItemNotFound {
            id: item_id.to_string(),
        }
        .into()),
    }
}

async fn list_items(
    State(state): State<AppState>,
    Path(id): Path<String>,
    query: Result<Query<ListItemsQuery>, QueryRejection>,
) -> ApiResult<impl IntoResponse> {
    let Query(query) = query?;
    Ok(Envelope::ok(
        state.store.list_items(&id, query.include_archived).await?,
    ))
}

async fn create_item(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<NewItem>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(item) = payload?;
    let created = state.store.create_item(&id, item).await?;
    Ok((StatusCode::CREATED, Envelope::ok(created)))
}

async fn get_item(
    State(state): State<AppState>,
    Path((id, item_id)): Path<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    Ok(Envelope::ok(scoped_item(&state, &id, &item_id).await?))
}

async fn update_item(
    State(state): State<AppState>,
    Path((id, item_id)): Path<(String, String)>,
    payload: Result<Json<ItemUpdate>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(update) = payload?;
    scoped_item(&state, &id, &item_id).await?;
    Ok(Envelope::ok(state.store.update_item(&item_id, update).await?))
}

async fn delete_item(
    State(state): State<AppState>,
    Path((id, item_id)): Path<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    scoped_item(&state, &id, &item_id).await?;
    state.store.delete_item(&item_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn set_value(
    State(state): State<AppState>,
    Path((id, item_id, property)): Path<(String, String, String)>,
    payload: Result<Json<SetValueRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(request) = payload?;
    scoped_item(&state, &id, &item_id).await?;
    Ok(Envelope::ok(
        state
            .store
            .set_value(&item_id, &property, request.value)
            .await?,
    ))
}
