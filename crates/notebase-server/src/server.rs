//! HTTP server: shared state, routing and the serve loop.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{error, info};

use notebase_core::{now_millis, NotebaseConfig, NotebaseError, Result, Store};
use notebase_store::SqliteStore;
use notebase_view::ViewResolver;

use crate::error::{ApiError, ApiResult, Envelope};
use crate::{databases, pages};

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<SqliteStore>,
    pub resolver: ViewResolver<SqliteStore>,
    /// Effective configuration, served read-only.
    pub config: Arc<NotebaseConfig>,
}

impl AppState {
    pub fn new(store: Arc<SqliteStore>, config: NotebaseConfig) -> Self {
        let resolver = ViewResolver::new(Arc::clone(&store));
        Self {
            store,
            resolver,
            config: Arc::new(config),
        }
    }
}

/// Build the API router with tracing and a per-request deadline.
pub fn router(state: AppState, request_timeout: Duration) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/config", get(config_snapshot))
        .merge(pages::routes())
        .merge(databases::routes())
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(request_timeout))
        .layer(middleware::map_response(wrap_timeout))
        .with_state(state)
}

/// Storage that does not answer a ping makes the service unavailable.
fn unavailable(err: NotebaseError) -> ApiError {
    error!("Health check failed: {}", err);
    ApiError::new(
        StatusCode::SERVICE_UNAVAILABLE,
        "SERVICE_UNAVAILABLE",
        "storage unavailable",
    )
}

async fn health(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    state.store.ping().await.map_err(unavailable)?;
    Ok(Envelope::ok(json!({ "status": "ok", "time": now_millis() })))
}

async fn config_snapshot(State(state): State<AppState>) -> impl IntoResponse {
    Envelope::ok(state.config.as_ref().clone())
}

/// The timeout layer answers with an empty 408; give it the envelope.
async fn wrap_timeout(response: Response) -> Response {
    if response.status() != StatusCode::REQUEST_TIMEOUT {
        return response;
    }
    ApiError::new(
        StatusCode::REQUEST_TIMEOUT,
        "REQUEST_TIMEOUT",
        "request timed out",
    )
    .into_response()
}

/// Notebase HTTP server.
pub struct NotebaseServer {
    state: AppState,
}

impl NotebaseServer {
    /// Create a server backed by the configured database file.
    pub fn new(config: &NotebaseConfig) -> Result<Self> {
        info!(
            "Initializing notebase server with database at {:?}",
            config.database.path
        );
        let store = SqliteStore::open_with_config(&config.database)?;
        Ok(Self {
            state: AppState::new(Arc::new(store), config.clone()),
        })
    }

    /// Create a server with an in-memory database.
    pub fn new_memory() -> Result<Self> {
        info!("Initializing notebase server with in-memory database");
        let store = SqliteStore::open_memory()?;
        Ok(Self {
            state: AppState::new(Arc::new(store), NotebaseConfig::default()),
        })
    }

    /// The router this server serves.
    pub fn router(&self) -> Router {
        router(
            self.state.clone(),
            Duration::from_secs(self.state.config.server.request_timeout_secs),
        )
    }

    /// Bind the configured address and serve until Ctrl-C.
    pub async fn serve(self) -> Result<()> {
        let listener = TcpListener::bind(&self.state.config.server.bind_address).await?;
        info!("Listening on http://{}", listener.local_addr()?);

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("Server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown signal received");
    }
}
