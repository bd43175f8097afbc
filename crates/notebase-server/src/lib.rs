//! notebase-server - HTTP API for notebase
//!
//! Exposes pages, blocks, backlinks, databases, schema, views and items as
//! a JSON API. Every response body is an envelope of the form
//! `{ "data": ..., "errors": [...] }`.
//!
//! # Routes
//!
//! - `GET /api/health` - Liveness and storage check
//! - `GET /api/config` - Effective configuration
//! - `/api/pages/...` - Pages, block replace, backlinks, children
//! - `/api/blocks/:id/view` - Resolve the view embedded in a block
//! - `/api/databases/...` - Databases, properties, views, items, values

mod databases;
mod error;
mod pages;
mod server;

pub use databases::{ListItemsQuery, SetValueRequest};
pub use error::{ApiError, ApiResult, Envelope, ErrorBody};
pub use pages::ReplaceBlocksRequest;
pub use server::{router, AppState, NotebaseServer};
