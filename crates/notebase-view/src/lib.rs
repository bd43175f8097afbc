//! notebase-view - View resolution
//!
//! This crate turns a saved view definition into a read-only snapshot of a
//! database: schema, live items in position order, and the view-type
//! specific presentation transforms.
//!
//! # Features
//!
//! - Ownership check of the view against its database
//! - Board views ordered by the label of their grouping property
//! - Gallery views padded with transient cover placeholders
//! - Resolution of views embedded in page blocks
//!
//! # Example
//!
//! ```rust,ignore
//! use notebase_view::ViewResolver;
//! use std::sync::Arc;
//!
//! let resolver = ViewResolver::new(Arc::new(store));
//! let resolved = resolver.resolve(&database_id, &view_id).await?;
//! ```

mod resolver;
mod transform;

pub use resolver::ViewResolver;
pub use transform::{
    apply_view_transform, cover_placeholder, group_label, pad_cover_values, sort_by_group_label,
};

// Re-export for convenience
pub use notebase_core::ResolvedView;
