//! notebase-core - Core types and traits for the notebase workspace
//!
//! This crate provides the domain model (pages, blocks, databases, properties,
//! views, items, values), the error taxonomy, configuration, and the storage
//! trait shared by every other notebase crate.

pub mod clock;
pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use clock::{now_millis, MonotonicClock};
pub use config::*;
pub use error::{ErrorKind, NotebaseError, Result};
pub use traits::*;
pub use types::*;
