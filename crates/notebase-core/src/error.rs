//! Error types for notebase.

use thiserror::Error;

/// Result type alias using NotebaseError.
pub type Result<T> = std::result::Result<T, NotebaseError>;

/// Broad class of an error, used by transports to pick a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The entity does not exist or belongs to a different parent.
    NotFound,
    /// The input is malformed or references something unknown.
    Validation,
    /// A uniqueness constraint would be violated.
    Conflict,
    /// Storage or serialization failure.
    Internal,
}

/// Errors that can occur in notebase.
#[derive(Error, Debug)]
pub enum NotebaseError {
    /// Page not found.
    #[error("Page not found: {id}")]
    PageNotFound { id: String },

    /// Database not found.
    #[error("Database not found: {id}")]
    DatabaseNotFound { id: String },

    /// View not found, or it belongs to another database.
    #[error("View not found: {view_id} in database {database_id}")]
    ViewNotFound {
        database_id: String,
        view_id: String,
    },

    /// Item not found.
    #[error("Item not found: {id}")]
    ItemNotFound { id: String },

    /// Block not found.
    #[error("Block not found: {id}")]
    BlockNotFound { id: String },

    /// Invalid argument provided.
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    /// A property key does not resolve within the target database.
    #[error("Unknown property '{key}' for database {database_id}")]
    UnknownProperty { database_id: String, key: String },

    /// A required property was given no value and has no default.
    #[error("Missing value for required property '{slug}'")]
    MissingRequiredProperty { slug: String },

    /// A block or parent reference names a page that does not exist.
    #[error("Unknown page reference: {id}")]
    UnknownPage { id: String },

    /// A block references a view that does not exist.
    #[error("Unknown view reference: {id}")]
    UnknownView { id: String },

    /// Uniqueness violation (duplicate slug).
    #[error("Conflict: {message}")]
    Conflict { message: String },

    /// Database error.
    #[error("Database error: {message}")]
    Database { message: String },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Internal error (unexpected).
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl NotebaseError {
    /// Create an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create a conflict error.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Create a database error.
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Create a view-not-found error.
    pub fn view_not_found(database_id: impl Into<String>, view_id: impl Into<String>) -> Self {
        Self::ViewNotFound {
            database_id: database_id.into(),
            view_id: view_id.into(),
        }
    }

    /// Classify the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::PageNotFound { .. }
            | Self::DatabaseNotFound { .. }
            | Self::ViewNotFound { .. }
            | Self::ItemNotFound { .. }
            | Self::BlockNotFound { .. } => ErrorKind::NotFound,
            Self::InvalidArgument { .. }
            | Self::UnknownProperty { .. }
            | Self::MissingRequiredProperty { .. }
            | Self::UnknownPage { .. }
            | Self::UnknownView { .. } => ErrorKind::Validation,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::Database { .. }
            | Self::Io(_)
            | Self::Serialization(_)
            | Self::Config { .. }
            | Self::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// Get the machine-readable error code.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::PageNotFound { .. } => "PAGE_NOT_FOUND",
            Self::DatabaseNotFound { .. } => "DATABASE_NOT_FOUND",
            Self::ViewNotFound { .. } => "VIEW_NOT_FOUND",
            Self::ItemNotFound { .. } => "ITEM_NOT_FOUND",
            Self::BlockNotFound { .. } => "BLOCK_NOT_FOUND",
            Self::InvalidArgument { .. } => "INVALID_ARGUMENT",
            Self::UnknownProperty { .. } => "UNKNOWN_PROPERTY",
            Self::MissingRequiredProperty { .. } => "MISSING_REQUIRED_PROPERTY",
            Self::UnknownPage { .. } => "UNKNOWN_PAGE",
            Self::UnknownView { .. } => "UNKNOWN_VIEW",
            Self::Conflict { .. } => "CONFLICT",
            Self::Database { .. } => "DATABASE_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Config { .. } => "CONFIG_ERROR",
            Self::Internal { .. } => "INTERNAL_ERROR",
        }
    }
}
