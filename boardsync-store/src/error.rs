//! Error types for boardsync-store.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The database file could not be opened.
    #[error("cannot open store at {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// The bootstrap schema failed to apply.
    #[error("schema bootstrap failed: {0}")]
    Schema(#[source] rusqlite::Error),

    /// The operation name is not in the catalog.
    #[error("unknown store operation '{0}'")]
    UnknownOperation(String),

    /// The operation itself failed.
    #[error("store operation '{operation}' failed: {source}")]
    Query {
        operation: String,
        #[source]
        source: rusqlite::Error,
    },

    /// A previous holder of the connection panicked.
    #[error("store connection lock poisoned")]
    Poisoned,

    /// The blocking worker did not complete.
    #[error("store task failed: {0}")]
    Task(String),
}

pub(crate) fn query_err(operation: &str, source: rusqlite::Error) -> StoreError {
    StoreError::Query {
        operation: operation.to_string(),
        source,
    }
}
