//! Error types for boardsync-sync.

use std::path::PathBuf;

use thiserror::Error;

use boardsync_board::{BoardError, DecodeError};
use boardsync_core::{BoardId, Cursor, MappingError};
use boardsync_store::StoreError;

/// Errors that end a reconciliation pass or a webhook request.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("unknown area '{0}'")]
    UnknownArea(String),

    /// A store row could not be read as a domain record.
    #[error("invalid record row from '{operation}': {reason}")]
    InvalidRow { operation: String, reason: String },

    /// An I/O error on the guard file, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization error (guard file).
    #[error("guard file JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A board snapshot could not be read completely.
#[derive(Debug, Error)]
#[error("fetching board {board} failed at cursor {}: {source}", cursor_label(.cursor))]
pub struct FetchError {
    pub board: BoardId,
    /// Cursor of the page that failed; `None` is the first page.
    pub cursor: Option<Cursor>,
    #[source]
    pub source: BoardError,
}

fn cursor_label(cursor: &Option<Cursor>) -> String {
    match cursor {
        Some(cursor) => cursor.to_string(),
        None => "<start>".to_string(),
    }
}

/// A single board mutation did not succeed.
#[derive(Debug, Error)]
pub enum MutationError {
    #[error(transparent)]
    Mapping(#[from] MappingError),

    #[error("board rejected mutation: {}", .0.join("; "))]
    Rejected(Vec<String>),

    #[error(transparent)]
    Transport(#[from] BoardError),

    /// The board write succeeded but the store link did not.
    #[error("linking record to board item failed: {0}")]
    Link(#[from] StoreError),
}

/// An inbound webhook that cannot be routed. Always a client error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassificationError {
    #[error(transparent)]
    Payload(#[from] DecodeError),

    #[error("unknown event type '{0}'")]
    UnknownEventKind(String),

    #[error("unknown field '{0}'")]
    UnknownField(String),

    #[error("field '{0}' is the join key and cannot be changed")]
    ImmutableField(String),

    #[error("event has no item id")]
    MissingItemId,

    #[error("event does not name a field")]
    MissingField,
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}
