use std::path::PathBuf;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use boardsync_board::BoardError;
use boardsync_store::StoreError;
use boardsync_sync::SyncError;

/// Error surface for the HTTP server and its background tasks.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unknown area '{0}'")]
    UnknownArea(String),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("board client error: {0}")]
    Board(#[from] BoardError),

    #[error("invalid CORS origin '{0}'")]
    InvalidOrigin(String),

    #[error("channel closed: {0}")]
    ChannelClosed(&'static str),

    #[error("{task} task join failure: {reason}")]
    Join { task: &'static str, reason: String },

    #[error("signal handler failed: {0}")]
    Signal(String),
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::UnknownArea(_) | ServerError::Sync(SyncError::UnknownArea(_)) => {
                StatusCode::NOT_FOUND
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ServerError {
    ServerError::Io {
        path: path.into(),
        source,
    }
}
