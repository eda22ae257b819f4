//! Error types for boardsync-board.

use thiserror::Error;

/// Failures talking to the board service.
#[derive(Debug, Error)]
pub enum BoardError {
    /// Transport failure (connect, timeout, TLS, body read).
    #[error("board request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success status with a body that is not a GraphQL response.
    #[error("board service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The response did not have the expected shape.
    #[error("malformed board response: {0}")]
    Malformed(String),

    /// The board service answered with GraphQL errors.
    #[error("board service rejected the request: {}", .0.join("; "))]
    Rejected(Vec<String>),

    /// The API token environment variable is unset or empty.
    #[error("board API token not set (expected in ${env})")]
    MissingToken { env: String },
}

/// Errors decoding an inbound webhook body.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("webhook body is not JSON: {0}")]
    NotJson(String),

    #[error("webhook body has neither 'challenge' nor 'event'")]
    UnknownShape,

    #[error("webhook event has no 'type'")]
    MissingType,
}
