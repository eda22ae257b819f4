//! # boardsync-board
//!
//! Board Client: paginated item reads and mutation-based writes against the
//! external board service.
//!
//! Only this crate knows the vendor wire format. [`HttpBoardClient`] speaks
//! the service's GraphQL API, [`webhook`] decodes inbound notification
//! bodies, and [`MemoryBoard`] is an in-process board with the same contract.

pub mod error;
pub mod http;
pub mod memory;
pub mod webhook;
mod wire;

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use boardsync_core::{BoardId, BoardItem, ColumnId, Cursor, ExternalId};

pub use error::{BoardError, DecodeError};
pub use http::HttpBoardClient;
pub use memory::MemoryBoard;
pub use webhook::{BoardEvent, EventKind, WebhookPayload};

/// One page of board items.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BoardPage {
    pub items: Vec<BoardItem>,
    /// Continuation token; `None` means the walk is complete.
    pub next_cursor: Option<Cursor>,
}

/// A write against the board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    CreateItem {
        board: BoardId,
        name: String,
        values: BTreeMap<ColumnId, String>,
    },
    UpdateItem {
        board: BoardId,
        item: ExternalId,
        /// New item name, when it changed.
        name: Option<String>,
        values: BTreeMap<ColumnId, String>,
    },
    DeleteItem {
        item: ExternalId,
    },
}

impl Mutation {
    /// Short description used in logs and failure reports.
    pub fn describe(&self) -> String {
        match self {
            Mutation::CreateItem { name, .. } => format!("create '{name}'"),
            Mutation::UpdateItem { item, .. } => format!("update item {item}"),
            Mutation::DeleteItem { item } => format!("delete item {item}"),
        }
    }
}

/// A single GraphQL error entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphQlError {
    pub message: String,
}

/// Raw mutation result: `data` plus any `errors` the service reported.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MutationResponse {
    pub data: serde_json::Value,
    pub errors: Vec<GraphQlError>,
}

impl MutationResponse {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn error_messages(&self) -> Vec<String> {
        self.errors.iter().map(|e| e.message.clone()).collect()
    }

    /// Item id assigned by a `create_item` mutation.
    pub fn created_item_id(&self) -> Option<ExternalId> {
        let id = self.data.get("create_item")?.get("id")?;
        match id {
            serde_json::Value::String(s) => Some(ExternalId(s.clone())),
            serde_json::Value::Number(n) => Some(ExternalId(n.to_string())),
            _ => None,
        }
    }
}

/// Paginated reads and mutation writes against the board service.
#[async_trait]
pub trait BoardClient: Send + Sync {
    /// Fetch one page. `cursor = None` requests the first page.
    async fn fetch_page(
        &self,
        board: &BoardId,
        cursor: Option<&Cursor>,
    ) -> Result<BoardPage, BoardError>;

    /// Submit one mutation. A non-empty `errors` list in the response is a
    /// failure the caller must check; transport problems are `Err`.
    async fn mutate(&self, mutation: &Mutation) -> Result<MutationResponse, BoardError>;
}

impl fmt::Display for Mutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}
