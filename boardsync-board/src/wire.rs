//! Vendor GraphQL response shapes.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer};

use boardsync_core::{BoardItem, ColumnId, Cursor, ExternalId};

use crate::{BoardError, BoardPage, GraphQlError};

#[derive(Debug, Deserialize)]
pub(crate) struct Envelope<T> {
    pub data: Option<T>,
    #[serde(default)]
    pub errors: Vec<GraphQlError>,
}

impl<T> Envelope<T> {
    /// `data` when the service reported no errors.
    pub fn into_data(self) -> Result<T, BoardError> {
        if !self.errors.is_empty() {
            return Err(BoardError::Rejected(
                self.errors.into_iter().map(|e| e.message).collect(),
            ));
        }
        self.data
            .ok_or_else(|| BoardError::Malformed("response has no 'data'".to_string()))
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct BoardsData {
    pub boards: Vec<BoardNode>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct BoardNode {
    pub items_page: ItemsPage,
}

#[derive(Debug, Deserialize)]
pub(crate) struct NextPageData {
    pub next_items_page: ItemsPage,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ItemsPage {
    pub cursor: Option<String>,
    pub items: Vec<WireItem>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireItem {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub column_values: Vec<WireColumnValue>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireColumnValue {
    pub id: String,
    pub text: Option<String>,
}

impl ItemsPage {
    pub fn into_page(self) -> BoardPage {
        let items = self
            .items
            .into_iter()
            .map(|item| BoardItem {
                id: ExternalId(item.id),
                name: item.name,
                values: item
                    .column_values
                    .into_iter()
                    .map(|cv| (ColumnId(cv.id), cv.text.unwrap_or_default()))
                    .collect::<BTreeMap<_, _>>(),
            })
            .collect();
        BoardPage {
            items,
            next_cursor: self.cursor.filter(|c| !c.is_empty()).map(Cursor),
        }
    }
}

/// Item ids arrive as strings from current API versions and as numbers from
/// older ones.
fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {other}"
        ))),
    }
}
