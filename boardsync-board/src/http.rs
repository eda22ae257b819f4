//! GraphQL-over-HTTP board client.

use std::collections::BTreeMap;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use boardsync_core::{BoardConfig, BoardId, ColumnId, Cursor};

use crate::wire::{BoardsData, Envelope, NextPageData};
use crate::{BoardClient, BoardError, BoardPage, Mutation, MutationResponse};

const ITEM_FIELDS: &str = "cursor items { id name column_values { id text } }";

/// Board client for the vendor's GraphQL endpoint.
#[derive(Debug, Clone)]
pub struct HttpBoardClient {
    client: Client,
    api_url: String,
    token: String,
    page_size: u32,
}

impl HttpBoardClient {
    /// Build a client, reading the token from `config.api_token_env`.
    pub fn new(config: &BoardConfig) -> Result<Self, BoardError> {
        let token = config.api_token().ok_or_else(|| BoardError::MissingToken {
            env: config.api_token_env.clone(),
        })?;
        Self::with_token(config, token)
    }

    pub fn with_token(config: &BoardConfig, token: impl Into<String>) -> Result<Self, BoardError> {
        let client = Client::builder().timeout(config.timeout()).build()?;
        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            token: token.into(),
            page_size: config.page_size.max(1),
        })
    }

    async fn post(&self, query: &str, variables: Value) -> Result<(u16, String), BoardError> {
        let response = self
            .client
            .post(&self.api_url)
            .header(reqwest::header::AUTHORIZATION, &self.token)
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok((status, body))
    }
}

#[async_trait]
impl BoardClient for HttpBoardClient {
    async fn fetch_page(
        &self,
        board: &BoardId,
        cursor: Option<&Cursor>,
    ) -> Result<BoardPage, BoardError> {
        let (status, body) = match cursor {
            None => {
                let query = format!(
                    "query ($board: [ID!], $limit: Int!) {{ boards(ids: $board) {{ \
                     items_page(limit: $limit) {{ {ITEM_FIELDS} }} }} }}"
                );
                self.post(&query, json!({ "board": [board.0], "limit": self.page_size }))
                    .await?
            }
            Some(cursor) => {
                let query = format!(
                    "query ($cursor: String!, $limit: Int!) {{ \
                     next_items_page(cursor: $cursor, limit: $limit) {{ {ITEM_FIELDS} }} }}"
                );
                self.post(&query, json!({ "cursor": cursor.0, "limit": self.page_size }))
                    .await?
            }
        };
        if !(200..300).contains(&status) {
            return Err(BoardError::Status { status, body });
        }

        let malformed = |e: serde_json::Error| BoardError::Malformed(e.to_string());
        let page = match cursor {
            None => {
                let data = serde_json::from_str::<Envelope<BoardsData>>(&body)
                    .map_err(malformed)?
                    .into_data()?;
                data.boards
                    .into_iter()
                    .next()
                    .ok_or_else(|| BoardError::Malformed(format!("board {board} not found")))?
                    .items_page
            }
            Some(_) => {
                serde_json::from_str::<Envelope<NextPageData>>(&body)
                    .map_err(malformed)?
                    .into_data()?
                    .next_items_page
            }
        };
        let page = page.into_page();
        tracing::debug!(
            board = %board,
            items = page.items.len(),
            more = page.next_cursor.is_some(),
            "fetched board page"
        );
        Ok(page)
    }

    async fn mutate(&self, mutation: &Mutation) -> Result<MutationResponse, BoardError> {
        let (query, variables) = mutation_document(mutation);
        let (status, body) = self.post(query, variables).await?;

        // GraphQL errors may come back under any status; only an unparsable
        // non-success body is a transport-level failure.
        let success = (200..300).contains(&status);
        match serde_json::from_str::<Envelope<Value>>(&body) {
            Ok(envelope) if success || !envelope.errors.is_empty() => Ok(MutationResponse {
                data: envelope.data.unwrap_or(Value::Null),
                errors: envelope.errors,
            }),
            Err(e) if success => Err(BoardError::Malformed(e.to_string())),
            _ => Err(BoardError::Status { status, body }),
        }
    }
}

fn mutation_document(mutation: &Mutation) -> (&'static str, Value) {
    match mutation {
        Mutation::CreateItem {
            board,
            name,
            values,
        } => (
            "mutation ($board: ID!, $name: String!, $values: JSON) { \
             create_item(board_id: $board, item_name: $name, column_values: $values) { id } }",
            json!({ "board": board.0, "name": name, "values": encode_values(values, None) }),
        ),
        Mutation::UpdateItem {
            board,
            item,
            name,
            values,
        } => (
            "mutation ($board: ID!, $item: ID!, $values: JSON!) { \
             change_multiple_column_values(board_id: $board, item_id: $item, \
             column_values: $values) { id } }",
            json!({
                "board": board.0,
                "item": item.0,
                "values": encode_values(values, name.as_deref()),
            }),
        ),
        Mutation::DeleteItem { item } => (
            "mutation ($item: ID!) { delete_item(item_id: $item) { id } }",
            json!({ "item": item.0 }),
        ),
    }
}

/// Column values travel as a JSON-encoded string scalar.
fn encode_values(values: &BTreeMap<ColumnId, String>, name: Option<&str>) -> String {
    let mut object = serde_json::Map::new();
    if let Some(name) = name {
        object.insert("name".to_string(), Value::String(name.to_string()));
    }
    for (column, text) in values {
        object.insert(column.0.clone(), Value::String(text.clone()));
    }
    Value::Object(object).to_string()
}
