//! In-process board with the [`BoardClient`] contract.
//!
//! Items are kept per board in insertion order and paged with numeric
//! offset cursors. Failure injection hooks let callers exercise partial
//! failure and fetch errors without a network.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::Mutex;

use boardsync_core::{BoardId, BoardItem, Cursor, ExternalId};

use crate::{BoardClient, BoardError, BoardPage, GraphQlError, Mutation, MutationResponse};

#[derive(Debug, Default)]
struct State {
    boards: HashMap<BoardId, Vec<BoardItem>>,
    next_id: u64,
    /// Item names whose create/update is answered with a GraphQL error.
    reject_names: HashSet<String>,
    /// Item ids whose delete is answered with a GraphQL error.
    reject_items: HashSet<ExternalId>,
    /// Fetch at this cursor (`None` = first page) fails as malformed.
    broken_cursor: Option<Option<Cursor>>,
    mutations: Vec<Mutation>,
}

/// Shared handle to an in-memory board service.
#[derive(Debug, Clone)]
pub struct MemoryBoard {
    state: Arc<Mutex<State>>,
    page_size: usize,
}

impl Default for MemoryBoard {
    fn default() -> Self {
        Self::new(100)
    }
}

impl MemoryBoard {
    pub fn new(page_size: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                next_id: 1000,
                ..State::default()
            })),
            page_size: page_size.max(1),
        }
    }

    /// Place an item directly on a board, bypassing the mutation log.
    pub async fn seed(&self, board: &BoardId, item: BoardItem) {
        let mut state = self.state.lock().await;
        state.boards.entry(board.clone()).or_default().push(item);
    }

    pub async fn items(&self, board: &BoardId) -> Vec<BoardItem> {
        let state = self.state.lock().await;
        state.boards.get(board).cloned().unwrap_or_default()
    }

    /// Every mutation received, in arrival order.
    pub async fn mutations(&self) -> Vec<Mutation> {
        self.state.lock().await.mutations.clone()
    }

    pub async fn clear_mutations(&self) {
        self.state.lock().await.mutations.clear();
    }

    /// Answer creates and updates of items named `name` with an error.
    pub async fn reject_name(&self, name: &str) {
        self.state.lock().await.reject_names.insert(name.to_string());
    }

    /// Answer deletes of `item` with an error.
    pub async fn reject_item(&self, item: &ExternalId) {
        self.state.lock().await.reject_items.insert(item.clone());
    }

    /// Make the page fetched at `cursor` fail as malformed.
    pub async fn break_page(&self, cursor: Option<Cursor>) {
        self.state.lock().await.broken_cursor = Some(cursor);
    }
}

fn rejected(message: String) -> MutationResponse {
    MutationResponse {
        data: serde_json::Value::Null,
        errors: vec![GraphQlError { message }],
    }
}

#[async_trait]
impl BoardClient for MemoryBoard {
    async fn fetch_page(
        &self,
        board: &BoardId,
        cursor: Option<&Cursor>,
    ) -> Result<BoardPage, BoardError> {
        let state = self.state.lock().await;
        if state.broken_cursor.as_ref() == Some(&cursor.cloned()) {
            return Err(BoardError::Malformed("truncated page".to_string()));
        }

        let offset = match cursor {
            None => 0,
            Some(c) => c
                .0
                .parse::<usize>()
                .map_err(|_| BoardError::Malformed(format!("unknown cursor '{c}'")))?,
        };
        let items = state.boards.get(board).map(Vec::as_slice).unwrap_or_default();
        let end = (offset + self.page_size).min(items.len());
        let page = items.get(offset..end).unwrap_or_default().to_vec();
        let next_cursor = (end < items.len()).then(|| Cursor(end.to_string()));
        Ok(BoardPage {
            items: page,
            next_cursor,
        })
    }

    async fn mutate(&self, mutation: &Mutation) -> Result<MutationResponse, BoardError> {
        let mut state = self.state.lock().await;
        state.mutations.push(mutation.clone());

        match mutation {
            Mutation::CreateItem {
                board,
                name,
                values,
            } => {
                if state.reject_names.contains(name) {
                    return Ok(rejected(format!("create of '{name}' rejected")));
                }
                state.next_id += 1;
                let id = ExternalId(state.next_id.to_string());
                let item = BoardItem {
                    id: id.clone(),
                    name: name.clone(),
                    values: values.clone(),
                };
                state.boards.entry(board.clone()).or_default().push(item);
                Ok(MutationResponse {
                    data: json!({ "create_item": { "id": id.0 } }),
                    errors: Vec::new(),
                })
            }
            Mutation::UpdateItem {
                board,
                item,
                name,
                values,
            } => {
                let reject = state.reject_names.clone();
                let Some(existing) = state
                    .boards
                    .get_mut(board)
                    .and_then(|items| items.iter_mut().find(|i| &i.id == item))
                else {
                    return Ok(rejected(format!("item {item} not found")));
                };
                let renamed_to_rejected = name.as_ref().is_some_and(|n| reject.contains(n));
                if reject.contains(&existing.name) || renamed_to_rejected {
                    return Ok(rejected(format!("update of item {item} rejected")));
                }
                if let Some(name) = name {
                    existing.name = name.clone();
                }
                existing.values.extend(values.clone());
                Ok(MutationResponse {
                    data: json!({ "change_multiple_column_values": { "id": item.0 } }),
                    errors: Vec::new(),
                })
            }
            Mutation::DeleteItem { item } => {
                if state.reject_items.contains(item) {
                    return Ok(rejected(format!("delete of item {item} rejected")));
                }
                let mut found = false;
                for items in state.boards.values_mut() {
                    let before = items.len();
                    items.retain(|i| &i.id != item);
                    found |= items.len() != before;
                }
                if !found {
                    return Ok(rejected(format!("item {item} not found")));
                }
                Ok(MutationResponse {
                    data: json!({ "delete_item": { "id": item.0 } }),
                    errors: Vec::new(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use boardsync_core::ColumnId;
    use std::collections::BTreeMap;

    fn board() -> BoardId {
        BoardId::from("77")
    }

    #[tokio::test]
    async fn pages_follow_offset_cursors() {
        let memory = MemoryBoard::new(2);
        for n in 0..5 {
            memory
                .seed(&board(), BoardItem::new(format!("{n}"), format!("item {n}")))
                .await;
        }

        let first = memory.fetch_page(&board(), None).await.expect("page 1");
        assert_eq!(first.items.len(), 2);
        assert_eq!(first.next_cursor, Some(Cursor::from("2")));

        let last = memory
            .fetch_page(&board(), Some(&Cursor::from("4")))
            .await
            .expect("page 3");
        assert_eq!(last.items.len(), 1);
        assert!(last.next_cursor.is_none());
    }

    #[tokio::test]
    async fn create_assigns_ids_and_update_merges_values() {
        let memory = MemoryBoard::default();
        let mut values = BTreeMap::new();
        values.insert(ColumnId::from("text0"), "Floral".to_string());
        let created = memory
            .mutate(&Mutation::CreateItem {
                board: board(),
                name: "Rose".into(),
                values,
            })
            .await
            .expect("create");
        let id = created.created_item_id().expect("id");

        let mut change = BTreeMap::new();
        change.insert(ColumnId::from("text0"), "Woody".to_string());
        let updated = memory
            .mutate(&Mutation::UpdateItem {
                board: board(),
                item: id.clone(),
                name: None,
                values: change,
            })
            .await
            .expect("update");
        assert!(updated.is_ok());

        let items = memory.items(&board()).await;
        assert_eq!(items[0].id, id);
        assert_eq!(items[0].values[&ColumnId::from("text0")], "Woody");
    }

    #[tokio::test]
    async fn rejections_surface_as_graphql_errors() {
        let memory = MemoryBoard::default();
        memory.reject_name("Oud").await;
        let response = memory
            .mutate(&Mutation::CreateItem {
                board: board(),
                name: "Oud".into(),
                values: BTreeMap::new(),
            })
            .await
            .expect("transport ok");
        assert!(!response.is_ok());
        assert!(memory.items(&board()).await.is_empty());
    }

    #[tokio::test]
    async fn broken_page_is_malformed() {
        let memory = MemoryBoard::default();
        memory.break_page(None).await;
        let err = memory.fetch_page(&board(), None).await.unwrap_err();
        assert!(matches!(err, BoardError::Malformed(_)));
    }
}
