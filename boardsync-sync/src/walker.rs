//! Pagination walker: drives a [`BoardClient`] through cursor pages.

use std::collections::HashSet;
use std::sync::Arc;

use futures::stream::{self, Stream, TryStreamExt};

use boardsync_board::{BoardClient, BoardError};
use boardsync_core::{BoardId, BoardItem, Cursor};

use crate::error::FetchError;

/// Walks every page of a board.
///
/// Each call to [`stream`](Self::stream) starts a fresh walk from the first
/// page, so a failed walk is retried by calling it again.
#[derive(Clone)]
pub struct PageWalker {
    client: Arc<dyn BoardClient>,
}

struct Walk {
    /// Cursor of the next page to request; `None` once the walk is done.
    next: Option<Option<Cursor>>,
    seen: HashSet<Cursor>,
}

impl PageWalker {
    pub fn new(client: Arc<dyn BoardClient>) -> Self {
        Self { client }
    }

    /// Lazily yield every item on `board`, page by page.
    ///
    /// A failed or malformed page ends the stream with a [`FetchError`]
    /// naming the cursor it was requested with. A cursor that repeats is
    /// reported the same way instead of looping forever.
    pub fn stream(
        &self,
        board: &BoardId,
    ) -> impl Stream<Item = Result<BoardItem, FetchError>> + Send + 'static {
        let client = self.client.clone();
        let board = board.clone();
        let start = Walk {
            next: Some(None),
            seen: HashSet::new(),
        };

        stream::try_unfold(start, move |mut walk| {
            let client = client.clone();
            let board = board.clone();
            async move {
                let Some(cursor) = walk.next.take() else {
                    return Ok(None);
                };
                let fail = |source: BoardError| FetchError {
                    board: board.clone(),
                    cursor: cursor.clone(),
                    source,
                };

                let page = client
                    .fetch_page(&board, cursor.as_ref())
                    .await
                    .map_err(fail)?;
                if let Some(next) = page.next_cursor {
                    if !walk.seen.insert(next.clone()) {
                        return Err(fail(BoardError::Malformed(format!(
                            "cursor '{next}' returned twice"
                        ))));
                    }
                    walk.next = Some(Some(next));
                }
                Ok(Some((page.items, walk)))
            }
        })
        .map_ok(|items| stream::iter(items.into_iter().map(Ok::<_, FetchError>)))
        .try_flatten()
    }

    /// Collect the whole board. Never returns a partial list.
    pub async fn fetch_all(&self, board: &BoardId) -> Result<Vec<BoardItem>, FetchError> {
        let items: Vec<BoardItem> = self.stream(board).try_collect().await?;
        tracing::debug!(board = %board, items = items.len(), "board snapshot fetched");
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use boardsync_board::MemoryBoard;
    use futures::StreamExt;

    fn board() -> BoardId {
        BoardId::from("77")
    }

    async fn seeded(page_size: usize, n: usize) -> MemoryBoard {
        let memory = MemoryBoard::new(page_size);
        for i in 0..n {
            memory
                .seed(&board(), BoardItem::new(format!("{i}"), format!("item {i}")))
                .await;
        }
        memory
    }

    #[tokio::test]
    async fn walks_all_pages_in_order() {
        let memory = seeded(3, 8).await;
        let walker = PageWalker::new(Arc::new(memory));
        let items = walker.fetch_all(&board()).await.expect("walk");
        let ids: Vec<_> = items.iter().map(|i| i.id.0.as_str()).collect();
        assert_eq!(ids, ["0", "1", "2", "3", "4", "5", "6", "7"]);
    }

    #[tokio::test]
    async fn empty_board_is_an_empty_walk() {
        let walker = PageWalker::new(Arc::new(MemoryBoard::default()));
        assert!(walker.fetch_all(&board()).await.expect("walk").is_empty());
    }

    #[tokio::test]
    async fn failure_names_the_cursor_and_returns_no_partial_list() {
        let memory = seeded(2, 6).await;
        memory.break_page(Some(Cursor::from("4"))).await;
        let walker = PageWalker::new(Arc::new(memory));

        let err = walker.fetch_all(&board()).await.unwrap_err();
        assert_eq!(err.cursor, Some(Cursor::from("4")));
        assert!(err.to_string().contains("cursor 4"), "got: {err}");
    }

    #[tokio::test]
    async fn stream_is_restartable() {
        let memory = seeded(2, 5).await;
        let walker = PageWalker::new(Arc::new(memory));

        let first_two: Vec<_> = walker
            .stream(&board())
            .take(2)
            .try_collect()
            .await
            .expect("partial read");
        assert_eq!(first_two.len(), 2);
        assert_eq!(walker.fetch_all(&board()).await.expect("full walk").len(), 5);
    }
}
