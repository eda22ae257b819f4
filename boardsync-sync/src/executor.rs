//! Throttled mutation executor.
//!
//! Applies a [`ChangeSet`] in three sequential phases: deletes, creates,
//! updates. With a non-zero minimum delay every board call waits until the
//! delay has passed since the previous call, across phase boundaries too.
//! With no delay the calls of one phase run concurrently, bounded by the
//! configured concurrency.
//!
//! A failed item is recorded and the batch carries on. Nothing is retried.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio::time::Instant;

use boardsync_board::{BoardClient, Mutation, MutationResponse};
use boardsync_core::{BoardId, ColumnMapping, ExternalId, RecordId, ThrottleConfig};

use crate::diff::ChangeSet;
use crate::error::MutationError;

/// Outcome of applying one change set.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExecutionReport {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub failures: Vec<ItemFailure>,
    /// Board ids assigned to newly created items.
    #[serde(skip)]
    pub links: Vec<CreatedLink>,
}

impl ExecutionReport {
    pub fn fail(&mut self, item: impl Into<String>, error: impl std::fmt::Display) {
        let item = item.into();
        let error = error.to_string();
        tracing::warn!(item = %item, error = %error, "board mutation failed");
        self.failures.push(ItemFailure { item, error });
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemFailure {
    pub item: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedLink {
    pub record: RecordId,
    pub item: ExternalId,
}

/// Spaces board calls at least `delay` apart.
struct Pacer {
    delay: Duration,
    last: Option<Instant>,
}

impl Pacer {
    async fn wait(&mut self) {
        if let Some(last) = self.last {
            tokio::time::sleep_until(last + self.delay).await;
        }
        self.last = Some(Instant::now());
    }
}

pub struct MutationExecutor {
    client: Arc<dyn BoardClient>,
    throttle: ThrottleConfig,
}

impl MutationExecutor {
    pub fn new(client: Arc<dyn BoardClient>, throttle: ThrottleConfig) -> Self {
        Self { client, throttle }
    }

    /// Apply `changes` to `board`: deletes, then creates, then updates.
    pub async fn apply(
        &self,
        board: &BoardId,
        mapping: &ColumnMapping,
        changes: &ChangeSet,
    ) -> ExecutionReport {
        let mut report = ExecutionReport::default();
        let mut pacer = Pacer {
            delay: self.throttle.min_delay(),
            last: None,
        };
        let concurrency = self.throttle.concurrency;

        let client = self.client.clone();
        let deletes = run_phase(&mut pacer, concurrency, changes.to_delete.clone(), move |item| {
            let client = client.clone();
            async move {
                let result = submit(client, Mutation::DeleteItem { item: item.clone() }).await;
                (item, result)
            }
        })
        .await;
        for (item, result) in deletes {
            match result {
                Ok(_) => report.deleted += 1,
                Err(err) => report.fail(format!("item {item}"), err),
            }
        }

        let mut creates = Vec::with_capacity(changes.to_create.len());
        for record in &changes.to_create {
            match mapping.to_column_values(record) {
                Ok(values) => creates.push((record.clone(), values)),
                Err(err) => report.fail(
                    format!("record {} ('{}')", record.id, record.name),
                    MutationError::Mapping(err),
                ),
            }
        }
        let (client, target) = (self.client.clone(), board.clone());
        let creates = run_phase(&mut pacer, concurrency, creates, move |(record, values)| {
            let mutation = Mutation::CreateItem {
                board: target.clone(),
                name: record.name.clone(),
                values,
            };
            let client = client.clone();
            async move { (record, submit(client, mutation).await) }
        })
        .await;
        for (record, result) in creates {
            match result {
                Ok(response) => {
                    report.created += 1;
                    match response.created_item_id() {
                        Some(item) => report.links.push(CreatedLink {
                            record: record.id,
                            item,
                        }),
                        None => tracing::warn!(
                            record = %record.id,
                            "create response carried no item id; record stays unlinked"
                        ),
                    }
                }
                Err(err) => report.fail(format!("record {} ('{}')", record.id, record.name), err),
            }
        }

        let mut updates = Vec::with_capacity(changes.to_update.len());
        for (item, record) in &changes.to_update {
            match mapping.to_column_values(record) {
                Ok(values) => updates.push((item.clone(), record.id, record.name.clone(), values)),
                Err(err) => report.fail(
                    format!("item {item} (record {})", record.id),
                    MutationError::Mapping(err),
                ),
            }
        }
        let (client, target) = (self.client.clone(), board.clone());
        let updates = run_phase(&mut pacer, concurrency, updates, move |(item, record, name, values)| {
            let mutation = Mutation::UpdateItem {
                board: target.clone(),
                item: item.clone(),
                name: Some(name),
                values,
            };
            let client = client.clone();
            async move { (item, record, submit(client, mutation).await) }
        })
        .await;
        for (item, record, result) in updates {
            match result {
                Ok(_) => report.updated += 1,
                Err(err) => report.fail(format!("item {item} (record {record})"), err),
            }
        }

        tracing::info!(
            board = %board,
            created = report.created,
            updated = report.updated,
            deleted = report.deleted,
            failures = report.failures.len(),
            "change set applied"
        );
        report
    }
}

/// Run one phase. Jobs own their data so the phase future stays `Send`.
async fn run_phase<T, F, Fut>(
    pacer: &mut Pacer,
    concurrency: usize,
    jobs: Vec<T>,
    call: F,
) -> Vec<Fut::Output>
where
    F: Fn(T) -> Fut,
    Fut: Future,
{
    if pacer.delay.is_zero() {
        return stream::iter(jobs.into_iter().map(call))
            .buffered(concurrency.max(1))
            .collect()
            .await;
    }
    let mut outputs = Vec::with_capacity(jobs.len());
    for job in jobs {
        pacer.wait().await;
        outputs.push(call(job).await);
    }
    outputs
}

async fn submit(
    client: Arc<dyn BoardClient>,
    mutation: Mutation,
) -> Result<MutationResponse, MutationError> {
    tracing::debug!(mutation = %mutation, "submitting board mutation");
    let response = client.mutate(&mutation).await?;
    if response.is_ok() {
        Ok(response)
    } else {
        Err(MutationError::Rejected(response.error_messages()))
    }
}
