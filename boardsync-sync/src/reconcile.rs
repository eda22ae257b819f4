//! Reconciliation job: one outbound sync pass per area.
//!
//! reset guard → domain snapshot → board snapshot → diff → apply → link
//!
//! Snapshot failures end the pass with an error. Mutation failures are
//! reported per item in the summary.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;

use boardsync_board::BoardClient;
use boardsync_core::{
    AreaConfig, AreaName, BoardId, BoardItem, Config, DomainRecord, ThrottleConfig,
};
use boardsync_store::RecordStore;

use crate::diff::{diff, ChangeSet};
use crate::error::{MutationError, SyncError};
use crate::executor::{ExecutionReport, ItemFailure, MutationExecutor};
use crate::gateway::RecordGateway;
use crate::guard::IdempotencyGuard;
use crate::walker::PageWalker;

/// Result of a reconciliation pass over one or more areas.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncSummary {
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub areas: Vec<AreaReport>,
}

impl SyncSummary {
    pub fn failure_count(&self) -> usize {
        self.areas.iter().map(|a| a.failures.len()).sum()
    }

    pub fn mutation_count(&self) -> usize {
        self.areas
            .iter()
            .map(|a| a.created + a.updated + a.deleted)
            .sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AreaReport {
    pub area: AreaName,
    pub board: BoardId,
    pub records: usize,
    pub board_items: usize,
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub linked: usize,
    pub failures: Vec<ItemFailure>,
}

/// A change set computed without touching the board.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AreaPlan {
    pub area: AreaName,
    pub board: BoardId,
    pub records: usize,
    pub board_items: usize,
    pub changes: ChangeSet,
}

pub struct ReconcileJob {
    areas: Vec<AreaConfig>,
    store: Arc<dyn RecordStore>,
    walker: PageWalker,
    executor: MutationExecutor,
    guard: Arc<dyn IdempotencyGuard>,
}

impl ReconcileJob {
    pub fn new(
        areas: Vec<AreaConfig>,
        store: Arc<dyn RecordStore>,
        client: Arc<dyn BoardClient>,
        throttle: ThrottleConfig,
        guard: Arc<dyn IdempotencyGuard>,
    ) -> Self {
        Self {
            areas,
            store,
            walker: PageWalker::new(client.clone()),
            executor: MutationExecutor::new(client, throttle),
            guard,
        }
    }

    pub fn from_config(
        config: &Config,
        store: Arc<dyn RecordStore>,
        client: Arc<dyn BoardClient>,
        guard: Arc<dyn IdempotencyGuard>,
    ) -> Self {
        Self::new(config.areas.clone(), store, client, config.throttle, guard)
    }

    pub fn areas(&self) -> impl Iterator<Item = &AreaName> {
        self.areas.iter().map(|a| &a.name)
    }

    fn area(&self, name: &str) -> Result<&AreaConfig, SyncError> {
        self.areas
            .iter()
            .find(|a| a.name.0 == name)
            .ok_or_else(|| SyncError::UnknownArea(name.to_string()))
    }

    fn gateway(&self, area: &AreaConfig) -> RecordGateway {
        RecordGateway::new(self.store.clone(), area.clone())
    }

    async fn snapshot(
        &self,
        area: &AreaConfig,
    ) -> Result<(Vec<DomainRecord>, Vec<BoardItem>), SyncError> {
        let records = self.gateway(area).list().await?;
        let items = self.walker.fetch_all(&area.board_id).await?;
        Ok((records, items))
    }

    /// Compute the change set for `area`. No board mutation, no guard reset.
    pub async fn plan(&self, area: &str) -> Result<AreaPlan, SyncError> {
        let area = self.area(area)?;
        let (records, items) = self.snapshot(area).await?;
        let changes = diff(&records, &items, &area.mapping);
        Ok(AreaPlan {
            area: area.name.clone(),
            board: area.board_id.clone(),
            records: records.len(),
            board_items: items.len(),
            changes,
        })
    }

    /// Reconcile one area. Only that area's guard keys are forgotten.
    pub async fn run(&self, area: &str) -> Result<SyncSummary, SyncError> {
        let area = self.area(area)?;
        let started_at = Utc::now();
        let clock = Instant::now();
        self.guard.forget_prefix(&format!("{}:", area.name))?;

        let report = self.reconcile(area).await?;
        Ok(SyncSummary {
            started_at,
            duration_ms: elapsed_ms(clock),
            areas: vec![report],
        })
    }

    /// Reconcile every configured area in order, stopping at the first
    /// snapshot or store failure.
    pub async fn run_all(&self) -> Result<SyncSummary, SyncError> {
        let started_at = Utc::now();
        let clock = Instant::now();
        self.guard.reset()?;

        let mut areas = Vec::with_capacity(self.areas.len());
        for area in &self.areas {
            areas.push(self.reconcile(area).await?);
        }
        Ok(SyncSummary {
            started_at,
            duration_ms: elapsed_ms(clock),
            areas,
        })
    }

    async fn reconcile(&self, area: &AreaConfig) -> Result<AreaReport, SyncError> {
        let (records, items) = self.snapshot(area).await?;
        let changes = diff(&records, &items, &area.mapping);
        tracing::info!(
            area = %area.name,
            records = records.len(),
            board_items = items.len(),
            create = changes.to_create.len(),
            update = changes.to_update.len(),
            delete = changes.to_delete.len(),
            "reconciling area"
        );

        let mut execution = self
            .executor
            .apply(&area.board_id, &area.mapping, &changes)
            .await;
        let linked = self.persist_links(area, &mut execution).await;

        Ok(AreaReport {
            area: area.name.clone(),
            board: area.board_id.clone(),
            records: records.len(),
            board_items: items.len(),
            created: execution.created,
            updated: execution.updated,
            deleted: execution.deleted,
            linked,
            failures: execution.failures,
        })
    }

    /// Write newly assigned board ids back to the store. Failures are
    /// recorded per item.
    async fn persist_links(&self, area: &AreaConfig, execution: &mut ExecutionReport) -> usize {
        let gateway = self.gateway(area);
        let links = std::mem::take(&mut execution.links);
        let mut linked = 0;
        for link in links {
            let label = format!("record {} (item {})", link.record, link.item);
            match gateway.link(link.record, &link.item).await {
                Ok(0) => tracing::warn!(area = %area.name, record = %link.record, "link matched no record"),
                Ok(_) => linked += 1,
                Err(SyncError::Store(err)) => execution.fail(label, MutationError::Link(err)),
                Err(err) => execution.fail(label, err),
            }
        }
        linked
    }
}

fn elapsed_ms(clock: Instant) -> u64 {
    u64::try_from(clock.elapsed().as_millis()).unwrap_or(u64::MAX)
}
