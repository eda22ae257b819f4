//! Sync job queue.
//!
//! HTTP triggers and the interval timer both enqueue jobs; one processor
//! task runs them in arrival order so reconciliation passes never overlap.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot};

use boardsync_sync::{ReconcileJob, SyncError, SyncSummary};

use crate::error::ServerError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncTarget {
    All,
    Area(String),
}

impl SyncTarget {
    pub fn label(&self) -> &str {
        match self {
            SyncTarget::All => "all",
            SyncTarget::Area(name) => name,
        }
    }
}

pub(crate) struct SyncJob {
    target: SyncTarget,
    source: &'static str,
    respond_to: oneshot::Sender<Result<SyncSummary, SyncError>>,
}

/// Handle for submitting jobs to the processor.
#[derive(Clone)]
pub struct SyncQueue {
    tx: mpsc::Sender<SyncJob>,
}

impl SyncQueue {
    pub(crate) fn channel(capacity: usize) -> (Self, mpsc::Receiver<SyncJob>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Enqueue a job and wait for its summary.
    pub async fn enqueue(
        &self,
        target: SyncTarget,
        source: &'static str,
    ) -> Result<SyncSummary, ServerError> {
        let (respond_to, rx) = oneshot::channel();
        self.tx
            .send(SyncJob {
                target,
                source,
                respond_to,
            })
            .await
            .map_err(|_| ServerError::ChannelClosed("sync queue"))?;
        let outcome = rx
            .await
            .map_err(|_| ServerError::ChannelClosed("sync response"))?;
        Ok(outcome?)
    }
}

pub(crate) async fn sync_processor_task(
    job: Arc<ReconcileJob>,
    mut sync_rx: mpsc::Receiver<SyncJob>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), ServerError> {
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            maybe_job = sync_rx.recv() => {
                let Some(SyncJob { target, source, respond_to }) = maybe_job else { break };
                tracing::info!(target = target.label(), source, "sync started");

                let outcome = match &target {
                    SyncTarget::All => job.run_all().await,
                    SyncTarget::Area(area) => job.run(area).await,
                };
                match &outcome {
                    Ok(summary) => tracing::info!(
                        target = target.label(),
                        source,
                        mutations = summary.mutation_count(),
                        failures = summary.failure_count(),
                        duration_ms = summary.duration_ms,
                        "sync completed",
                    ),
                    Err(err) => tracing::error!(
                        target = target.label(),
                        source,
                        error = %err,
                        "sync failed",
                    ),
                }
                let _ = respond_to.send(outcome);
            }
        }
    }
    Ok(())
}

/// Enqueue a full sync every `period` until shutdown.
pub(crate) async fn interval_task(
    queue: SyncQueue,
    period: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), ServerError> {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // The first tick fires immediately; a pass at startup is not wanted.
    interval.tick().await;
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = interval.tick() => {
                // Failures are logged by the processor; the timer keeps going.
                if let Err(ServerError::ChannelClosed(what)) =
                    queue.enqueue(SyncTarget::All, "interval").await
                {
                    tracing::warn!(channel = what, "sync queue closed, stopping interval");
                    break;
                }
            }
        }
    }
    Ok(())
}
