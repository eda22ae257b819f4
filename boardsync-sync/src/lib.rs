//! # boardsync-sync
//!
//! Reconciliation and webhook synchronization engine.
//!
//! - [`guard`]: idempotency guard for inbound creates
//! - [`walker`]: cursor pagination over a board
//! - [`diff`]: create / update / delete classification
//! - [`executor`]: throttled, failure-tolerant mutation batches
//! - [`gateway`]: area operations on the record store
//! - [`webhook`]: inbound event router
//! - [`reconcile`]: the outbound sync pass

pub mod diff;
pub mod error;
pub mod executor;
pub mod gateway;
pub mod guard;
pub mod reconcile;
pub mod walker;
pub mod webhook;

pub use diff::{diff, ChangeSet};
pub use error::{ClassificationError, FetchError, MutationError, SyncError};
pub use executor::{CreatedLink, ExecutionReport, ItemFailure, MutationExecutor};
pub use gateway::RecordGateway;
pub use guard::{FileGuard, IdempotencyGuard, MemoryGuard};
pub use reconcile::{AreaPlan, AreaReport, ReconcileJob, SyncSummary};
pub use walker::PageWalker;
pub use webhook::{RouteOutcome, RouteState, WebhookRouter};
