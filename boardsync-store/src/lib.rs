//! # boardsync-store
//!
//! Record Store Gateway: named, parameterized operations against the
//! system-of-record.
//!
//! Callers never build SQL. They name an operation from the configured
//! catalog and pass bound parameters; [`SqliteStore`] is the bundled
//! implementation of [`RecordStore`].

pub mod error;
pub mod sqlite;

use std::collections::BTreeMap;

use async_trait::async_trait;

pub use error::StoreError;
pub use sqlite::SqliteStore;

/// One result row, keyed by column name.
pub type Row = BTreeMap<String, serde_json::Value>;

/// Named parameters bound to an operation. Keys carry no `:` prefix.
pub type Params = BTreeMap<String, serde_json::Value>;

/// Result of executing one named operation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOutcome {
    pub rows: Vec<Row>,
    /// Identifier generated by an insert, if the operation inserted a row.
    pub generated_id: Option<i64>,
    /// Rows changed by a write operation.
    pub affected: u64,
}

/// Executes a named server-side operation and returns its rows.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn query(&self, operation: &str, params: &Params) -> Result<QueryOutcome, StoreError>;
}
