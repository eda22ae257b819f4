//! SQLite-backed [`RecordStore`].
//!
//! The catalog maps operation names to statements with named parameters
//! (`:name`). Only the parameters a statement declares are bound; a declared
//! parameter missing from the call binds as `NULL`, which lets one update
//! statement serve partial updates through `COALESCE(:field, field)`.
//! The bundled updates set a field to `NULL` only when `:clear` names it.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::types::Value as SqlValue;
use rusqlite::Connection;
use serde_json::Value as JsonValue;

use boardsync_core::StoreConfig;

use crate::error::{query_err, StoreError};
use crate::{Params, QueryOutcome, RecordStore, Row};

/// Named-operation store over a single SQLite connection.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    operations: Arc<BTreeMap<String, String>>,
}

impl SqliteStore {
    /// Open the database at `config.path` (`:memory:` opens a private
    /// in-memory database) and apply the bootstrap schema.
    pub fn open(config: &StoreConfig) -> Result<Self, StoreError> {
        if config.path == Path::new(":memory:") {
            return Self::open_in_memory(config);
        }
        let conn = Connection::open(&config.path).map_err(|source| StoreError::Open {
            path: config.path.clone(),
            source,
        })?;
        Self::with_connection(conn, config)
    }

    /// Open a private in-memory database with `config`'s schema and catalog.
    pub fn open_in_memory(config: &StoreConfig) -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(|source| StoreError::Open {
            path: ":memory:".into(),
            source,
        })?;
        Self::with_connection(conn, config)
    }

    fn with_connection(conn: Connection, config: &StoreConfig) -> Result<Self, StoreError> {
        if let Some(schema) = &config.schema {
            conn.execute_batch(schema).map_err(StoreError::Schema)?;
        }
        tracing::debug!(
            path = %config.path.display(),
            operations = config.operations.len(),
            "record store opened"
        );
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            operations: Arc::new(config.operations.clone()),
        })
    }
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn query(&self, operation: &str, params: &Params) -> Result<QueryOutcome, StoreError> {
        let sql = self
            .operations
            .get(operation)
            .cloned()
            .ok_or_else(|| StoreError::UnknownOperation(operation.to_string()))?;

        let conn = self.conn.clone();
        let name = operation.to_string();
        let params = params.clone();
        let outcome = tokio::task::spawn_blocking(move || {
            let conn = conn.lock().map_err(|_| StoreError::Poisoned)?;
            execute(&conn, &sql, &params).map_err(|e| query_err(&name, e))
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))??;

        tracing::debug!(
            operation,
            rows = outcome.rows.len(),
            affected = outcome.affected,
            "store operation executed"
        );
        Ok(outcome)
    }
}

fn execute(conn: &Connection, sql: &str, params: &Params) -> Result<QueryOutcome, rusqlite::Error> {
    let mut stmt = conn.prepare(sql)?;

    let declared: Vec<(usize, Option<String>)> = (1..=stmt.parameter_count())
        .map(|idx| (idx, stmt.parameter_name(idx).map(str::to_string)))
        .collect();
    for (idx, name) in declared {
        let value = name
            .as_deref()
            .map(|n| n.trim_start_matches([':', '@', '$']))
            .and_then(|key| params.get(key))
            .map(to_sql)
            .unwrap_or(SqlValue::Null);
        stmt.raw_bind_parameter(idx, value)?;
    }

    if stmt.column_count() > 0 {
        let columns: Vec<String> = stmt.column_names().into_iter().map(str::to_string).collect();
        let mut rows = Vec::new();
        let mut cursor = stmt.raw_query();
        while let Some(row) = cursor.next()? {
            let mut out = Row::new();
            for (idx, column) in columns.iter().enumerate() {
                out.insert(column.clone(), from_sql(row.get::<_, SqlValue>(idx)?));
            }
            rows.push(out);
        }
        return Ok(QueryOutcome {
            rows,
            generated_id: None,
            affected: 0,
        });
    }

    let affected = stmt.raw_execute()?;
    let generated_id = (affected > 0 && is_insert(sql)).then(|| conn.last_insert_rowid());
    Ok(QueryOutcome {
        rows: Vec::new(),
        generated_id,
        affected: affected as u64,
    })
}

fn is_insert(sql: &str) -> bool {
    let head = sql.trim_start().get(..7).unwrap_or_default();
    head.eq_ignore_ascii_case("INSERT ") || head.eq_ignore_ascii_case("REPLACE")
}

fn to_sql(value: &JsonValue) -> SqlValue {
    match value {
        JsonValue::Null => SqlValue::Null,
        JsonValue::Bool(b) => SqlValue::Integer(i64::from(*b)),
        JsonValue::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => n.as_f64().map(SqlValue::Real).unwrap_or(SqlValue::Null),
        },
        JsonValue::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

fn from_sql(value: SqlValue) -> JsonValue {
    match value {
        SqlValue::Null => JsonValue::Null,
        SqlValue::Integer(i) => JsonValue::from(i),
        SqlValue::Real(f) => serde_json::Number::from_f64(f)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        SqlValue::Text(s) => JsonValue::String(s),
        SqlValue::Blob(bytes) => JsonValue::String(String::from_utf8_lossy(&bytes).into_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(pairs: &[(&str, JsonValue)]) -> Params {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn insert_detection_ignores_case_and_leading_space() {
        assert!(is_insert("  insert into t values (1)"));
        assert!(is_insert("REPLACE INTO t VALUES (1)"));
        assert!(!is_insert("UPDATE t SET a = 1"));
        assert!(!is_insert("INS"));
    }

    #[tokio::test]
    async fn unknown_operation_is_rejected_before_touching_the_database() {
        let store = SqliteStore::open_in_memory(&StoreConfig::default()).expect("open");
        let err = store.query("DropTables", &Params::new()).await.unwrap_err();
        assert!(matches!(err, StoreError::UnknownOperation(ref op) if op == "DropTables"));
    }

    #[tokio::test]
    async fn insert_returns_generated_id_and_select_returns_rows() {
        let store = SqliteStore::open_in_memory(&StoreConfig::default()).expect("open");
        let created = store
            .query(
                "AddFragrance",
                &params(&[("name", json!("Rose")), ("category", json!("Floral"))]),
            )
            .await
            .expect("insert");
        assert_eq!(created.generated_id, Some(1));
        assert_eq!(created.affected, 1);

        let listed = store
            .query("GetAllFragrances", &Params::new())
            .await
            .expect("select");
        assert_eq!(listed.rows.len(), 1);
        assert_eq!(listed.rows[0]["name"], json!("Rose"));
        assert_eq!(listed.rows[0]["category"], json!("Floral"));
        assert_eq!(listed.rows[0]["description"], JsonValue::Null);
    }

    #[tokio::test]
    async fn missing_parameters_bind_as_null_so_coalesce_keeps_old_values() {
        let store = SqliteStore::open_in_memory(&StoreConfig::default()).expect("open");
        store
            .query(
                "AddFragrance",
                &params(&[
                    ("name", json!("Rose")),
                    ("category", json!("Floral")),
                    ("board_item_id", json!("9")),
                ]),
            )
            .await
            .expect("insert");

        let updated = store
            .query(
                "UpdateFragrance",
                &params(&[("board_item_id", json!("9")), ("category", json!("Woody"))]),
            )
            .await
            .expect("update");
        assert_eq!(updated.affected, 1);
        assert_eq!(updated.generated_id, None);

        let rows = store
            .query("GetAllFragrances", &Params::new())
            .await
            .expect("select")
            .rows;
        assert_eq!(rows[0]["name"], json!("Rose"));
        assert_eq!(rows[0]["category"], json!("Woody"));
    }

    #[tokio::test]
    async fn clear_parameter_sets_the_named_field_to_null() {
        let store = SqliteStore::open_in_memory(&StoreConfig::default()).expect("open");
        store
            .query(
                "AddFragrance",
                &params(&[
                    ("name", json!("Rose")),
                    ("category", json!("Floral")),
                    ("image_url", json!("https://img.example/rose.png")),
                    ("board_item_id", json!("9")),
                ]),
            )
            .await
            .expect("insert");

        store
            .query(
                "UpdateFragrance",
                &params(&[("board_item_id", json!("9")), ("clear", json!("category"))]),
            )
            .await
            .expect("update");

        let rows = store
            .query("GetAllFragrances", &Params::new())
            .await
            .expect("select")
            .rows;
        assert_eq!(rows[0]["category"], JsonValue::Null);
        assert_eq!(rows[0]["image_url"], json!("https://img.example/rose.png"));
    }
}
