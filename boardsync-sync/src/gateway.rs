//! Area-level access to the record store.
//!
//! Wraps [`RecordStore::query`] with the five named operations an area is
//! configured with and converts rows into [`DomainRecord`]s through the
//! area's column mapping.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use boardsync_core::{AreaConfig, DomainRecord, ExternalId, FieldValue, RecordId};
use boardsync_store::{Params, RecordStore, Row};

use crate::error::SyncError;

/// Column carrying the linked board item id in store rows.
pub const LINK_COLUMN: &str = "board_item_id";

/// Update parameter naming the field to set to NULL.
pub const CLEAR_PARAM: &str = "clear";

#[derive(Clone)]
pub struct RecordGateway {
    store: Arc<dyn RecordStore>,
    area: AreaConfig,
}

impl RecordGateway {
    pub fn new(store: Arc<dyn RecordStore>, area: AreaConfig) -> Self {
        Self { store, area }
    }

    pub fn area(&self) -> &AreaConfig {
        &self.area
    }

    /// Rows of the area's list operation, untouched.
    pub async fn list_rows(&self) -> Result<Vec<Row>, SyncError> {
        let outcome = self.store.query(&self.area.operations.list, &Params::new()).await?;
        Ok(outcome.rows)
    }

    /// Full domain snapshot of the area.
    pub async fn list(&self) -> Result<Vec<DomainRecord>, SyncError> {
        let rows = self.list_rows().await?;
        let records = rows
            .iter()
            .map(|row| self.record_from_row(row))
            .collect::<Result<Vec<_>, _>>()?;
        tracing::debug!(area = %self.area.name, records = records.len(), "domain snapshot read");
        Ok(records)
    }

    /// Record linked to `item`, or else the record with id `join_key`.
    pub async fn find_existing(
        &self,
        item: &ExternalId,
        join_key: Option<RecordId>,
    ) -> Result<Option<DomainRecord>, SyncError> {
        let mut records = self.list().await?;
        if let Some(pos) = records
            .iter()
            .position(|r| r.external_id.as_ref() == Some(item))
        {
            return Ok(Some(records.swap_remove(pos)));
        }
        Ok(join_key.and_then(|id| records.into_iter().find(|r| r.id == id)))
    }

    /// Insert a record created on the board. Returns the generated id.
    pub async fn create(
        &self,
        name: &str,
        attributes: &BTreeMap<String, FieldValue>,
        item: &ExternalId,
    ) -> Result<Option<RecordId>, SyncError> {
        let mut params: Params = attributes
            .iter()
            .map(|(field, value)| (field.clone(), value.to_json()))
            .collect();
        params.insert("name".into(), Value::from(name));
        params.insert(LINK_COLUMN.into(), Value::from(item.0.as_str()));

        let outcome = self.store.query(&self.area.operations.create, &params).await?;
        Ok(outcome.generated_id.map(RecordId))
    }

    /// Set one field on the record linked to `item`. A null value clears
    /// the field. Returns affected rows.
    pub async fn update_field(
        &self,
        item: &ExternalId,
        field: &str,
        value: &FieldValue,
    ) -> Result<u64, SyncError> {
        let mut params = Self::keyed(item);
        params.insert(field.to_string(), value.to_json());
        if value.is_null() {
            params.insert(CLEAR_PARAM.into(), Value::from(field));
        }
        let outcome = self.store.query(&self.area.operations.update, &params).await?;
        Ok(outcome.affected)
    }

    pub async fn rename(&self, item: &ExternalId, name: &str) -> Result<u64, SyncError> {
        self.update_field(item, "name", &FieldValue::Text(name.to_string()))
            .await
    }

    pub async fn delete(&self, item: &ExternalId) -> Result<u64, SyncError> {
        let outcome = self
            .store
            .query(&self.area.operations.delete, &Self::keyed(item))
            .await?;
        Ok(outcome.affected)
    }

    /// Persist the board item id assigned to `record`.
    pub async fn link(&self, record: RecordId, item: &ExternalId) -> Result<u64, SyncError> {
        let mut params = Self::keyed(item);
        params.insert("id".into(), Value::from(record.0));
        let outcome = self.store.query(&self.area.operations.link, &params).await?;
        Ok(outcome.affected)
    }

    fn keyed(item: &ExternalId) -> Params {
        Params::from([(LINK_COLUMN.to_string(), Value::from(item.0.as_str()))])
    }

    fn record_from_row(&self, row: &Row) -> Result<DomainRecord, SyncError> {
        let invalid = |reason: &str| SyncError::InvalidRow {
            operation: self.area.operations.list.clone(),
            reason: reason.to_string(),
        };

        let id = row
            .get("id")
            .and_then(Value::as_i64)
            .ok_or_else(|| invalid("missing integer 'id'"))?;
        let name = match row.get("name") {
            Some(Value::String(name)) => name.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        };
        let external_id = match row.get(LINK_COLUMN) {
            Some(Value::String(s)) if !s.is_empty() => Some(ExternalId(s.clone())),
            Some(Value::Number(n)) => Some(ExternalId(n.to_string())),
            _ => None,
        };

        let mapping = &self.area.mapping;
        let mut record = DomainRecord::new(id, name);
        record.external_id = external_id;
        for field in mapping.fields() {
            if let Some(raw) = row.get(field) {
                let value = mapping.coerce(field, FieldValue::from_json(raw));
                record.attributes.insert(field.to_string(), value);
            }
        }
        Ok(record)
    }
}
