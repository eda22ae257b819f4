//! Column mapping between domain record fields and board columns.
//!
//! A [`ColumnMapping`] is a fixed table of `field <-> column id` pairs, each
//! with a [`ColumnEncoding`] rule. The board only ever carries text, so every
//! rule is a pair of functions `encode: FieldValue -> String` and
//! `decode: String -> FieldValue` with `decode(encode(v)) == v` for every value
//! the rule can represent.
//!
//! The join column is not an attribute: it carries the record's own
//! [`RecordId`] and is what correlates a board item with its record.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MappingError;
use crate::types::{ColumnId, DomainRecord, FieldValue, RecordId};

// ---------------------------------------------------------------------------
// Encoding rules
// ---------------------------------------------------------------------------

/// How a field's value is written to and read from board column text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ColumnEncoding {
    #[default]
    Text,
    Number,
    Date,
    Timestamp,
}

impl ColumnEncoding {
    pub fn label(self) -> &'static str {
        match self {
            ColumnEncoding::Text => "text",
            ColumnEncoding::Number => "number",
            ColumnEncoding::Date => "date",
            ColumnEncoding::Timestamp => "timestamp",
        }
    }

    /// Encode `value` as board column text.
    pub fn encode(self, field: &str, value: &FieldValue) -> Result<String, MappingError> {
        let invalid = || MappingError::InvalidValue {
            field: field.to_string(),
            encoding: self.label(),
            value: value.canonical(),
        };

        if value.is_null() {
            return Ok(String::new());
        }

        match self {
            ColumnEncoding::Text => match value {
                FieldValue::Float(f) if !f.is_finite() => Err(invalid()),
                FieldValue::Float(f) => Ok(format!("{f:?}")),
                FieldValue::Text(s) => Ok(s.clone()),
                other => Ok(other.canonical()),
            },
            ColumnEncoding::Number => match value {
                FieldValue::Integer(i) => Ok(i.to_string()),
                FieldValue::Float(f) if f.is_finite() => Ok(format!("{f:?}")),
                FieldValue::Text(s) => match parse_number(s.trim()) {
                    Some(FieldValue::Integer(i)) => Ok(i.to_string()),
                    Some(FieldValue::Float(f)) => Ok(format!("{f:?}")),
                    _ => Err(invalid()),
                },
                _ => Err(invalid()),
            },
            ColumnEncoding::Date => match value {
                FieldValue::Date(d) => Ok(format_date(*d)),
                FieldValue::Timestamp(t) => Ok(format_date(t.date_naive())),
                FieldValue::Text(s) => parse_date(s.trim()).map(format_date).ok_or_else(invalid),
                _ => Err(invalid()),
            },
            ColumnEncoding::Timestamp => match value {
                FieldValue::Timestamp(t) => Ok(format_timestamp(*t)),
                FieldValue::Date(d) => Ok(format_timestamp(midnight(*d))),
                FieldValue::Text(s) => parse_timestamp(s.trim())
                    .map(format_timestamp)
                    .ok_or_else(invalid),
                _ => Err(invalid()),
            },
        }
    }

    /// Decode board column text. Never fails: text that does not parse under
    /// the rule is kept verbatim so it shows up as a difference.
    pub fn decode(self, text: &str) -> FieldValue {
        if text.is_empty() {
            return FieldValue::Null;
        }
        let parsed = match self {
            ColumnEncoding::Text => None,
            ColumnEncoding::Number => parse_number(text.trim()),
            ColumnEncoding::Date => parse_date(text.trim()).map(FieldValue::Date),
            ColumnEncoding::Timestamp => parse_timestamp(text.trim()).map(FieldValue::Timestamp),
        };
        parsed.unwrap_or_else(|| FieldValue::Text(text.to_string()))
    }

    /// Bring a loosely typed value (store cell, webhook text) into the shape
    /// [`decode`](Self::decode) produces. Values that do not fit are returned
    /// unchanged; encoding them later reports the problem.
    pub fn coerce(self, value: FieldValue) -> FieldValue {
        match (self, value) {
            (_, FieldValue::Text(s)) if s.is_empty() => FieldValue::Null,
            (ColumnEncoding::Text, FieldValue::Integer(i)) => FieldValue::Text(i.to_string()),
            (ColumnEncoding::Text, FieldValue::Float(f)) if f.is_finite() => {
                FieldValue::Text(format!("{f:?}"))
            }
            (ColumnEncoding::Text, value @ (FieldValue::Date(_) | FieldValue::Timestamp(_))) => {
                FieldValue::Text(value.canonical())
            }
            (ColumnEncoding::Number, FieldValue::Text(s)) => {
                parse_number(s.trim()).unwrap_or(FieldValue::Text(s))
            }
            (ColumnEncoding::Date, FieldValue::Text(s)) => {
                parse_date(s.trim()).map(FieldValue::Date).unwrap_or(FieldValue::Text(s))
            }
            (ColumnEncoding::Date, FieldValue::Timestamp(t)) => FieldValue::Date(t.date_naive()),
            (ColumnEncoding::Timestamp, FieldValue::Text(s)) => parse_timestamp(s.trim())
                .map(FieldValue::Timestamp)
                .unwrap_or(FieldValue::Text(s)),
            (ColumnEncoding::Timestamp, FieldValue::Date(d)) => FieldValue::Timestamp(midnight(d)),
            (_, value) => value,
        }
    }
}

fn parse_number(s: &str) -> Option<FieldValue> {
    if s.is_empty() {
        return None;
    }
    if !s.contains(['.', 'e', 'E']) {
        if let Ok(i) = s.parse::<i64>() {
            return Some(FieldValue::Integer(i));
        }
    }
    s.parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
        .map(FieldValue::Float)
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .or_else(|| parse_timestamp(s).map(|t| t.date_naive()))
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Some(t.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok().map(midnight)
}

fn midnight(d: NaiveDate) -> DateTime<Utc> {
    d.and_time(NaiveTime::MIN).and_utc()
}

fn format_date(d: NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}

fn format_timestamp(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

// ---------------------------------------------------------------------------
// Mapping table
// ---------------------------------------------------------------------------

/// One `field <-> column` row of the mapping table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    /// Domain attribute name (store column name).
    pub field: String,
    /// Board column identifier.
    pub column: ColumnId,
    /// Human-facing column title on the board, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub encoding: ColumnEncoding,
}

impl ColumnSpec {
    pub fn new(field: &str, column: &str, encoding: ColumnEncoding) -> Self {
        Self {
            field: field.to_string(),
            column: ColumnId::from(column),
            title: None,
            encoding,
        }
    }

    pub fn titled(mut self, title: &str) -> Self {
        self.title = Some(title.to_string());
        self
    }

    fn answers_to(&self, key: &str) -> bool {
        self.column.0 == key
            || self
                .title
                .as_deref()
                .is_some_and(|title| title.eq_ignore_ascii_case(key))
            || normalize_title(key) == self.field
    }
}

/// Bidirectional field/column table for one domain area.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMapping {
    /// Column holding the record id on the board. Immutable once written.
    pub join_column: ColumnId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_title: Option<String>,
    pub columns: Vec<ColumnSpec>,
}

impl ColumnMapping {
    pub fn new(join_column: &str, columns: Vec<ColumnSpec>) -> Self {
        Self {
            join_column: ColumnId::from(join_column),
            join_title: None,
            columns,
        }
    }

    /// Encode every mapped field of `record`, plus the join column.
    ///
    /// Absent attributes encode as empty text so the result always covers the
    /// full column set.
    pub fn to_column_values(
        &self,
        record: &DomainRecord,
    ) -> Result<BTreeMap<ColumnId, String>, MappingError> {
        let mut values = BTreeMap::new();
        values.insert(self.join_column.clone(), record.id.to_string());
        for spec in &self.columns {
            let text = spec.encoding.encode(&spec.field, record.attribute(&spec.field))?;
            values.insert(spec.column.clone(), text);
        }
        Ok(values)
    }

    /// Decode the mapped columns present in `values`. Unknown column ids and
    /// the join column are ignored.
    pub fn from_column_values(
        &self,
        values: &BTreeMap<ColumnId, String>,
    ) -> BTreeMap<String, FieldValue> {
        self.columns
            .iter()
            .filter_map(|spec| {
                values
                    .get(&spec.column)
                    .map(|text| (spec.field.clone(), spec.encoding.decode(text)))
            })
            .collect()
    }

    /// Record id carried in the join column, if present and well-formed.
    pub fn join_key_of(&self, values: &BTreeMap<ColumnId, String>) -> Option<RecordId> {
        values
            .get(&self.join_column)
            .and_then(|text| text.trim().parse::<i64>().ok())
            .map(RecordId)
    }

    /// Resolve a webhook field reference (column id, column title, or field
    /// name) to its mapping row.
    pub fn resolve_field(&self, key: &str) -> Option<&ColumnSpec> {
        self.columns
            .iter()
            .find(|spec| spec.column.0 == key)
            .or_else(|| self.columns.iter().find(|spec| spec.answers_to(key)))
    }

    pub fn is_join_column(&self, key: &str) -> bool {
        self.join_column.0 == key
            || self
                .join_title
                .as_deref()
                .is_some_and(|title| title.eq_ignore_ascii_case(key))
    }

    pub fn spec_for_field(&self, field: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|spec| spec.field == field)
    }

    /// Type a raw value for `field` according to its encoding rule.
    pub fn coerce(&self, field: &str, value: FieldValue) -> FieldValue {
        match self.spec_for_field(field) {
            Some(spec) => spec.encoding.coerce(value),
            None => value,
        }
    }

    /// Watched field names, in mapping order.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|spec| spec.field.as_str())
    }
}

/// `"Image URL"` -> `"image_url"`.
fn normalize_title(title: &str) -> String {
    title.trim().to_ascii_lowercase().replace(' ', "_")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
