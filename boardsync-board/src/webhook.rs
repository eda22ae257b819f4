//! Inbound webhook body decoding.
//!
//! The board service posts either a verification handshake
//! (`{"challenge": "..."}`) or a change notification
//! (`{"event": {"type": "...", ...}}`). Notification fields use the
//! vendor's camelCase names; older payloads use a few aliases, all of which
//! are accepted here so the router only sees [`BoardEvent`].

use std::collections::BTreeMap;

use serde_json::Value;

use boardsync_core::{BoardId, ExternalId, FieldValue};

use crate::DecodeError;

/// A decoded webhook body.
#[derive(Debug, Clone, PartialEq)]
pub enum WebhookPayload {
    /// Verification handshake; the value is echoed back verbatim.
    Challenge(Value),
    Event(BoardEvent),
}

/// Abstract event kinds the router dispatches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Create,
    Update,
    /// Update of the item name.
    Rename,
    Delete,
}

impl EventKind {
    /// Map a vendor event type onto a kind.
    pub fn from_type(event_type: &str) -> Option<Self> {
        match event_type {
            "create_pulse" | "create_item" | "item_created" => Some(EventKind::Create),
            "update_column_value"
            | "change_column_value"
            | "change_specific_column_value"
            | "item_updated" => Some(EventKind::Update),
            "update_name" | "change_name" => Some(EventKind::Rename),
            "delete_pulse" | "delete_item" | "item_deleted" => Some(EventKind::Delete),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Create => "create",
            EventKind::Update => "update",
            EventKind::Rename => "rename",
            EventKind::Delete => "delete",
        }
    }
}

/// A change notification in vendor-neutral form.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BoardEvent {
    /// Event type exactly as declared by the sender.
    pub event_type: String,
    pub item_id: Option<ExternalId>,
    pub board_id: Option<BoardId>,
    pub item_name: Option<String>,
    pub column_id: Option<String>,
    pub column_title: Option<String>,
    /// Plain field name, as sent by non-vendor producers.
    pub field: Option<String>,
    /// New value; `None` when the payload carries no value at all.
    pub value: Option<FieldValue>,
    /// Initial column values carried by create notifications, keyed by
    /// column id.
    pub column_values: BTreeMap<String, FieldValue>,
}

impl BoardEvent {
    pub fn kind(&self) -> Option<EventKind> {
        EventKind::from_type(&self.event_type)
    }

    /// Field references in resolution order: column id, column title, field.
    pub fn field_refs(&self) -> impl Iterator<Item = &str> {
        [&self.column_id, &self.column_title, &self.field]
            .into_iter()
            .filter_map(|r| r.as_deref())
    }
}

/// Decode a raw webhook body.
pub fn decode(body: &[u8]) -> Result<WebhookPayload, DecodeError> {
    let root: Value =
        serde_json::from_slice(body).map_err(|e| DecodeError::NotJson(e.to_string()))?;
    decode_value(&root)
}

pub fn decode_value(root: &Value) -> Result<WebhookPayload, DecodeError> {
    if let Some(challenge) = root.get("challenge") {
        return Ok(WebhookPayload::Challenge(challenge.clone()));
    }
    let event = root
        .get("event")
        .filter(|e| e.is_object())
        .ok_or(DecodeError::UnknownShape)?;
    let event_type = event
        .get("type")
        .and_then(Value::as_str)
        .ok_or(DecodeError::MissingType)?;

    let column_values = event
        .get("columnValues")
        .and_then(Value::as_object)
        .map(|object| {
            object
                .iter()
                .map(|(column, raw)| (column.clone(), extract_value(raw)))
                .collect()
        })
        .unwrap_or_default();

    Ok(WebhookPayload::Event(BoardEvent {
        event_type: event_type.to_string(),
        item_id: first_scalar(event, &["pulseId", "itemId", "item_id", "id"]).map(ExternalId),
        board_id: first_scalar(event, &["boardId", "board_id"]).map(BoardId),
        item_name: first_scalar(event, &["pulseName", "itemName", "name"]),
        column_id: first_scalar(event, &["columnId", "column_id"]),
        column_title: first_scalar(event, &["columnTitle", "column_title"]),
        field: first_scalar(event, &["field"]),
        value: event.get("value").map(extract_value),
        column_values,
    }))
}

fn first_scalar(event: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match event.get(*key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// Pull the scalar out of a vendor column value.
///
/// Shapes seen: `{"text": ..}`, `{"value": ..}`, `{"label": {"text": ..}}`,
/// `{"date": .., "time": ..}`, `{"name": ..}` and bare scalars.
fn extract_value(raw: &Value) -> FieldValue {
    let Some(object) = raw.as_object() else {
        return FieldValue::from_json(raw);
    };
    if let Some(text) = object.get("text") {
        return FieldValue::from_json(text);
    }
    if let Some(label) = object.get("label") {
        return match label.get("text") {
            Some(text) => FieldValue::from_json(text),
            None => FieldValue::from_json(label),
        };
    }
    if let Some(date) = object.get("date").and_then(Value::as_str) {
        return match object.get("time").and_then(Value::as_str) {
            Some(time) if !time.is_empty() => FieldValue::Text(format!("{date} {time}")),
            _ => FieldValue::Text(date.to_string()),
        };
    }
    for key in ["value", "name"] {
        if let Some(value) = object.get(key) {
            return FieldValue::from_json(value);
        }
    }
    FieldValue::from_json(raw)
}
