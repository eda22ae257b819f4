//! Webhook router: classifies one inbound board notification and applies it
//! to the record store.
//!
//! ```text
//! AwaitingClassification ──kind──▶ Dispatched(kind) ──ok──▶ Done
//!          │                              │
//!          └──────── unrecognized ────────┴──error──▶ Rejected
//! ```
//!
//! Handshakes never enter the machine. Creates are guarded against
//! duplicate delivery; updates and deletes are naturally idempotent.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{json, Value};

use boardsync_board::webhook::{self, BoardEvent, EventKind, WebhookPayload};
use boardsync_core::{AreaName, ColumnMapping, DomainRecord, ExternalId, FieldValue, RecordId};

use crate::error::{ClassificationError, SyncError};
use crate::gateway::RecordGateway;
use crate::guard::IdempotencyGuard;

/// Router states. An outcome reports the terminal one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteState {
    AwaitingClassification,
    Dispatched(EventKind),
    Done,
    Rejected,
}

/// What the HTTP layer sends back for one webhook body.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteOutcome {
    pub status: u16,
    pub body: Value,
    /// `None` for a handshake, which bypasses the state machine.
    pub state: Option<RouteState>,
    pub kind: Option<EventKind>,
}

impl RouteOutcome {
    fn handshake(challenge: Value) -> Self {
        Self {
            status: 200,
            body: json!({ "challenge": challenge }),
            state: None,
            kind: None,
        }
    }
}

enum HandlerError {
    Client(ClassificationError),
    Server(SyncError),
}

impl From<ClassificationError> for HandlerError {
    fn from(err: ClassificationError) -> Self {
        HandlerError::Client(err)
    }
}

impl From<SyncError> for HandlerError {
    fn from(err: SyncError) -> Self {
        HandlerError::Server(err)
    }
}

pub struct WebhookRouter {
    gateway: RecordGateway,
    guard: Arc<dyn IdempotencyGuard>,
}

impl WebhookRouter {
    pub fn new(gateway: RecordGateway, guard: Arc<dyn IdempotencyGuard>) -> Self {
        Self { gateway, guard }
    }

    fn area(&self) -> &AreaName {
        &self.gateway.area().name
    }

    fn mapping(&self) -> &ColumnMapping {
        &self.gateway.area().mapping
    }

    /// Route one raw webhook body.
    pub async fn handle(&self, body: &[u8]) -> RouteOutcome {
        let event = match webhook::decode(body) {
            Ok(WebhookPayload::Challenge(challenge)) => {
                tracing::debug!(area = %self.area(), "webhook handshake");
                return RouteOutcome::handshake(challenge);
            }
            Ok(WebhookPayload::Event(event)) => event,
            Err(err) => return self.finish(None, Err(ClassificationError::from(err).into())),
        };

        let Some(kind) = event.kind() else {
            let err = ClassificationError::UnknownEventKind(event.event_type.clone());
            return self.finish(None, Err(err.into()));
        };
        self.transition(RouteState::AwaitingClassification, RouteState::Dispatched(kind));

        let result = match kind {
            EventKind::Create => self.on_create(&event).await,
            EventKind::Update => self.on_update(&event).await,
            EventKind::Rename => self.on_rename(&event).await,
            EventKind::Delete => self.on_delete(&event).await,
        };
        self.finish(Some(kind), result)
    }

    fn transition(&self, from: RouteState, to: RouteState) {
        tracing::trace!(area = %self.area(), ?from, ?to, "webhook state");
    }

    fn finish(&self, kind: Option<EventKind>, result: Result<Value, HandlerError>) -> RouteOutcome {
        let kind_label = kind.map(EventKind::as_str).unwrap_or("unclassified");
        let (status, body, state) = match result {
            Ok(body) => (200, body, RouteState::Done),
            Err(HandlerError::Client(err)) => {
                tracing::warn!(area = %self.area(), kind = kind_label, error = %err, "webhook rejected");
                (400, json!({ "error": err.to_string() }), RouteState::Rejected)
            }
            Err(HandlerError::Server(err)) => {
                tracing::error!(area = %self.area(), kind = kind_label, error = %err, "webhook handler failed");
                (500, json!({ "error": err.to_string() }), RouteState::Rejected)
            }
        };
        let from = kind.map_or(RouteState::AwaitingClassification, RouteState::Dispatched);
        self.transition(from, state);
        RouteOutcome {
            status,
            body,
            state: Some(state),
            kind,
        }
    }

    async fn on_create(&self, event: &BoardEvent) -> Result<Value, HandlerError> {
        let item = item_id(event)?;
        let key = format!("{}:create:{}", self.area(), item);
        if !self.guard.claim(&key)? {
            tracing::info!(area = %self.area(), item = %item, "duplicate create ignored");
            return Ok(json!({ "status": "duplicate" }));
        }

        let mapping = self.mapping();
        let mut join_key = None;
        let mut attributes = BTreeMap::new();
        for (column, value) in &event.column_values {
            if mapping.is_join_column(column) {
                join_key = value.canonical().trim().parse::<i64>().ok().map(RecordId);
                continue;
            }
            if let Some(spec) = mapping.resolve_field(column) {
                attributes.insert(spec.field.clone(), spec.encoding.coerce(value.clone()));
            }
        }

        // Items the reconciliation job created come back as create events.
        if let Some(existing) = self.gateway.find_existing(item, join_key).await? {
            return self.on_known_create(item, existing).await;
        }

        let name = event.item_name.clone().unwrap_or_default();

        let id = self.gateway.create(&name, &attributes, item).await?;
        tracing::info!(area = %self.area(), item = %item, record = ?id.map(|r| r.0), "record created from board");
        Ok(json!({ "status": "created", "id": id.map(|r| r.0) }))
    }

    async fn on_known_create(
        &self,
        item: &ExternalId,
        existing: DomainRecord,
    ) -> Result<Value, HandlerError> {
        match &existing.external_id {
            Some(linked) if linked == item => {}
            Some(linked) => {
                tracing::warn!(
                    area = %self.area(),
                    item = %item,
                    record = %existing.id,
                    linked = %linked,
                    "create names a record linked to another item"
                );
                return Ok(json!({ "status": "ignored" }));
            }
            None => {
                self.gateway.link(existing.id, item).await?;
            }
        }
        tracing::info!(area = %self.area(), item = %item, record = %existing.id, "board create matched an existing record");
        Ok(json!({ "status": "linked", "id": existing.id.0 }))
    }

    async fn on_update(&self, event: &BoardEvent) -> Result<Value, HandlerError> {
        let item = item_id(event)?;
        let refs: Vec<&str> = event.field_refs().collect();
        let Some(first) = refs.first() else {
            return Err(ClassificationError::MissingField.into());
        };

        let mapping = self.mapping();
        if let Some(join) = refs.iter().find(|r| mapping.is_join_column(r)) {
            return Err(ClassificationError::ImmutableField(join.to_string()).into());
        }
        if refs.iter().any(|r| r.eq_ignore_ascii_case("name")) {
            return self.on_rename(event).await;
        }
        let spec = refs
            .iter()
            .find_map(|r| mapping.resolve_field(r))
            .ok_or_else(|| ClassificationError::UnknownField(first.to_string()))?;

        let value = spec
            .encoding
            .coerce(event.value.clone().unwrap_or(FieldValue::Null));
        let affected = self.gateway.update_field(item, &spec.field, &value).await?;
        if affected == 0 {
            tracing::warn!(area = %self.area(), item = %item, field = %spec.field, "update matched no record");
            return Ok(json!({ "status": "ignored" }));
        }
        tracing::info!(area = %self.area(), item = %item, field = %spec.field, "record updated from board");
        Ok(json!({ "status": "updated", "field": spec.field }))
    }

    async fn on_rename(&self, event: &BoardEvent) -> Result<Value, HandlerError> {
        let item = item_id(event)?;
        let name = event
            .value
            .as_ref()
            .map(FieldValue::canonical)
            .filter(|name| !name.is_empty())
            .or_else(|| event.item_name.clone())
            .ok_or(ClassificationError::MissingField)?;

        let affected = self.gateway.rename(item, &name).await?;
        if affected == 0 {
            tracing::warn!(area = %self.area(), item = %item, "rename matched no record");
            return Ok(json!({ "status": "ignored" }));
        }
        Ok(json!({ "status": "updated", "field": "name" }))
    }

    async fn on_delete(&self, event: &BoardEvent) -> Result<Value, HandlerError> {
        let item = item_id(event)?;
        let affected = self.gateway.delete(item).await?;
        tracing::info!(area = %self.area(), item = %item, affected, "record deleted from board");
        Ok(json!({ "status": "deleted", "affected": affected }))
    }
}

fn item_id(event: &BoardEvent) -> Result<&ExternalId, ClassificationError> {
    event.item_id.as_ref().ok_or(ClassificationError::MissingItemId)
}
