//! HTTP routes.
//!
//! | Method | Path                  | Handler            |
//! |--------|-----------------------|--------------------|
//! | GET    | `/health`             | liveness probe     |
//! | GET    | `/api/{area}`         | area records       |
//! | POST   | `/api/{area}/webhook` | board notification |
//! | POST   | `/api/{area}/sync`    | reconcile one area |
//! | POST   | `/api/sync`           | reconcile all      |

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use boardsync_store::Row;
use boardsync_sync::{RecordGateway, SyncSummary, WebhookRouter};

use crate::error::ServerError;
use crate::queue::{SyncQueue, SyncTarget};

/// Per-area request handlers.
pub struct AreaHandle {
    pub gateway: RecordGateway,
    pub router: WebhookRouter,
}

#[derive(Clone)]
pub struct AppState {
    areas: Arc<BTreeMap<String, AreaHandle>>,
    queue: SyncQueue,
}

impl AppState {
    pub fn new(areas: Arc<BTreeMap<String, AreaHandle>>, queue: SyncQueue) -> Self {
        Self { areas, queue }
    }

    fn area(&self, name: &str) -> Result<&AreaHandle, ServerError> {
        self.areas
            .get(name)
            .ok_or_else(|| ServerError::UnknownArea(name.to_string()))
    }
}

/// Build the HTTP router. `cors_origin` enables CORS for one browser origin.
pub fn build_router(state: AppState, cors_origin: Option<&str>) -> Result<Router, ServerError> {
    let router = Router::new()
        .route("/health", get(health))
        .route("/api/sync", post(sync_all))
        .route("/api/{area}", get(list_records))
        .route("/api/{area}/webhook", post(webhook))
        .route("/api/{area}/sync", post(sync_area))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    let Some(origin) = cors_origin else {
        return Ok(router);
    };
    let origin = HeaderValue::from_str(origin)
        .map_err(|_| ServerError::InvalidOrigin(origin.to_string()))?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);
    Ok(router.layer(cors))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn list_records(
    State(state): State<AppState>,
    Path(area): Path<String>,
) -> Result<Json<Vec<Row>>, ServerError> {
    let rows = state.area(&area)?.gateway.list_rows().await?;
    Ok(Json(rows))
}

async fn webhook(
    State(state): State<AppState>,
    Path(area): Path<String>,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>), ServerError> {
    let outcome = state.area(&area)?.router.handle(&body).await;
    let status = StatusCode::from_u16(outcome.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    Ok((status, Json(outcome.body)))
}

async fn sync_all(State(state): State<AppState>) -> Result<Json<SyncSummary>, ServerError> {
    let summary = state.queue.enqueue(SyncTarget::All, "http").await?;
    Ok(Json(summary))
}

async fn sync_area(
    State(state): State<AppState>,
    Path(area): Path<String>,
) -> Result<Json<SyncSummary>, ServerError> {
    state.area(&area)?;
    let summary = state.queue.enqueue(SyncTarget::Area(area), "http").await?;
    Ok(Json(summary))
}
