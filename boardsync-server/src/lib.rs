//! HTTP ingress for boardsync: webhook receivers, sync triggers, read routes
//! and the periodic sync timer.

mod error;
mod queue;
mod routes;
mod runtime;

pub use error::ServerError;
pub use queue::{SyncQueue, SyncTarget};
pub use routes::{build_router, AppState, AreaHandle};
pub use runtime::{init_tracing, run, serve, start_blocking, Services};
