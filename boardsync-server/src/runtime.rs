use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::broadcast;

use boardsync_board::{BoardClient, HttpBoardClient};
use boardsync_core::Config;
use boardsync_store::{RecordStore, SqliteStore};
use boardsync_sync::{guard, IdempotencyGuard, ReconcileJob, RecordGateway, WebhookRouter};

use crate::error::{io_err, ServerError};
use crate::queue::{interval_task, sync_processor_task, SyncQueue};
use crate::routes::{build_router, AppState, AreaHandle};

/// Everything the server needs, wired from one configuration.
pub struct Services {
    pub job: Arc<ReconcileJob>,
    pub areas: Arc<BTreeMap<String, AreaHandle>>,
}

impl Services {
    /// Wire services over explicit collaborators.
    pub fn build(
        config: &Config,
        store: Arc<dyn RecordStore>,
        client: Arc<dyn BoardClient>,
        guard: Arc<dyn IdempotencyGuard>,
    ) -> Self {
        let job = ReconcileJob::from_config(config, store.clone(), client, guard.clone());
        let areas = config
            .areas
            .iter()
            .map(|area| {
                let gateway = RecordGateway::new(store.clone(), area.clone());
                let router = WebhookRouter::new(gateway.clone(), guard.clone());
                (area.name.0.clone(), AreaHandle { gateway, router })
            })
            .collect();
        Self {
            job: Arc::new(job),
            areas: Arc::new(areas),
        }
    }

    /// Open the configured SQLite store, HTTP board client and guard.
    pub fn from_config(config: &Config) -> Result<Self, ServerError> {
        let store = SqliteStore::open(&config.store)?;
        let client = HttpBoardClient::new(&config.board)?;
        let guard = guard::from_config(&config.guard)?;
        Ok(Self::build(config, Arc::new(store), Arc::new(client), guard))
    }
}

/// Install the global tracing subscriber. `RUST_LOG` overrides the default
/// `info` filter.
pub fn init_tracing(json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt().with_env_filter(filter).with_target(false);
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

/// Start the server and block the current thread until it exits.
pub fn start_blocking(config: Config, log_json: bool) -> Result<(), ServerError> {
    init_tracing(log_json);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(config))
}

/// Open the configured services, bind `config.listen` and serve.
pub async fn run(config: Config) -> Result<(), ServerError> {
    let services = Services::from_config(&config)?;
    let listener = TcpListener::bind(&config.listen)
        .await
        .map_err(|e| io_err(&config.listen, e))?;
    tracing::info!(listen = %config.listen, areas = services.areas.len(), "boardsync server listening");
    serve(listener, &config, services).await
}

/// Serve HTTP on `listener` until ctrl-c or a task fails.
pub async fn serve(
    listener: TcpListener,
    config: &Config,
    services: Services,
) -> Result<(), ServerError> {
    let (queue, sync_rx) = SyncQueue::channel(64);
    let (shutdown_tx, _) = broadcast::channel::<()>(16);
    let app = build_router(
        AppState::new(services.areas.clone(), queue.clone()),
        config.cors_origin.as_deref(),
    )?;

    let processor_handle = {
        let shutdown = shutdown_tx.clone();
        let job = services.job.clone();
        tokio::spawn(async move {
            let result = sync_processor_task(job, sync_rx, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let interval_handle = {
        let shutdown = shutdown_tx.clone();
        let period = config.sync_interval_secs.filter(|secs| *secs > 0);
        tokio::spawn(async move {
            let Some(secs) = period else {
                return Ok(());
            };
            tracing::info!(interval_secs = secs, "periodic sync enabled");
            let result = interval_task(queue, Duration::from_secs(secs), shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let http_handle = {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            let mut shutdown_rx = shutdown.subscribe();
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.recv().await;
                })
                .await
                .map_err(|e| io_err("http server", e));
            let _ = shutdown.send(());
            result
        })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            let mut shutdown_rx = shutdown.subscribe();
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = tokio::signal::ctrl_c() => match signal {
                    Ok(()) => {
                        tracing::info!("received ctrl-c, shutting down");
                        let _ = shutdown.send(());
                        Ok(())
                    }
                    Err(err) => Err(ServerError::Signal(err.to_string())),
                },
            }
        })
    };

    let (processor_result, interval_result, http_result, signal_result) =
        tokio::join!(processor_handle, interval_handle, http_handle, signal_handle);

    handle_join("sync_processor", processor_result)?;
    handle_join("interval", interval_result)?;
    handle_join("http", http_result)?;
    handle_join("signal_handler", signal_result)?;
    tracing::info!("boardsync server stopped");
    Ok(())
}

fn handle_join(
    task: &'static str,
    result: Result<Result<(), ServerError>, tokio::task::JoinError>,
) -> Result<(), ServerError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(ServerError::Join {
            task,
            reason: err.to_string(),
        }),
    }
}
