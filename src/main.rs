use anyhow::Context;
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

use oxidized_pipeline::documents::DocumentProcessor;
use oxidized_pipeline::llm::VllmAdapter;
use oxidized_pipeline::queue::{connect_store, Dispatcher, JobStore, LocalForwarder};
use oxidized_pipeline::routes::{create_router, ingest_router, worker_router};
use oxidized_pipeline::types::StoreBackend;
use oxidized_pipeline::utils::init_tracing;
use oxidized_pipeline::{AppState, Config};

#[derive(Parser)]
#[command(name = "oxidized-pipeline", version, about = "Asynchronous document inference job pipeline")]
struct Cli {
    #[command(subcommand)]
    role: Role,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    /// Accept submissions and serve results
    Ingest,
    /// Run inference for jobs posted to /invoke
    Worker,
    /// Drain the job queue into a worker
    Dispatch,
    /// Gateway, worker and dispatcher in one process
    All,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    dotenvy::dotenv().ok();
    let log_dir = std::env::var("LOG_DIR").ok().filter(|d| !d.is_empty()).map(PathBuf::from);
    let _log_guard = init_tracing(log_dir.as_deref());

    let config = Config::from_env()?;
    info!(role = ?cli.role, "Configuration loaded: {:?}", config.server);

    if config.redis.backend == StoreBackend::Memory && cli.role != Role::All {
        anyhow::bail!("STORE_BACKEND=memory only works with the `all` role; separate processes cannot share it");
    }

    let store = connect_store(&config.redis)
        .await
        .context("Failed to connect to job store")?;

    match cli.role {
        Role::Ingest => {
            let app = ingest_router(app_state(&config, store)?);
            serve(app, &config.server.host, config.server.port).await
        }
        Role::Worker => {
            let app = worker_router(app_state(&config, store)?);
            serve(app, &config.server.host, config.server.worker_port).await
        }
        Role::Dispatch => {
            info!(worker_url = %config.worker.worker_url, "Forwarding jobs over HTTP");
            let dispatcher = Dispatcher::over_http(store, &config.worker);

            tokio::select! {
                _ = dispatcher.run() => {}
                _ = shutdown_signal() => {}
            }
            Ok(())
        }
        Role::All => {
            let state = app_state(&config, store)?;
            let dispatcher = Dispatcher::new(
                state.store.clone(),
                Arc::new(LocalForwarder::new(state.invoker.clone())),
                state.config.worker.queue_encoding,
                state.metrics.clone(),
            );
            let handle = tokio::spawn(async move { dispatcher.run().await });

            let result = serve(create_router(state), &config.server.host, config.server.port).await;
            handle.abort();
            result
        }
    }
}

/// Everything the HTTP roles need, including the inference backend
fn app_state(config: &Config, store: Arc<dyn JobStore>) -> anyhow::Result<AppState> {
    let backend = Arc::new(VllmAdapter::new(&config.inference.base_url, config.inference.timeout())?);
    Ok(AppState::new(config.clone(), store, backend, Arc::new(DocumentProcessor::new())))
}

async fn serve(app: axum::Router, host: &str, port: u16) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", host, port))?;
    info!("Server listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
    }
}
