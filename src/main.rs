use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use inventio::api::start_api_server;
use inventio::config;
use inventio::pipeline::stages::standard_stages;
use inventio::pipeline::{Aggregator, PipelineExecutor};
use inventio::provider::HttpDocumentProvider;
use inventio::store::{MemoryRunStore, RunStore, SqliteRunStore};
use inventio::PipelineService;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let store: Arc<dyn RunStore> = match config::database_path() {
        Some(path) => {
            tracing::info!(path = %path.display(), "using sqlite run store");
            Arc::new(SqliteRunStore::open(&path)?)
        }
        None => {
            tracing::warn!("using in-memory run store; runs will not survive restart");
            Arc::new(MemoryRunStore::new())
        }
    };

    let provider =
        HttpDocumentProvider::new(Duration::from_secs(config::fetch_timeout_secs()))?;
    let executor = Arc::new(PipelineExecutor::new(
        store.clone(),
        standard_stages(Box::new(provider)),
        Aggregator::default(),
    ));
    let service = Arc::new(PipelineService::new(store, executor));

    let server = start_api_server(service, config::bind_addr()).await?;
    tracing::info!(addr = %server.addr, "ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    Ok(())
}
