//! API server lifecycle — starts/stops the axum HTTP server.
//!
//! Pattern: bind → spawn background task → return handle with shutdown
//! channel. The handle owns the bound address, so callers (and tests) can
//! bind to port 0 and discover the actual port afterwards.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::oneshot;

use crate::api::router::api_router;
use crate::lifecycle::PipelineService;

/// Handle to a running API server.
pub struct ApiServer {
    pub addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl ApiServer {
    /// Shut down the server gracefully. Safe to call more than once.
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
            tracing::info!("API server shutdown signal sent");
        }
    }
}

/// Bind the given address and serve the API in a background task.
pub async fn start_api_server(
    service: Arc<PipelineService>,
    addr: SocketAddr,
) -> Result<ApiServer, std::io::Error> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let addr = listener.local_addr()?;
    tracing::info!(%addr, "API server binding");

    let app = api_router(service);
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    tokio::spawn(async move {
        let shutdown_signal = async move {
            let _ = shutdown_rx.await;
            tracing::info!("API server received shutdown signal");
        };

        tracing::info!(%addr, "API server started");

        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await
        {
            tracing::error!("API server error: {e}");
        }

        tracing::info!("API server stopped");
    });

    Ok(ApiServer {
        addr,
        shutdown_tx: Some(shutdown_tx),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::stages::standard_stages;
    use crate::pipeline::{Aggregator, PipelineExecutor};
    use crate::provider::StaticDocumentProvider;
    use crate::store::{MemoryRunStore, RunStore};

    fn test_service() -> Arc<PipelineService> {
        let store: Arc<dyn RunStore> = Arc::new(MemoryRunStore::new());
        let executor = Arc::new(PipelineExecutor::new(
            store.clone(),
            standard_stages(Box::new(StaticDocumentProvider::new())),
            Aggregator::default(),
        ));
        Arc::new(PipelineService::new(store, executor))
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn start_and_stop_server() {
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let mut server = start_api_server(test_service(), addr)
            .await
            .expect("server should start");

        assert!(server.addr.port() > 0);

        let url = format!("http://{}/api/health", server.addr);
        let resp = tokio::task::spawn_blocking(move || reqwest::blocking::get(url))
            .await
            .unwrap()
            .unwrap();
        assert!(resp.status().is_success());

        server.shutdown();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn shutdown_is_idempotent() {
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let mut server = start_api_server(test_service(), addr)
            .await
            .expect("server should start");

        server.shutdown();
        server.shutdown();
    }
}
