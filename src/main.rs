//! Tabletop Sync Server
//!
//! Binary entry point: wires a state store, the session registry and the
//! sync engine together, then serves WebSocket sync and HTTP CRUD.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tabletop_sync::network::{ServerConfig, SessionRegistry, SyncEngine, SyncServer};
use tabletop_sync::store::{JsonFileStore, MemoryStore, StateStore};
use tabletop_sync::{http, TOKEN_TTL_SECS, VERSION};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    info!("Tabletop Sync Server v{}", VERSION);
    info!("Token TTL: {}s", TOKEN_TTL_SECS);

    let store: Arc<dyn StateStore> = match std::env::var("SYNC_DATA_DIR") {
        Ok(dir) => {
            info!("Persisting boards to {}", dir);
            Arc::new(
                JsonFileStore::open(&dir)
                    .await
                    .with_context(|| format!("opening data dir {dir}"))?,
            )
        }
        Err(_) => {
            info!("No SYNC_DATA_DIR set, running with in-memory store");
            Arc::new(MemoryStore::new())
        }
    };

    let registry = Arc::new(SessionRegistry::new());
    let engine = Arc::new(SyncEngine::new(store.clone(), registry.clone()));

    let config = ServerConfig::from_env();
    let sync_server = SyncServer::new(config, engine, registry);

    let http_addr: SocketAddr = std::env::var("SYNC_HTTP_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:8091".to_string())
        .parse()
        .context("parsing SYNC_HTTP_ADDR")?;
    let http_listener = tokio::net::TcpListener::bind(http_addr)
        .await
        .with_context(|| format!("binding HTTP listener on {http_addr}"))?;
    info!("HTTP API listening on {}", http_addr);

    let api = http::router(store);
    let http_task = tokio::spawn(async move {
        if let Err(e) = axum::serve(http_listener, api).await {
            tracing::error!("HTTP server failed: {e}");
        }
    });

    tokio::select! {
        result = sync_server.run() => {
            result.context("sync server failed")?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupt received, shutting down");
            sync_server.shutdown();
        }
    }

    http_task.abort();
    Ok(())
}
