//! WebSocket Sync Server
//!
//! Accepts client connections, runs one receive loop per connection, and
//! hands every decoded event to the sync engine. All outbound delivery
//! happens on a per-connection sender task fed by the registry.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio::time::interval;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, instrument, warn};

use crate::board::ConnectionId;
use crate::network::engine::SyncEngine;
use crate::network::protocol::{ClientEvent, ServerEvent};
use crate::network::rate_limit::RateLimiter;
use crate::network::registry::SessionRegistry;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address for the WebSocket listener.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Idle timeout before a silent connection is dropped.
    pub idle_timeout: Duration,
    /// Per-connection inbound event budget (events per second).
    pub events_per_second: u32,
    /// Server version string.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8090".parse().unwrap(),
            max_connections: 1000,
            idle_timeout: Duration::from_secs(300),
            events_per_second: 60,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl ServerConfig {
    /// Build a config from environment variables, falling back to
    /// defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind_addr: std::env::var("SYNC_BIND_ADDR")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.bind_addr),
            max_connections: std::env::var("SYNC_MAX_CONNECTIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_connections),
            idle_timeout: std::env::var("SYNC_IDLE_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.idle_timeout),
            events_per_second: std::env::var("SYNC_EVENTS_PER_SECOND")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.events_per_second),
            version: defaults.version,
        }
    }
}

/// Sync server errors.
#[derive(Debug, thiserror::Error)]
pub enum SyncServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

/// The WebSocket sync server.
pub struct SyncServer {
    config: ServerConfig,
    engine: Arc<SyncEngine>,
    registry: Arc<SessionRegistry>,
    shutdown_tx: broadcast::Sender<()>,
}

impl SyncServer {
    /// Create a server around a shared engine and registry.
    pub fn new(
        config: ServerConfig,
        engine: Arc<SyncEngine>,
        registry: Arc<SessionRegistry>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            engine,
            registry,
            shutdown_tx,
        }
    }

    /// Run the accept loop until shutdown.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), SyncServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        info!("Sync server listening on {}", self.config.bind_addr);

        let cleanup_registry = self.registry.clone();
        let cleanup_engine = self.engine.clone();
        let idle_timeout = self.config.idle_timeout;
        let cleanup_handle = tokio::spawn(async move {
            Self::run_cleanup_loop(cleanup_registry, cleanup_engine, idle_timeout).await;
        });

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            if self.registry.connection_count().await >= self.config.max_connections {
                                warn!("Connection limit reached, rejecting {}", addr);
                                continue;
                            }
                            debug!("New connection from {}", addr);
                            self.handle_connection(stream, addr);
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        cleanup_handle.abort();
        Ok(())
    }

    /// Spawn the per-connection tasks.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let engine = self.engine.clone();
        let registry = self.registry.clone();
        let events_per_second = self.config.events_per_second;
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let ws_stream = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    error!("WebSocket handshake failed for {}: {}", addr, e);
                    return;
                }
            };

            let (mut ws_sender, mut ws_receiver) = ws_stream.split();
            let (event_tx, mut event_rx) = mpsc::channel::<ServerEvent>(64);

            let conn = ConnectionId::random();
            engine.handle_connect(conn, event_tx.clone()).await;
            info!(conn = %conn, addr = %addr, "client connected");

            // Outbound: serialize engine events onto the socket.
            let sender_task = tokio::spawn(async move {
                while let Some(event) = event_rx.recv().await {
                    let text = match event.to_json() {
                        Ok(t) => t,
                        Err(e) => {
                            error!("Failed to serialize event: {}", e);
                            continue;
                        }
                    };
                    if ws_sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
            });

            let mut limiter =
                RateLimiter::new(events_per_second, Duration::from_secs(1));

            // Inbound: decode, rate-limit, dispatch.
            loop {
                tokio::select! {
                    msg = ws_receiver.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                let event = match ClientEvent::from_json(&text) {
                                    Ok(event) => event,
                                    Err(e) => {
                                        debug!("Invalid event from {}: {}", conn, e);
                                        let _ = event_tx.send(ServerEvent::Error {
                                            message: "invalid event format".to_string(),
                                        }).await;
                                        continue;
                                    }
                                };

                                if !limiter.check_and_consume() {
                                    // Drags are fire-and-forget; everything
                                    // else gets told it was dropped.
                                    if !matches!(event, ClientEvent::DragPiece { .. }) {
                                        let _ = event_tx.send(ServerEvent::Error {
                                            message: "rate limited".to_string(),
                                        }).await;
                                    }
                                    continue;
                                }

                                registry.touch(conn).await;
                                engine.handle_event(conn, event).await;
                            }
                            Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                                registry.touch(conn).await;
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                debug!("Client {} disconnected", conn);
                                break;
                            }
                            Some(Err(e)) => {
                                debug!("WebSocket error for {}: {}", conn, e);
                                break;
                            }
                            _ => {}
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }

            sender_task.abort();
            engine.handle_disconnect(conn).await;
            info!(conn = %conn, "client cleaned up");
        });
    }

    /// Periodically drop connections that have gone silent.
    async fn run_cleanup_loop(
        registry: Arc<SessionRegistry>,
        engine: Arc<SyncEngine>,
        idle_timeout: Duration,
    ) {
        let mut ticker = interval(Duration::from_secs(60));
        loop {
            ticker.tick().await;
            for conn in registry.idle_connections(idle_timeout).await {
                info!(conn = %conn, "removing idle connection");
                engine.handle_disconnect(conn).await;
            }
        }
    }

    /// Signal shutdown to the accept loop and every connection task.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Get active connection count.
    pub async fn connection_count(&self) -> usize {
        self.registry.connection_count().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn test_server(bind: &str) -> SyncServer {
        let store = Arc::new(MemoryStore::new());
        let registry = Arc::new(SessionRegistry::new());
        let engine = Arc::new(SyncEngine::new(store, registry.clone()));
        let config = ServerConfig {
            bind_addr: bind.parse().unwrap(),
            ..Default::default()
        };
        SyncServer::new(config, engine, registry)
    }

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.max_connections, 1000);
        assert_eq!(config.events_per_second, 60);
    }

    #[tokio::test]
    async fn test_server_creation() {
        let server = test_server("127.0.0.1:0");
        assert_eq!(server.connection_count().await, 0);
    }

    #[tokio::test]
    async fn test_server_shutdown() {
        let server = test_server("127.0.0.1:0");
        server.shutdown();
        // Should not panic
    }
}
