//! Server Lifecycle
//!
//! Binds a store stack to a listening socket and runs the accept loop:
//!
//! ```text
//! stopped ──start()──> listening ──stop()──> stopped
//! ```
//!
//! `start` returns once the listener is bound and accepting; `stop` stops
//! accepting, wakes every idle session, drains in-flight replies, and
//! returns once the endpoint is released. Both are safe to call from a
//! task other than the one running the accept loop, and `stop` is
//! idempotent.
//!
//! The store is injected rather than global, so several independent
//! servers (each with its own stack, each on its own port) can coexist in
//! one process.

use crate::commands::CommandHandler;
use crate::connection::{handle_connection, ConnectionStats};
use crate::storage::{
    shared, ExpiryStore, MemoryStore, PersistentStore, SharedStore, StoreError,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{error, info};

/// Errors from server construction and lifecycle transitions.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Binding the listening endpoint failed
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// `start` was called while already listening
    #[error("server is already running")]
    AlreadyRunning,

    /// The persistence layer could not establish its starting state
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Server construction parameters.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on (0 picks a free port)
    pub port: u16,
    /// Default time-to-live stamped on every SET. `None` disables the
    /// expiry layer entirely; `Some(Duration::ZERO)` keeps the layer but
    /// entries never expire.
    pub default_ttl: Option<Duration>,
    /// Snapshot file path; `None` disables the persistence layer
    pub persistence: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6379,
            default_ttl: None,
            persistence: None,
        }
    }
}

impl ServerConfig {
    /// Returns the bind address as a string.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// A key-value server bound to one store stack.
pub struct Server {
    config: ServerConfig,
    store: SharedStore,
    stats: Arc<ConnectionStats>,
    shutdown_tx: broadcast::Sender<()>,
    accept_task: Option<JoinHandle<()>>,
    local_addr: Option<SocketAddr>,
}

impl Server {
    /// Builds the store stack described by `config`.
    ///
    /// All four combinations are possible: base only, expiry only,
    /// persistence over base, persistence over expiry.
    ///
    /// # Errors
    ///
    /// Fails if a configured snapshot file exists but cannot be loaded.
    pub fn new(config: ServerConfig) -> Result<Self, ServerError> {
        let store: SharedStore = match (config.default_ttl, config.persistence.as_ref()) {
            (None, None) => shared(MemoryStore::new()),
            (Some(ttl), None) => shared(ExpiryStore::new(MemoryStore::new(), ttl)),
            (None, Some(path)) => shared(PersistentStore::new(MemoryStore::new(), path)?),
            (Some(ttl), Some(path)) => shared(PersistentStore::new(
                ExpiryStore::new(MemoryStore::new(), ttl),
                path,
            )?),
        };

        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(Self {
            config,
            store,
            stats: Arc::new(ConnectionStats::new()),
            shutdown_tx,
            accept_task: None,
            local_addr: None,
        })
    }

    /// Binds the endpoint and starts accepting connections.
    ///
    /// Returns the bound address once the server is listening.
    pub async fn start(&mut self) -> Result<SocketAddr, ServerError> {
        if self.accept_task.is_some() {
            return Err(ServerError::AlreadyRunning);
        }

        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr)
            .await
            .map_err(|e| ServerError::Bind {
                addr: bind_addr.clone(),
                source: e,
            })?;
        let local_addr = listener.local_addr().map_err(|e| ServerError::Bind {
            addr: bind_addr,
            source: e,
        })?;

        info!(addr = %local_addr, "Server listening");

        let handler = CommandHandler::new(Arc::clone(&self.store));
        let stats = Arc::clone(&self.stats);
        let shutdown_tx = self.shutdown_tx.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        self.local_addr = Some(local_addr);
        self.accept_task = Some(tokio::spawn(async move {
            let mut sessions = JoinSet::new();

            loop {
                tokio::select! {
                    result = listener.accept() => match result {
                        Ok((stream, addr)) => {
                            sessions.spawn(handle_connection(
                                stream,
                                addr,
                                handler.clone(),
                                Arc::clone(&stats),
                                shutdown_tx.subscribe(),
                            ));
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                        }
                    },
                    _ = shutdown_rx.recv() => {
                        info!("Stop requested, draining connections");
                        break;
                    }
                }
            }

            // Release the endpoint before waiting out in-flight replies
            drop(listener);
            // A session spawned in the same select round as the stop signal
            // subscribes too late to see it; signal again now that no new
            // subscriptions can happen
            let _ = shutdown_tx.send(());
            while sessions.join_next().await.is_some() {}
            info!("All connections drained");
        }));

        Ok(local_addr)
    }

    /// Stops accepting, drains in-flight replies, releases the endpoint.
    ///
    /// Idempotent: calling `stop` on a stopped server does nothing.
    pub async fn stop(&mut self) {
        let Some(task) = self.accept_task.take() else {
            return;
        };

        // No receivers means the accept loop is already gone
        let _ = self.shutdown_tx.send(());
        let _ = task.await;
        self.local_addr = None;
        info!("Server stopped");
    }

    /// The bound address while listening, `None` when stopped.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Connection statistics for this server.
    pub fn stats(&self) -> &Arc<ConnectionStats> {
        &self.stats
    }

    /// Returns true while the accept loop is running.
    pub fn is_running(&self) -> bool {
        self.accept_task.is_some()
    }
}
