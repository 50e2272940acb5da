//! Server lifecycle
//!
//! The server binds synchronously so the caller learns about port conflicts
//! immediately, then serves on a dedicated thread running a current-thread
//! tokio runtime. Pipeline code only ever touches the shared `ModelStore`.

use crate::http::handle;
use crate::store::ModelStore;
use glbridge_core::{Error, Result};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Default port for the model server
pub const DEFAULT_PORT: u16 = 8080;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    /// 0 picks a free port
    pub port: u16,
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            max_upload_bytes: 512 * 1024 * 1024,
        }
    }
}

impl ServerConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    pub fn with_max_upload_bytes(mut self, max_upload_bytes: usize) -> Self {
        self.max_upload_bytes = max_upload_bytes;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::Config("server host must not be empty".into()));
        }
        if self.max_upload_bytes == 0 {
            return Err(Error::Config("max_upload_bytes must be positive".into()));
        }
        Ok(())
    }
}

pub struct ModelServer;

impl ModelServer {
    /// Bind and start serving `store` in the background
    pub fn start(config: ServerConfig, store: Arc<ModelStore>) -> Result<ServerHandle> {
        config.validate()?;
        let listener = std::net::TcpListener::bind((config.host.as_str(), config.port))
            .map_err(|e| Error::ServerIo(format!("failed to bind {}:{}: {}", config.host, config.port, e)))?;
        listener
            .set_nonblocking(true)
            .map_err(|e| Error::ServerIo(e.to_string()))?;
        let addr = listener
            .local_addr()
            .map_err(|e| Error::ServerIo(e.to_string()))?;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| Error::ServerIo(format!("failed to create runtime: {}", e)))?;

        let (shutdown_tx, shutdown_rx) = broadcast::channel::<()>(1);
        let max_upload = config.max_upload_bytes;
        let served = Arc::clone(&store);
        let thread = std::thread::Builder::new()
            .name("glbridge-server".into())
            .spawn(move || {
                runtime.block_on(async move {
                    match TcpListener::from_std(listener) {
                        Ok(listener) => serve(listener, served, max_upload, shutdown_rx).await,
                        Err(e) => error!(error = %e, "failed to register listener"),
                    }
                });
            })
            .map_err(|e| Error::ServerIo(format!("failed to spawn server thread: {}", e)))?;

        info!(%addr, "model server listening");
        Ok(ServerHandle {
            addr,
            store,
            shutdown_tx: Some(shutdown_tx),
            thread: Some(thread),
        })
    }

    /// Serve until Ctrl+C, then shut down cleanly
    pub fn run(config: ServerConfig, store: Arc<ModelStore>) -> Result<()> {
        let handle = Self::start(config, store)?;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| Error::ServerIo(format!("failed to create runtime: {}", e)))?;
        runtime.block_on(tokio::signal::ctrl_c())?;
        info!("shutting down");
        handle.shutdown();
        Ok(())
    }
}

async fn serve(
    listener: TcpListener,
    store: Arc<ModelStore>,
    max_upload: usize,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        tokio::spawn(handle_connection(stream, peer, Arc::clone(&store), max_upload));
                    }
                    Err(e) => warn!(error = %e, "accept failed"),
                }
            }
            _ = shutdown_rx.recv() => {
                debug!("server loop stopped");
                break;
            }
        }
    }
}

async fn handle_connection(stream: TcpStream, peer: SocketAddr, store: Arc<ModelStore>, max_upload: usize) {
    let service = service_fn(move |request| {
        let store = Arc::clone(&store);
        async move { Ok::<_, Infallible>(handle(request, &store, max_upload).await) }
    });
    let connection = http1::Builder::new()
        .keep_alive(false)
        .serve_connection(TokioIo::new(stream), service);

    match tokio::time::timeout(REQUEST_TIMEOUT, connection).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!(%peer, error = %e, "connection dropped"),
        Err(_) => debug!(%peer, "request timed out"),
    }
}

/// Running server; dropping it stops the server
pub struct ServerHandle {
    addr: SocketAddr,
    store: Arc<ModelStore>,
    shutdown_tx: Option<broadcast::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn store(&self) -> &Arc<ModelStore> {
        &self.store
    }

    /// Stop serving, wait for the server thread and clear the store
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("server thread panicked");
            }
            self.store.clear();
            info!(addr = %self.addr, "model server stopped");
        }
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
