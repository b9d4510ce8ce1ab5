//! Socket server lifecycle
//!
//! Binds the listener, runs the accept loop, and exposes the send primitives
//! the dashboard uses. It knows nothing about files or rate limits: requests
//! that are not protocol housekeeping go to the [`RequestHandler`] supplied at
//! start.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::config::DashboardConfig;
use crate::error::{DashboardError, Result};
use crate::socket_server::connection::{handle_connection, ConnectionContext};
use crate::socket_server::protocol::{Message, RequestFrame};
use crate::socket_server::registry::{ClientId, ClientInfo, ClientRegistry, FanOut};

/// Answers application-level requests (`type: request`)
pub trait RequestHandler: Send + Sync + 'static {
    /// Produce the `response` or `error` envelope for a request
    fn handle_request(&self, client_id: &str, request: &RequestFrame) -> Message;
}

/// Socket server settings
#[derive(Debug, Clone)]
pub struct SocketServerConfig {
    pub host: String,
    pub port: u16,
    pub client_buffer_size: usize,
    pub write_timeout: Duration,
    /// Channels advertised in the welcome frame
    pub channels: Vec<String>,
}

impl Default for SocketServerConfig {
    fn default() -> Self {
        Self::from(&DashboardConfig::default())
    }
}

impl From<&DashboardConfig> for SocketServerConfig {
    fn from(config: &DashboardConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            client_buffer_size: config.client_buffer_size,
            write_timeout: config.write_timeout(),
            channels: Vec::new(),
        }
    }
}

struct RunningServer {
    cancel: CancellationToken,
    accept_task: JoinHandle<()>,
}

/// WebSocket server with a client registry and fan-out primitives
pub struct SocketServer {
    config: SocketServerConfig,
    registry: Arc<ClientRegistry>,
    running: tokio::sync::Mutex<Option<RunningServer>>,
    local_addr: parking_lot::Mutex<Option<SocketAddr>>,
}

impl SocketServer {
    pub fn new(config: SocketServerConfig) -> Self {
        Self {
            config,
            registry: Arc::new(ClientRegistry::new()),
            running: tokio::sync::Mutex::new(None),
            local_addr: parking_lot::Mutex::new(None),
        }
    }

    /// Bind and start accepting connections.
    ///
    /// Fails if the address cannot be bound. Calling it while running returns
    /// the existing address.
    pub async fn start(&self, handler: Arc<dyn RequestHandler>) -> Result<SocketAddr> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            if let Some(addr) = *self.local_addr.lock() {
                return Ok(addr);
            }
        }

        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| DashboardError::bind(&addr, e))?;
        let local_addr = listener.local_addr()?;

        let cancel = CancellationToken::new();
        let ctx = Arc::new(ConnectionContext {
            registry: Arc::clone(&self.registry),
            handler,
            cancel: cancel.clone(),
            buffer_size: self.config.client_buffer_size,
            write_timeout: self.config.write_timeout,
            channels: self.config.channels.clone(),
        });
        let accept_task = tokio::spawn(accept_loop(listener, ctx));

        tracing::info!("Socket server listening on ws://{}", local_addr);
        *running = Some(RunningServer {
            cancel,
            accept_task,
        });
        *self.local_addr.lock() = Some(local_addr);
        Ok(local_addr)
    }

    /// Close every client connection, then the listener. No-op when stopped.
    pub async fn stop(&self) {
        let Some(server) = self.running.lock().await.take() else {
            return;
        };
        server.cancel.cancel();
        if let Err(e) = server.accept_task.await {
            tracing::error!("Accept loop ended abnormally: {}", e);
        }
        let leftover = self.registry.clear();
        if leftover > 0 {
            tracing::warn!("Dropped {} registry entries left after shutdown", leftover);
        }
        *self.local_addr.lock() = None;
        tracing::info!("Socket server stopped");
    }

    /// Signal the accept loop and every connection to shut down without
    /// waiting for them. Used when the owner is dropped while running.
    pub fn cancel(&self) {
        if let Ok(mut running) = self.running.try_lock() {
            if let Some(server) = running.take() {
                server.cancel.cancel();
            }
        }
        *self.local_addr.lock() = None;
    }

    pub fn is_running(&self) -> bool {
        self.local_addr.lock().is_some()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock()
    }

    pub fn registry(&self) -> &Arc<ClientRegistry> {
        &self.registry
    }

    pub fn client_count(&self) -> usize {
        self.registry.len()
    }

    pub fn clients(&self) -> Vec<ClientInfo> {
        self.registry.clients()
    }

    /// Send to a single client
    pub fn send_to(&self, client_id: &str, message: &Message) -> bool {
        self.registry.send_to(client_id, &message.to_json())
    }

    /// Send to every client, or only those subscribed to `channel`
    pub fn broadcast(&self, message: &Message, channel: Option<&str>) -> FanOut {
        self.registry.broadcast(&message.to_json(), channel)
    }

    /// Send to the named clients regardless of subscriptions
    pub fn send_to_many(&self, client_ids: &[ClientId], message: &Message) -> FanOut {
        self.registry.send_to_many(client_ids, &message.to_json())
    }
}

impl Drop for SocketServer {
    fn drop(&mut self) {
        if let Some(server) = self.running.get_mut().take() {
            server.cancel.cancel();
        }
    }
}

async fn accept_loop(listener: TcpListener, ctx: Arc<ConnectionContext>) {
    let mut connections = JoinSet::new();
    loop {
        tokio::select! {
            _ = ctx.cancel.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    tracing::debug!("Accepted connection from {}", addr);
                    connections.spawn(handle_connection(stream, addr, Arc::clone(&ctx)));
                }
                Err(e) => {
                    tracing::error!("Failed to accept connection: {}", e);
                }
            },
            Some(finished) = connections.join_next(), if !connections.is_empty() => {
                if let Err(e) = finished {
                    tracing::error!("Connection task failed: {}", e);
                }
            }
        }
    }

    while let Some(finished) = connections.join_next().await {
        if let Err(e) = finished {
            tracing::error!("Connection task failed during shutdown: {}", e);
        }
    }
    drop(listener);
}
