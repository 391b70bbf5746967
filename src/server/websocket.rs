//! WebSocket server composition root.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};

use super::listener::Acceptor;
use super::registry::ConnectionRegistry;
use super::sink::{MessageSink, SinkSlot};
use crate::{BridgeError, Result};

/// WebSocket server owning the acceptor and the connection registry.
///
/// Can be started again after [`WebSocketServer::stop`].
pub struct WebSocketServer {
    registry: Arc<ConnectionRegistry>,
    sink: SinkSlot,
    acceptor: Mutex<Option<Acceptor>>,
}

impl Default for WebSocketServer {
    fn default() -> Self {
        Self::new()
    }
}

impl WebSocketServer {
    /// Create a stopped server with an empty registry and no sink.
    pub fn new() -> Self {
        Self {
            registry: Arc::new(ConnectionRegistry::new()),
            sink: SinkSlot::new(),
            acceptor: Mutex::new(None),
        }
    }

    /// Bind `host:port` and start accepting clients.
    ///
    /// Returns the bound address. Fails if the server is already running or
    /// the address cannot be bound.
    pub async fn start(&self, host: &str, port: u16) -> Result<SocketAddr> {
        let mut acceptor = self.acceptor.lock().await;
        if let Some(running) = acceptor.as_ref() {
            return Err(BridgeError::Server(format!(
                "already running on {}",
                running.local_addr()
            )));
        }

        debug!("Starting WebSocket server on {}:{}...", host, port);
        let started =
            Acceptor::start(host, port, Arc::clone(&self.registry), self.sink.clone()).await?;
        let addr = started.local_addr();
        *acceptor = Some(started);
        Ok(addr)
    }

    /// Stop the server and disconnect every client. Does nothing if the
    /// server is not running.
    pub async fn stop(&self) {
        let mut acceptor = self.acceptor.lock().await;
        if let Some(mut running) = acceptor.take() {
            running.stop().await;
            info!("WebSocket server stopped");
        }
    }

    /// Check whether the server is accepting connections.
    pub async fn is_running(&self) -> bool {
        self.acceptor.lock().await.is_some()
    }

    /// Get the bound address while running.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.acceptor.lock().await.as_ref().map(Acceptor::local_addr)
    }

    /// Get the number of clients that completed the handshake.
    pub async fn connection_count(&self) -> usize {
        self.registry.len().await
    }

    /// Send `payload` as a text frame to every connected client.
    ///
    /// Returns the number of clients reached; 0 when stopped.
    pub async fn broadcast(&self, payload: &str) -> usize {
        self.registry.broadcast(payload).await
    }

    /// Install the sink that receives every inbound payload.
    ///
    /// Replacing the sink while clients are sending is best-effort: a
    /// message already being dispatched finishes on the old sink.
    pub fn set_message_sink<S>(&self, sink: S)
    where
        S: MessageSink + 'static,
    {
        self.sink.set(Arc::new(sink));
    }

    /// Remove the current sink. Inbound payloads are then dropped.
    pub fn clear_message_sink(&self) {
        self.sink.clear();
    }

    /// Get a cloneable handle that can only broadcast.
    pub fn broadcaster(&self) -> Broadcaster {
        Broadcaster {
            registry: Arc::clone(&self.registry),
        }
    }
}

/// Broadcast capability handed to event sources.
///
/// Holds no reference to the server itself; after the server stops, the
/// registry is empty and broadcasts reach nobody.
#[derive(Clone)]
pub struct Broadcaster {
    registry: Arc<ConnectionRegistry>,
}

impl Broadcaster {
    /// Send `payload` to every connected client. Returns the number reached.
    pub async fn broadcast(&self, payload: &str) -> usize {
        self.registry.broadcast(payload).await
    }
}
