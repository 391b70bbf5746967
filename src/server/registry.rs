//! Registry of open WebSocket connections.

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{watch, Mutex};
use tracing::{debug, warn};
use uuid::Uuid;

use super::frame::encode_text;

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// The sending side of an open connection.
///
/// Shared between the connection's own handler task and broadcasters.
pub struct Connection {
    /// Unique connection identifier.
    id: Uuid,
    /// Remote peer address.
    peer_addr: SocketAddr,
    /// Write half of the transport.
    writer: Mutex<BoxedWriter>,
    /// Set once the connection has been closed.
    closed: watch::Sender<bool>,
}

impl Connection {
    /// Wrap the write half of a transport.
    pub fn new<W>(peer_addr: SocketAddr, writer: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let (closed, _) = watch::channel(false);
        Self {
            id: Uuid::new_v4(),
            peer_addr,
            writer: Mutex::new(Box::new(writer)),
            closed,
        }
    }

    /// Get the connection ID.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Get the peer address.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Check whether the connection has been closed.
    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Write an already encoded frame.
    ///
    /// A partial write is reported as an error like any other failure.
    pub async fn send_frame(&self, frame: &[u8]) -> io::Result<()> {
        if self.is_closed() {
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "connection closed",
            ));
        }
        let mut writer = self.writer.lock().await;
        writer.write_all(frame).await?;
        writer.flush().await
    }

    /// Close the connection.
    ///
    /// Wakes the handler task waiting in [`Connection::closed`]. The write
    /// half is shut down unless a send currently holds it, in which case the
    /// transport is released when the last reference is dropped. Closing an
    /// already closed connection does nothing.
    pub async fn close(&self) {
        if self.closed.send_replace(true) {
            return;
        }
        debug!("Closing connection {} ({})", self.id, self.peer_addr);

        if let Ok(mut writer) = self.writer.try_lock() {
            if let Err(e) = writer.shutdown().await {
                debug!("Shutdown of connection {} failed: {}", self.id, e);
            }
        }
    }

    /// Wait until the connection is closed.
    pub async fn closed(&self) {
        let mut rx = self.closed.subscribe();
        // The sender lives in `self`, so the channel cannot be dropped here.
        let _ = rx.wait_for(|closed| *closed).await;
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("peer_addr", &self.peer_addr)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Thread-safe set of connections that completed their handshake.
///
/// Add, remove and broadcast are serialized by one lock. Broadcast holds it
/// for the whole send pass, so a stalled peer delays every other operation.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: Mutex<HashMap<Uuid, Arc<Connection>>>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection. Returns the new member count.
    pub async fn add(&self, connection: Arc<Connection>) -> usize {
        let mut connections = self.connections.lock().await;
        connections.insert(connection.id(), connection);
        connections.len()
    }

    /// Unregister a connection, returning it if it was present.
    pub async fn remove(&self, id: Uuid) -> Option<Arc<Connection>> {
        self.connections.lock().await.remove(&id)
    }

    /// Get the number of registered connections.
    pub async fn len(&self) -> usize {
        self.connections.lock().await.len()
    }

    /// Check whether no connection is registered.
    pub async fn is_empty(&self) -> bool {
        self.connections.lock().await.is_empty()
    }

    /// Send `payload` as a text frame to every registered connection.
    ///
    /// Connections whose send fails are removed and closed after the pass.
    /// Returns the number of connections the frame was delivered to.
    pub async fn broadcast(&self, payload: &str) -> usize {
        let mut connections = self.connections.lock().await;
        if connections.is_empty() {
            return 0;
        }

        let frame = encode_text(payload.as_bytes());
        let mut failed = Vec::new();

        for (id, connection) in connections.iter() {
            if let Err(e) = connection.send_frame(&frame).await {
                warn!(
                    "Broadcast to {} ({}) failed: {}",
                    id,
                    connection.peer_addr(),
                    e
                );
                failed.push(*id);
            }
        }

        let delivered = connections.len() - failed.len();
        for id in failed {
            if let Some(connection) = connections.remove(&id) {
                connection.close().await;
            }
        }

        delivered
    }

    /// Close and unregister every connection. Returns how many were closed.
    pub async fn close_all(&self) -> usize {
        let mut connections = self.connections.lock().await;
        let count = connections.len();
        for (_, connection) in connections.drain() {
            connection.close().await;
        }
        count
    }
}
