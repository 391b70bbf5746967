//! Per-connection handler.
//!
//! Each accepted socket is driven by one [`ConnectionHandler::run`] task:
//! handshake, registration, frame loop, teardown.

use std::io::Cursor;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

use super::frame::{read_frame, FrameError, Message};
use super::handshake;
use super::registry::{Connection, ConnectionRegistry};
use super::sink::SinkSlot;

/// Lifecycle of a single connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Waiting for the upgrade request.
    #[default]
    Connecting,
    /// Handshake done, exchanging frames.
    Open,
    /// Leaving the registry and closing the transport.
    Closing,
    /// Done.
    Closed,
}

/// Why the frame loop ended.
#[derive(Debug)]
enum CloseReason {
    /// The peer sent a close frame.
    CloseFrame,
    /// The connection was closed locally (shutdown or broadcast failure).
    Local,
    /// Reading a frame failed.
    Frame(FrameError),
}

/// Shared state every connection task needs.
#[derive(Clone)]
pub struct ConnectionHandler {
    registry: Arc<ConnectionRegistry>,
    sink: SinkSlot,
    shutdown: watch::Receiver<bool>,
}

impl ConnectionHandler {
    /// Create a handler bound to a registry, a sink slot and the server's
    /// shutdown signal.
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        sink: SinkSlot,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            registry,
            sink,
            shutdown,
        }
    }

    /// Drive one connection until it ends. Returns the final state.
    pub async fn run<S>(mut self, stream: S, peer_addr: SocketAddr) -> ConnectionState
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (mut reader, mut writer) = tokio::io::split(stream);
        let mut state = ConnectionState::Connecting;

        let accepted = tokio::select! {
            biased;
            _ = wait_for_shutdown(&mut self.shutdown) => {
                debug!("Server stopping, abandoning handshake with {}", peer_addr);
                shutdown_writer(&mut writer, peer_addr).await;
                transition(&mut state, ConnectionState::Closed, peer_addr);
                return state;
            }
            result = handshake::accept(&mut reader, &mut writer) => result,
        };

        let accepted = match accepted {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!("WebSocket handshake with {} failed: {}", peer_addr, e);
                shutdown_writer(&mut writer, peer_addr).await;
                transition(&mut state, ConnectionState::Closed, peer_addr);
                return state;
            }
        };
        trace!(
            "Handshake with {} complete (path {})",
            peer_addr,
            accepted.request.path
        );

        let connection = Arc::new(Connection::new(peer_addr, writer));
        let total = self.registry.add(Arc::clone(&connection)).await;
        transition(&mut state, ConnectionState::Open, peer_addr);

        // Stop raises the flag before closing the registry, so a connection
        // added after that sweep is caught here.
        if *self.shutdown.borrow() {
            debug!("Server stopped while registering {}", peer_addr);
            transition(&mut state, ConnectionState::Closing, peer_addr);
            self.registry.remove(connection.id()).await;
            connection.close().await;
            transition(&mut state, ConnectionState::Closed, peer_addr);
            return state;
        }
        info!(
            "WebSocket client {} connected, total clients: {}",
            peer_addr, total
        );

        let mut reader = Cursor::new(accepted.leftover).chain(reader);
        let reason = loop {
            let message = tokio::select! {
                biased;
                _ = wait_for_shutdown(&mut self.shutdown) => break CloseReason::Local,
                _ = connection.closed() => break CloseReason::Local,
                message = read_frame(&mut reader) => message,
            };

            match message {
                Ok(Message::Text(payload)) => {
                    debug!(
                        "Received message from {}: {}",
                        peer_addr,
                        String::from_utf8_lossy(&payload)
                    );
                    self.sink.dispatch(&payload);
                }
                Ok(Message::Close) => break CloseReason::CloseFrame,
                Err(e) => break CloseReason::Frame(e),
            }
        };
        debug!("Connection {} ending: {:?}", peer_addr, reason);

        transition(&mut state, ConnectionState::Closing, peer_addr);
        self.registry.remove(connection.id()).await;
        connection.close().await;
        transition(&mut state, ConnectionState::Closed, peer_addr);

        info!(
            "WebSocket client {} disconnected, remaining clients: {}",
            peer_addr,
            self.registry.len().await
        );
        state
    }
}

async fn shutdown_writer<W: AsyncWrite + Unpin>(writer: &mut W, peer_addr: SocketAddr) {
    if let Err(e) = writer.shutdown().await {
        debug!("Failed to shut down transport for {}: {}", peer_addr, e);
    }
}

/// Resolve once the shutdown flag is raised or its sender is gone.
pub(crate) async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stopped| *stopped).await;
}

fn transition(state: &mut ConnectionState, next: ConnectionState, peer_addr: SocketAddr) {
    debug!(
        "Connection {} state changed: {:?} -> {:?}",
        peer_addr, state, next
    );
    *state = next;
}
