//! TCP acceptor for the WebSocket server.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::connection::{wait_for_shutdown, ConnectionHandler};
use super::registry::ConnectionRegistry;
use super::sink::SinkSlot;
use crate::{BridgeError, Result};

/// Owns the listening socket and the accept task.
pub struct Acceptor {
    local_addr: SocketAddr,
    registry: Arc<ConnectionRegistry>,
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl Acceptor {
    /// Bind `host:port` and start accepting connections.
    ///
    /// `host` must be an IPv4 address. On error nothing is left running.
    pub async fn start(
        host: &str,
        port: u16,
        registry: Arc<ConnectionRegistry>,
        sink: SinkSlot,
    ) -> Result<Self> {
        let ip: Ipv4Addr = host
            .parse()
            .map_err(|_| BridgeError::Config(format!("invalid IPv4 address: {host}")))?;
        let listener = TcpListener::bind(SocketAddrV4::new(ip, port)).await?;
        let local_addr = listener.local_addr()?;

        let (shutdown, shutdown_rx) = watch::channel(false);
        let handler = ConnectionHandler::new(Arc::clone(&registry), sink, shutdown_rx.clone());
        let task = tokio::spawn(accept_loop(listener, handler, shutdown_rx));

        info!("WebSocket server started on ws://{}", local_addr);

        Ok(Self {
            local_addr,
            registry,
            shutdown,
            task: Some(task),
        })
    }

    /// Get the local address the server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Check whether the accept task is still supposed to run.
    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    /// Stop accepting, close every registered connection and wait for the
    /// accept task. Calling it again does nothing.
    pub async fn stop(&mut self) {
        let Some(task) = self.task.take() else {
            return;
        };

        // The accept task drops the listening socket when it sees this.
        self.shutdown.send_replace(true);

        let closed = self.registry.close_all().await;
        debug!("Closed {} client connection(s)", closed);

        if let Err(e) = task.await {
            warn!("Accept task ended abnormally: {}", e);
        }
        info!("WebSocket server on {} stopped", self.local_addr);
    }
}

async fn accept_loop(
    listener: TcpListener,
    handler: ConnectionHandler,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let accepted = tokio::select! {
            accepted = listener.accept() => accepted,
            _ = wait_for_shutdown(&mut shutdown) => break,
        };

        match accepted {
            Ok((stream, peer_addr)) => {
                info!("New connection from {}", peer_addr);
                let handler = handler.clone();
                tokio::spawn(handler.run(stream, peer_addr));
            }
            Err(e) => {
                if *shutdown.borrow() {
                    debug!("Accept failed during shutdown: {}", e);
                } else {
                    warn!("Accept failed: {}", e);
                }
            }
        }
    }
    debug!("Accept loop finished");
}
