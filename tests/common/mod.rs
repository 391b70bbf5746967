//! Test helpers for integration tests.
//!
//! Provides TestClient, TestServer, and helper functions.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use mclistener_ws_server::server::{encode_frame, read_frame, FrameError, Message, Opcode};
use mclistener_ws_server::{ChatDelivery, Result as BridgeResult, WebSocketServer};

/// Default timeout for test operations.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Key from the RFC 6455 handshake example.
pub const SAMPLE_KEY: &str = "dGhlIHNhbXBsZSBub25jZQ==";

/// Mask used for client frames.
const CLIENT_MASK: [u8; 4] = [0x37, 0xfa, 0x21, 0x3d];

/// WebSocket test client speaking raw frames.
pub struct TestClient {
    stream: TcpStream,
    /// Raw handshake response from the server.
    pub response: String,
}

impl TestClient {
    /// Connect and complete the opening handshake.
    pub async fn connect(addr: SocketAddr) -> std::io::Result<Self> {
        let mut stream = TcpStream::connect(addr).await?;
        let request = format!(
            "GET /ws HTTP/1.1\r\n\
             Host: {addr}\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Key: {SAMPLE_KEY}\r\n\
             Sec-WebSocket-Version: 13\r\n\r\n"
        );
        stream.write_all(request.as_bytes()).await?;

        let mut response = Vec::new();
        let mut byte = [0u8; 1];
        while !response.ends_with(b"\r\n\r\n") {
            timeout(DEFAULT_TIMEOUT, stream.read_exact(&mut byte))
                .await
                .map_err(|_| std::io::Error::from(std::io::ErrorKind::TimedOut))??;
            response.push(byte[0]);
        }

        Ok(Self {
            stream,
            response: String::from_utf8_lossy(&response).into_owned(),
        })
    }

    /// Send a masked text frame.
    pub async fn send_text(&mut self, text: &str) -> std::io::Result<()> {
        self.send_raw(&encode_frame(Opcode::Text, text.as_bytes(), Some(CLIENT_MASK)))
            .await
    }

    /// Send a masked close frame.
    pub async fn send_close(&mut self) -> std::io::Result<()> {
        self.send_raw(&encode_frame(Opcode::Close, b"", Some(CLIENT_MASK)))
            .await
    }

    /// Send raw bytes to the server.
    pub async fn send_raw(&mut self, data: &[u8]) -> std::io::Result<()> {
        self.stream.write_all(data).await?;
        self.stream.flush().await
    }

    /// Receive one text frame from the server with the default timeout.
    pub async fn recv_text(&mut self) -> Option<String> {
        match timeout(DEFAULT_TIMEOUT, read_frame(&mut self.stream)).await {
            Ok(Ok(Message::Text(payload))) => Some(String::from_utf8_lossy(&payload).into_owned()),
            _ => None,
        }
    }

    /// Wait until the server closes the connection.
    pub async fn expect_closed(&mut self) -> bool {
        matches!(
            timeout(DEFAULT_TIMEOUT, read_frame(&mut self.stream)).await,
            Ok(Err(FrameError::Disconnected))
        )
    }
}

/// Started server bound to an ephemeral loopback port.
pub struct TestServer {
    pub server: WebSocketServer,
    pub addr: SocketAddr,
}

impl TestServer {
    /// Start a server on `127.0.0.1:0`.
    pub async fn start() -> Self {
        let server = WebSocketServer::new();
        let addr = server.start("127.0.0.1", 0).await.unwrap();
        Self { server, addr }
    }

    /// Wait until the registry holds `expected` clients.
    pub async fn wait_for_clients(&self, expected: usize) {
        let deadline = tokio::time::Instant::now() + DEFAULT_TIMEOUT;
        while tokio::time::Instant::now() < deadline {
            if self.server.connection_count().await == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!(
            "expected {expected} clients, have {}",
            self.server.connection_count().await
        );
    }

    /// Stop the server.
    pub async fn stop(self) {
        self.server.stop().await;
    }
}

/// Chat delivery that records every line.
#[derive(Clone, Default)]
pub struct RecordingDelivery {
    lines: Arc<Mutex<Vec<String>>>,
}

impl RecordingDelivery {
    /// Get the recorded lines.
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }

    /// Wait until `count` lines were recorded.
    pub async fn wait_for(&self, count: usize) -> Vec<String> {
        let deadline = tokio::time::Instant::now() + DEFAULT_TIMEOUT;
        while tokio::time::Instant::now() < deadline {
            let lines = self.lines();
            if lines.len() >= count {
                return lines;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.lines()
    }
}

impl ChatDelivery for RecordingDelivery {
    fn deliver(&self, text: &str) -> BridgeResult<usize> {
        self.lines.lock().unwrap().push(text.to_string());
        Ok(1)
    }
}
