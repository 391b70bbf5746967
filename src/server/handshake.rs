//! WebSocket opening handshake (RFC 6455 Section 4.2), server side.
//!
//! ```http
//! GET /chat HTTP/1.1
//! Host: server.example.com
//! Upgrade: websocket
//! Connection: Upgrade
//! Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==
//! Sec-WebSocket-Version: 13
//! ```
//!
//! is answered with
//!
//! ```http
//! HTTP/1.1 101 Switching Protocols
//! Upgrade: websocket
//! Connection: Upgrade
//! Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=
//! ```

use std::io;

use base64::Engine;
use sha1::{Digest, Sha1};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// RFC 6455 GUID for Sec-WebSocket-Accept calculation.
const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Largest upgrade request accepted (4 KiB).
pub const MAX_REQUEST_LEN: usize = 4096;

/// End of the HTTP header block.
const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Handshake failures.
#[derive(Error, Debug)]
pub enum HandshakeError {
    /// The peer closed the connection before sending a full request.
    #[error("connection closed before the upgrade request was complete")]
    ConnectionClosed,

    /// No header terminator within [`MAX_REQUEST_LEN`] bytes.
    #[error("upgrade request exceeds {0} bytes")]
    RequestTooLarge(usize),

    /// The request is not an HTTP GET.
    #[error("upgrade request is not a GET request")]
    NotGet,

    /// The `Sec-WebSocket-Key` header is missing or empty.
    #[error("missing Sec-WebSocket-Key header")]
    MissingKey,

    /// Transport error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// The parts of an upgrade request the server cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradeRequest {
    /// Request target, e.g. `/`.
    pub path: String,
    /// Value of the `Sec-WebSocket-Key` header.
    pub key: String,
}

/// A completed handshake.
#[derive(Debug)]
pub struct Accepted {
    /// The parsed request.
    pub request: UpgradeRequest,
    /// Bytes that arrived after the request headers. They belong to the
    /// first frame and must be decoded before reading from the socket again.
    pub leftover: Vec<u8>,
}

/// Compute the Sec-WebSocket-Accept value from a client key.
///
/// `base64(SHA-1(client_key + GUID))`, per RFC 6455 Section 4.2.2.
#[must_use]
pub fn compute_accept_key(client_key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(client_key.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    let hash = hasher.finalize();
    base64::engine::general_purpose::STANDARD.encode(hash)
}

/// Parse the HTTP upgrade request header block.
pub fn parse_request(raw: &[u8]) -> Result<UpgradeRequest, HandshakeError> {
    if !raw.starts_with(b"GET ") {
        return Err(HandshakeError::NotGet);
    }

    let text = String::from_utf8_lossy(raw);
    let mut lines = text.split("\r\n");

    let path = lines
        .next()
        .and_then(|line| line.split(' ').nth(1))
        .unwrap_or("/")
        .to_string();

    let key = lines
        .take_while(|line| !line.is_empty())
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("Sec-WebSocket-Key"))
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or(HandshakeError::MissingKey)?;

    Ok(UpgradeRequest { path, key })
}

/// Build the fixed 101 response carrying `accept_key`.
pub fn switching_protocols_response(accept_key: &str) -> String {
    format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {accept_key}\r\n\
         \r\n"
    )
}

/// Find the end of the header block, returning the index just past it.
fn find_terminator(buf: &[u8]) -> Option<usize> {
    buf.windows(HEADER_TERMINATOR.len())
        .position(|w| w == HEADER_TERMINATOR)
        .map(|pos| pos + HEADER_TERMINATOR.len())
}

/// Read the upgrade request from `reader` and answer it on `writer`.
///
/// Reads until the blank line ending the headers, however many segments the
/// request arrives in, up to [`MAX_REQUEST_LEN`] bytes.
pub async fn accept<R, W>(reader: &mut R, writer: &mut W) -> Result<Accepted, HandshakeError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];

    let header_end = loop {
        if let Some(end) = find_terminator(&buf) {
            break end;
        }
        if buf.len() >= MAX_REQUEST_LEN {
            return Err(HandshakeError::RequestTooLarge(MAX_REQUEST_LEN));
        }

        let want = chunk.len().min(MAX_REQUEST_LEN - buf.len());
        let n = reader.read(&mut chunk[..want]).await?;
        if n == 0 {
            return Err(HandshakeError::ConnectionClosed);
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let request = parse_request(&buf[..header_end])?;
    let response = switching_protocols_response(&compute_accept_key(&request.key));
    writer.write_all(response.as_bytes()).await?;
    writer.flush().await?;

    Ok(Accepted {
        request,
        leftover: buf.split_off(header_end),
    })
}
