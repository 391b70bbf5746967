//! WebSocket server module.
//!
//! A self-contained RFC 6455 server on raw TCP: handshake, frame codec,
//! connection registry with broadcast, and the accept/shutdown lifecycle.

mod connection;
pub mod frame;
pub mod handshake;
mod listener;
mod registry;
mod sink;
mod websocket;

pub use connection::{ConnectionHandler, ConnectionState};
pub use frame::{
    apply_mask, encode_frame, encode_text, read_frame, FrameError, Message, Opcode,
    MAX_PAYLOAD_LEN,
};
pub use handshake::{
    compute_accept_key, parse_request, switching_protocols_response, Accepted, HandshakeError,
    UpgradeRequest, MAX_REQUEST_LEN,
};
pub use listener::Acceptor;
pub use registry::{Connection, ConnectionRegistry};
pub use sink::{MessageSink, SinkSlot};
pub use websocket::{Broadcaster, WebSocketServer};
