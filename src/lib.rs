//! MCListener WebSocket server
//!
//! A minimal RFC 6455 WebSocket server on raw TCP that broadcasts game
//! events to connected clients and relays group chat back into the game.

pub mod bridge;
pub mod config;
pub mod error;
pub mod logging;
pub mod server;

pub use bridge::{
    ChatDelivery, ConsoleCommand, EventPublisher, GroupMessage, GroupRelay, MessageTemplate,
    OutboundEvent,
};
pub use config::Config;
pub use error::{BridgeError, Result};
pub use server::{Broadcaster, MessageSink, WebSocketServer};
