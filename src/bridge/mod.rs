//! Glue between the game server and the WebSocket server.
//!
//! - [`events`]: outbound player events broadcast to clients
//! - [`relay`]: inbound group chat relayed into the game
//! - [`console`]: line commands for the console host

pub mod console;
pub mod events;
pub mod relay;

pub use console::ConsoleCommand;
pub use events::{EventPublisher, OutboundEvent};
pub use relay::{ChatDelivery, GroupMessage, GroupRelay, MessageTemplate};
