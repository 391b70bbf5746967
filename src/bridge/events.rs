//! Outbound game events.
//!
//! Game-side occurrences are serialized to JSON and broadcast to every
//! connected client through an injected [`Broadcaster`].

use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

use crate::config::FeatureConfig;
use crate::server::Broadcaster;
use crate::Result;

/// Event sent from the game server to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundEvent {
    /// A player joined the game.
    PlayerJoin {
        /// Player name.
        player_name: String,
    },
    /// A player left the game.
    PlayerLeave {
        /// Player name.
        player_name: String,
    },
    /// A player sent a chat message.
    PlayerMsg {
        /// Player name.
        player_name: String,
        /// Chat message content.
        content: String,
    },
}

impl OutboundEvent {
    /// Get the wire name of the event type.
    pub fn kind(&self) -> &'static str {
        match self {
            OutboundEvent::PlayerJoin { .. } => "player_join",
            OutboundEvent::PlayerLeave { .. } => "player_leave",
            OutboundEvent::PlayerMsg { .. } => "player_msg",
        }
    }

    /// Serialize to the JSON text sent on the wire.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Publishes game events to clients, honoring the feature toggles.
#[derive(Clone)]
pub struct EventPublisher {
    broadcaster: Broadcaster,
    join_enabled: bool,
    leave_enabled: bool,
    chat_enabled: bool,
}

impl EventPublisher {
    /// Create a publisher from a broadcast handle and the feature toggles.
    pub fn new(broadcaster: Broadcaster, features: &FeatureConfig) -> Self {
        Self {
            broadcaster,
            join_enabled: features.player_join_broadcast,
            leave_enabled: features.player_leave_broadcast,
            chat_enabled: features.player_chat_broadcast,
        }
    }

    /// Announce that a player joined.
    ///
    /// Returns `None` when join broadcasts are disabled, otherwise the
    /// number of clients reached.
    pub async fn player_joined(&self, player_name: &str) -> Result<Option<usize>> {
        if !self.join_enabled {
            debug!("Player join broadcast is disabled");
            return Ok(None);
        }
        let event = OutboundEvent::PlayerJoin {
            player_name: player_name.to_string(),
        };
        let delivered = self.publish(&event).await?;
        info!("[Server->WS] Player {} joined", player_name);
        Ok(Some(delivered))
    }

    /// Announce that a player left.
    pub async fn player_left(&self, player_name: &str) -> Result<Option<usize>> {
        if !self.leave_enabled {
            debug!("Player leave broadcast is disabled");
            return Ok(None);
        }
        let event = OutboundEvent::PlayerLeave {
            player_name: player_name.to_string(),
        };
        let delivered = self.publish(&event).await?;
        info!("[Server->WS] Player {} left", player_name);
        Ok(Some(delivered))
    }

    /// Forward a player's chat message.
    pub async fn player_chat(&self, player_name: &str, content: &str) -> Result<Option<usize>> {
        if !self.chat_enabled {
            debug!("Player chat broadcast is disabled");
            return Ok(None);
        }
        let event = OutboundEvent::PlayerMsg {
            player_name: player_name.to_string(),
            content: content.to_string(),
        };
        let delivered = self.publish(&event).await?;
        info!("[Server->WS] Chat from {}: {}", player_name, content);
        Ok(Some(delivered))
    }

    async fn publish(&self, event: &OutboundEvent) -> Result<usize> {
        let json = event.to_json()?;
        trace!("Broadcasting {} JSON: {}", event.kind(), json);
        Ok(self.broadcaster.broadcast(&json).await)
    }
}
