//! Inbound group-chat relay.
//!
//! Clients send `group_to_server` messages; [`GroupRelay`] parses them,
//! renders them with a [`MessageTemplate`] and hands the text to a
//! [`ChatDelivery`] that shows it to players.

use serde::Deserialize;
use tracing::{debug, info};

use crate::server::MessageSink;
use crate::Result;

/// Message type relayed into the game.
pub const GROUP_TO_SERVER: &str = "group_to_server";

/// Nickname used when a message carries none.
pub const UNKNOWN_NICKNAME: &str = "unknown";

fn default_nickname() -> String {
    UNKNOWN_NICKNAME.to_string()
}

/// Inbound message from a group chat bot.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GroupMessage {
    /// Message type; only `group_to_server` is relayed.
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Group identifier.
    #[serde(default)]
    pub group_id: String,
    /// Group display name.
    #[serde(default)]
    pub group_name: String,
    /// Sender nickname.
    #[serde(default = "default_nickname")]
    pub nickname: String,
    /// Message text.
    #[serde(default)]
    pub message: String,
}

impl GroupMessage {
    /// Parse a raw payload.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(payload)?)
    }

    /// Check whether this message should be relayed into the game.
    pub fn is_group_to_server(&self) -> bool {
        self.kind == GROUP_TO_SERVER
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    GroupId,
    GroupName,
    Nickname,
    Message,
}

impl Field {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "group_id" => Some(Field::GroupId),
            "group_name" => Some(Field::GroupName),
            "nickname" => Some(Field::Nickname),
            "message" => Some(Field::Message),
            _ => None,
        }
    }

    fn value<'a>(&self, msg: &'a GroupMessage) -> &'a str {
        match self {
            Field::GroupId => &msg.group_id,
            Field::GroupName => &msg.group_name,
            Field::Nickname => &msg.nickname,
            Field::Message => &msg.message,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field(Field),
}

/// Placeholder template for relayed messages.
///
/// Recognizes `{group_id}`, `{group_name}`, `{nickname}` and `{message}`.
/// Anything else in braces is kept as written. Substituted values are never
/// scanned for placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageTemplate {
    segments: Vec<Segment>,
}

impl MessageTemplate {
    /// Compile a template string.
    pub fn new(format: &str) -> Self {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut rest = format;

        while let Some(open) = rest.find('{') {
            literal.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            let field = after
                .find('}')
                .and_then(|close| Field::from_name(&after[..close]).map(|f| (f, close)));

            match field {
                Some((field, close)) => {
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Field(field));
                    rest = &after[close + 1..];
                }
                None => {
                    literal.push('{');
                    rest = after;
                }
            }
        }
        literal.push_str(rest);
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Self { segments }
    }

    /// Render the template for one message.
    pub fn render(&self, msg: &GroupMessage) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Field(field) => out.push_str(field.value(msg)),
            }
        }
        out
    }
}

/// Destination for relayed chat text, such as the game's player chat.
pub trait ChatDelivery: Send + Sync {
    /// Show `text` to players. Returns how many received it.
    fn deliver(&self, text: &str) -> Result<usize>;
}

/// Message sink that relays group chat into the game.
pub struct GroupRelay<D> {
    template: MessageTemplate,
    delivery: D,
}

impl<D: ChatDelivery> GroupRelay<D> {
    /// Create a relay rendering with `template` into `delivery`.
    pub fn new(template: MessageTemplate, delivery: D) -> Self {
        Self { template, delivery }
    }

    /// Get the delivery target.
    pub fn delivery(&self) -> &D {
        &self.delivery
    }
}

impl<D: ChatDelivery> MessageSink for GroupRelay<D> {
    fn on_message(&self, payload: &[u8]) -> Result<()> {
        let msg = GroupMessage::parse(payload)?;
        if !msg.is_group_to_server() {
            debug!("Ignoring message of type {:?}", msg.kind);
            return Ok(());
        }

        info!(
            "[Group->Server] [{}] {}: {}",
            msg.group_name, msg.nickname, msg.message
        );
        let text = self.template.render(&msg);
        let recipients = self.delivery.deliver(&text)?;
        debug!("Relayed group message to {} player(s)", recipients);
        Ok(())
    }
}
