//! Line commands for the console host.

use crate::{BridgeError, Result};

/// Usage text shown by the console host.
pub const HELP: &str = "\
Commands:
  join <player>           broadcast a player_join event
  leave <player>          broadcast a player_leave event
  chat <player> <text>    broadcast a player_msg event
  say <text>              broadcast raw text
  status                  show server status
  help                    show this help
  quit                    stop the server";

/// A command typed on the console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// A player joined.
    Join(String),
    /// A player left.
    Leave(String),
    /// A player chatted.
    Chat {
        /// Player name.
        player: String,
        /// Chat text.
        text: String,
    },
    /// Broadcast raw text unchanged.
    Say(String),
    /// Print server status.
    Status,
    /// Print the command list.
    Help,
    /// Stop the server and exit.
    Quit,
}

impl ConsoleCommand {
    /// Parse one input line. Blank lines yield `None`.
    pub fn parse(line: &str) -> Result<Option<Self>> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }

        let (name, rest) = match line.split_once(char::is_whitespace) {
            Some((name, rest)) => (name, rest.trim()),
            None => (line, ""),
        };

        let command = match name.to_ascii_lowercase().as_str() {
            "join" => ConsoleCommand::Join(single_word(name, rest)?),
            "leave" => ConsoleCommand::Leave(single_word(name, rest)?),
            "chat" => {
                let Some((player, text)) = rest.split_once(char::is_whitespace) else {
                    return Err(usage("chat <player> <text>"));
                };
                ConsoleCommand::Chat {
                    player: player.to_string(),
                    text: text.trim_start().to_string(),
                }
            }
            "say" if !rest.is_empty() => ConsoleCommand::Say(rest.to_string()),
            "say" => return Err(usage("say <text>")),
            "status" => ConsoleCommand::Status,
            "help" | "?" => ConsoleCommand::Help,
            "quit" | "exit" | "stop" => ConsoleCommand::Quit,
            other => {
                return Err(BridgeError::Validation(format!(
                    "unknown command: {other}"
                )))
            }
        };
        Ok(Some(command))
    }
}

fn single_word(name: &str, rest: &str) -> Result<String> {
    if rest.is_empty() || rest.contains(char::is_whitespace) {
        return Err(usage(&format!("{name} <player>")));
    }
    Ok(rest.to_string())
}

fn usage(text: &str) -> BridgeError {
    BridgeError::Validation(format!("usage: {text}"))
}
