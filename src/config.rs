//! Configuration module for the WebSocket bridge.

use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::path::Path;

use tracing::{info, warn};

use crate::{BridgeError, Result};

/// Configuration file format version understood by this build.
pub const CONFIG_VERSION: u32 = 1;

/// WebSocket server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// IPv4 address to bind.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port number to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    60201
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level (silent, fatal, error, warn, info, debug, trace).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Path to the log file.
    #[serde(default = "default_log_file")]
    pub file: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> String {
    "logs/mclistener-ws-server.log".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

/// Feature toggles for the event bridge.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FeatureConfig {
    /// Broadcast `player_join` events.
    #[serde(default = "default_enabled")]
    pub player_join_broadcast: bool,
    /// Broadcast `player_leave` events.
    #[serde(default = "default_enabled")]
    pub player_leave_broadcast: bool,
    /// Broadcast `player_msg` events.
    #[serde(default = "default_enabled")]
    pub player_chat_broadcast: bool,
    /// Relay inbound `group_to_server` messages into the game.
    #[serde(default = "default_enabled")]
    pub receive_group_message: bool,
}

fn default_enabled() -> bool {
    true
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            player_join_broadcast: true,
            player_leave_broadcast: true,
            player_chat_broadcast: true,
            receive_group_message: true,
        }
    }
}

/// Inbound relay configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RelayConfig {
    /// Template for group messages shown in game.
    ///
    /// Placeholders: `{group_id}`, `{group_name}`, `{nickname}`, `{message}`.
    #[serde(default = "default_group_message_format")]
    pub group_message_format: String,
}

/// Default in-game format for relayed group messages.
pub const DEFAULT_GROUP_MESSAGE_FORMAT: &str =
    "§6§l[{group_name}]§r §b({group_id})§r §a§o{nickname}§r§f: {message}";

fn default_group_message_format() -> String {
    DEFAULT_GROUP_MESSAGE_FORMAT.to_string()
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            group_message_format: default_group_message_format(),
        }
    }
}

fn default_version() -> u32 {
    CONFIG_VERSION
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Configuration file format version.
    #[serde(default = "default_version")]
    pub version: u32,
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Feature toggles.
    #[serde(default)]
    pub features: FeatureConfig,
    /// Relay configuration.
    #[serde(default)]
    pub relay: RelayConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
            features: FeatureConfig::default(),
            relay: RelayConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(BridgeError::Io)?;
        Self::parse(&content)
    }

    /// Load configuration from a TOML file, writing the defaults there if the
    /// file does not exist yet.
    pub fn load_or_init<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            return Self::load(path);
        }

        warn!("Cannot load configuration from {}", path.display());
        info!("Saving default configuration...");
        let config = Self::default();
        config.save(path)?;
        Ok(config)
    }

    /// Load configuration and apply environment variable overrides.
    pub fn load_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load_or_init(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| BridgeError::Validation(format!("config parse error: {e}")))
    }

    /// Write the configuration to a TOML file, creating parent directories.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| BridgeError::Config(format!("config serialize error: {e}")))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported environment variables:
    /// - `MCLWS_HOST`: Override the bind address
    /// - `MCLWS_PORT`: Override the listen port
    pub fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("MCLWS_HOST") {
            if !host.is_empty() {
                self.server.host = host;
            }
        }
        if let Ok(port) = std::env::var("MCLWS_PORT") {
            match port.parse::<u16>() {
                Ok(port) => self.server.port = port,
                Err(_) if port.is_empty() => {}
                Err(_) => warn!("Ignoring invalid MCLWS_PORT value: {}", port),
            }
        }
    }

    /// One `key: value` line per setting, for the startup log.
    pub fn summary(&self) -> Vec<String> {
        vec![
            format!("version: {}", self.version),
            format!("host: {}", self.server.host),
            format!("port: {}", self.server.port),
            format!("log_level: {}", self.logging.level),
            format!("log_file: {}", self.logging.file),
            format!(
                "player_join_broadcast: {}",
                self.features.player_join_broadcast
            ),
            format!(
                "player_leave_broadcast: {}",
                self.features.player_leave_broadcast
            ),
            format!(
                "player_chat_broadcast: {}",
                self.features.player_chat_broadcast
            ),
            format!(
                "receive_group_message: {}",
                self.features.receive_group_message
            ),
            format!("group_message_format: {}", self.relay.group_message_format),
        ]
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.version != CONFIG_VERSION {
            return Err(BridgeError::Validation(format!(
                "unsupported config version {} (expected {})",
                self.version, CONFIG_VERSION
            )));
        }
        if self.server.host.parse::<Ipv4Addr>().is_err() {
            return Err(BridgeError::Validation(format!(
                "server.host must be an IPv4 address, got '{}'",
                self.server.host
            )));
        }
        if self.relay.group_message_format.is_empty() {
            return Err(BridgeError::Validation(
                "relay.group_message_format must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.version, 1);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 60201);

        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.file, "logs/mclistener-ws-server.log");

        assert!(config.features.player_join_broadcast);
        assert!(config.features.player_leave_broadcast);
        assert!(config.features.player_chat_broadcast);
        assert!(config.features.receive_group_message);

        assert!(config.relay.group_message_format.contains("{nickname}"));
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
version = 1

[server]
host = "127.0.0.1"
port = 9000

[logging]
level = "debug"
file = "custom/bridge.log"

[features]
player_join_broadcast = false
player_leave_broadcast = true
player_chat_broadcast = false
receive_group_message = false

[relay]
group_message_format = "[{group_name}] {nickname}: {message}"
"#;

        let config = Config::parse(toml).unwrap();

        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.file, "custom/bridge.log");
        assert!(!config.features.player_join_broadcast);
        assert!(config.features.player_leave_broadcast);
        assert!(!config.features.player_chat_broadcast);
        assert!(!config.features.receive_group_message);
        assert_eq!(
            config.relay.group_message_format,
            "[{group_name}] {nickname}: {message}"
        );
    }

    #[test]
    fn test_parse_partial_config() {
        let toml = r#"
[server]
port = 3000

[features]
player_chat_broadcast = false
"#;

        let config = Config::parse(toml).unwrap();

        assert_eq!(config.server.port, 3000);
        assert!(!config.features.player_chat_broadcast);

        assert_eq!(config.version, 1);
        assert_eq!(config.server.host, "0.0.0.0");
        assert!(config.features.player_join_broadcast);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_parse_empty_config() {
        let config = Config::parse("").unwrap();

        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 60201);
        assert!(config.features.receive_group_message);
    }

    #[test]
    fn test_parse_invalid_config() {
        let result = Config::parse("this is not valid toml [[[");

        assert!(result.is_err());
        if let Err(BridgeError::Validation(msg)) = result {
            assert!(msg.contains("config parse error"));
        } else {
            panic!("Expected Validation error");
        }
    }

    #[test]
    fn test_summary_lists_settings() {
        let mut config = Config::default();
        config.server.port = 9000;
        config.features.player_leave_broadcast = false;

        let summary = config.summary();
        assert!(summary.contains(&"host: 0.0.0.0".to_string()));
        assert!(summary.contains(&"port: 9000".to_string()));
        assert!(summary.contains(&"player_join_broadcast: true".to_string()));
        assert!(summary.contains(&"player_leave_broadcast: false".to_string()));
        assert!(summary.contains(&"receive_group_message: true".to_string()));
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = Config::load("nonexistent.toml");
        assert!(matches!(result, Err(BridgeError::Io(_))));
    }

    #[test]
    fn test_load_or_init_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = Config::load_or_init(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.server.port, 60201);

        let reloaded = Config::load(&path).unwrap();
        assert_eq!(reloaded.server.host, config.server.host);
        assert_eq!(
            reloaded.relay.group_message_format,
            config.relay.group_message_format
        );
    }

    #[test]
    fn test_load_or_init_keeps_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[server]\nport = 4242\n").unwrap();

        let config = Config::load_or_init(&path).unwrap();
        assert_eq!(config.server.port, 4242);

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "[server]\nport = 4242\n");
    }

    #[test]
    fn test_apply_env_overrides() {
        let original_host = std::env::var("MCLWS_HOST").ok();
        let original_port = std::env::var("MCLWS_PORT").ok();

        std::env::set_var("MCLWS_HOST", "127.0.0.1");
        std::env::set_var("MCLWS_PORT", "not-a-port");

        let mut config = Config::default();
        config.apply_env_overrides();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 60201);

        std::env::set_var("MCLWS_PORT", "61000");
        config.apply_env_overrides();
        assert_eq!(config.server.port, 61000);

        match original_host {
            Some(val) => std::env::set_var("MCLWS_HOST", val),
            None => std::env::remove_var("MCLWS_HOST"),
        }
        match original_port {
            Some(val) => std::env::set_var("MCLWS_PORT", val),
            None => std::env::remove_var("MCLWS_PORT"),
        }
    }

    #[test]
    fn test_validate_default() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_ipv6_host() {
        let mut config = Config::default();
        config.server.host = "::1".to_string();

        let result = config.validate();
        if let Err(BridgeError::Validation(msg)) = result {
            assert!(msg.contains("IPv4"));
        } else {
            panic!("Expected Validation error");
        }
    }

    #[test]
    fn test_validate_rejects_unknown_version() {
        let mut config = Config::default();
        config.version = 2;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_format() {
        let mut config = Config::default();
        config.relay.group_message_format.clear();
        assert!(config.validate().is_err());
    }
}
