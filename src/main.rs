use std::process::ExitCode;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, error, info, warn};

use mclistener_ws_server::bridge::console::HELP;
use mclistener_ws_server::{
    logging, ChatDelivery, Config, ConsoleCommand, EventPublisher, GroupRelay, MessageTemplate,
    Result, WebSocketServer,
};

const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Prints relayed group chat where players of the console host would see it.
struct StdoutDelivery;

impl ChatDelivery for StdoutDelivery {
    fn deliver(&self, text: &str) -> Result<usize> {
        println!("[chat] {text}");
        Ok(1)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

    let config = match Config::load_with_env(&path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load {path}: {e}");
            eprintln!("Using default configuration.");
            let mut config = Config::default();
            config.apply_env_overrides();
            config
        }
    };

    if let Err(e) = logging::init(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        logging::init_console_only(&config.logging.level);
    }

    debug!("Configuration loaded:");
    for line in config.summary() {
        debug!("  {}", line);
    }

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        return ExitCode::FAILURE;
    }

    info!("MCListener WebSocket server v{}", env!("CARGO_PKG_VERSION"));

    let server = WebSocketServer::new();
    if let Err(e) = server.start(&config.server.host, config.server.port).await {
        error!(
            "Failed to start WebSocket server on {}:{}: {}",
            config.server.host, config.server.port, e
        );
        return ExitCode::FAILURE;
    }

    if config.features.receive_group_message {
        let template = MessageTemplate::new(&config.relay.group_message_format);
        server.set_message_sink(GroupRelay::new(template, StdoutDelivery));
    } else {
        info!("Group message relay is disabled");
    }

    let publisher = EventPublisher::new(server.broadcaster(), &config.features);
    println!("{HELP}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line,
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        };

        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => {
                info!("Console input closed");
                break;
            }
            Err(e) => {
                warn!("Failed to read console input: {}", e);
                break;
            }
        };

        match ConsoleCommand::parse(&line) {
            Ok(Some(ConsoleCommand::Quit)) => break,
            Ok(Some(command)) => {
                if let Err(e) = run_command(&server, &publisher, command).await {
                    warn!("Command failed: {}", e);
                }
            }
            Ok(None) => {}
            Err(e) => println!("{e}"),
        }
    }

    server.stop().await;
    ExitCode::SUCCESS
}

async fn run_command(
    server: &WebSocketServer,
    publisher: &EventPublisher,
    command: ConsoleCommand,
) -> Result<()> {
    let delivered = match command {
        ConsoleCommand::Join(player) => publisher.player_joined(&player).await?,
        ConsoleCommand::Leave(player) => publisher.player_left(&player).await?,
        ConsoleCommand::Chat { player, text } => publisher.player_chat(&player, &text).await?,
        ConsoleCommand::Say(text) => Some(server.broadcast(&text).await),
        ConsoleCommand::Status => {
            match server.local_addr().await {
                Some(addr) => println!(
                    "listening on ws://{addr}, {} client(s)",
                    server.connection_count().await
                ),
                None => println!("not running"),
            }
            return Ok(());
        }
        ConsoleCommand::Help => {
            println!("{HELP}");
            return Ok(());
        }
        ConsoleCommand::Quit => return Ok(()),
    };

    match delivered {
        Some(count) => println!("sent to {count} client(s)"),
        None => println!("disabled in configuration"),
    }
    Ok(())
}
