mod app;
mod handler;
mod transcript;
mod tui;
mod ui;

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use clap::Parser;
use streamchat_core::config::config_dir;
use streamchat_core::{
    AllowAll, Authorizer, ChatController, ChatTransport, Config, LocalStore, Mode,
    OpenAiTransport, ProxyAuthorizer, ProxyTransport, SystemClipboard,
};
use tracing::info;

use crate::app::App;
use crate::tui::EventHandler;

#[derive(Parser)]
#[command(name = "streamchat")]
#[command(about = "Chat with an LLM in the terminal, with streamed markdown replies")]
struct Cli {
    /// Where to send turns: "proxy" (streamchat server) or "direct" (OpenAI)
    #[arg(short, long, value_parser = parse_mode)]
    mode: Option<Mode>,

    /// Base URL of the streamchat server
    #[arg(long)]
    server_url: Option<String>,

    /// Model to request in direct mode
    #[arg(long)]
    model: Option<String>,

    /// Path to config.json
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn parse_mode(s: &str) -> Result<Mode, String> {
    Mode::from_str(s).ok_or_else(|| format!("unknown mode '{s}' (expected proxy or direct)"))
}

/// Log to a file; the terminal is in raw mode while the app runs.
fn init_logging() -> Result<()> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir)?;
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join("streamchat.log"))?;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(Arc::new(file))
        .with_ansi(false)
        .try_init()
        .map_err(|e| anyhow!("failed to initialise logging: {e}"))
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    if let Some(mode) = cli.mode {
        config.mode = mode;
    }
    if let Some(url) = &cli.server_url {
        config.server_url = url.clone();
    }
    if let Some(model) = &cli.model {
        config.model = model.clone();
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging()?;

    let config = load_config(&cli)?;
    let store = LocalStore::default_location()?;
    info!(mode = config.mode.as_str(), store = %store.path().display(), "streamchat starting");

    let (transport, authorizer, target): (Arc<dyn ChatTransport>, Arc<dyn Authorizer>, String) =
        match config.mode {
            Mode::Proxy => (
                Arc::new(ProxyTransport::new(&config.server_url)),
                Arc::new(ProxyAuthorizer::new(&config.server_url)),
                config.server_url.clone(),
            ),
            Mode::Direct => (
                Arc::new(OpenAiTransport::new(&config.api_base, &config.model)),
                Arc::new(AllowAll),
                config.model.clone(),
            ),
        };

    let mut events = EventHandler::new();
    let controller = ChatController::new(transport, authorizer, Arc::new(events.sender()));
    let mut app = App::new(
        controller,
        store,
        config.mode,
        target,
        Box::new(SystemClipboard::new()),
    );

    tui::install_panic_hook();
    let mut terminal = tui::init()?;

    let result = async {
        while !app.should_quit {
            terminal.draw(|frame| ui::render(&mut app, frame))?;
            match events.next().await {
                Some(event) => handler::handle_event(&mut app, event),
                None => break,
            }
        }
        Ok::<(), anyhow::Error>(())
    }
    .await;

    tui::restore()?;
    info!("streamchat stopped");
    result
}
