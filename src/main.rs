use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Mutex;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use riffle::app::App;
use riffle::config::{config_dir, Config};
use riffle::keybindings::KeybindingRegistry;
use riffle::remote::{build_client, HttpAuthority};
use riffle::session::FeedSession;
use riffle::ui;

/// Capacity of the background event channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Parser, Debug)]
#[command(name = "riffle", about = "Terminal feed reader for a remote item server")]
struct Args {
    /// Item server base URL (overrides `server_url` in the config file)
    #[arg(long, value_name = "URL")]
    server: Option<String>,

    /// Config file to use instead of ~/.config/riffle/config.toml
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Initial view as a query string, e.g. `read=1&range=week&sort=newest`
    #[arg(long, value_name = "QUERY")]
    view: Option<String>,

    /// Write logs to this file (the terminal is owned by the UI)
    #[arg(long, value_name = "FILE")]
    log_file: Option<PathBuf>,
}

fn init_tracing(log_file: Option<&PathBuf>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file '{}'", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .init();
        }
        // Without a file, only log when explicitly asked to.
        None if std::env::var_os("RUST_LOG").is_some() => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
        None => {}
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.log_file.as_ref())?;

    let config_path = match args.config {
        Some(path) => path,
        None => config_dir()
            .context("Cannot locate config directory: neither XDG_CONFIG_HOME nor HOME is set")?
            .join("config.toml"),
    };
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from '{}'", config_path.display()))?;
    tracing::debug!(?config, path = %config_path.display(), "Loaded config");

    let Some(server) = args.server.or_else(|| config.server_url.clone()) else {
        bail!(
            "No server configured: pass --server <URL> or set server_url in {}",
            config_path.display()
        );
    };

    let client = build_client().context("Failed to build HTTP client")?;
    let authority = HttpAuthority::new(client, &server, config.api_token())
        .with_context(|| format!("Invalid server URL '{}'", server))?;
    tracing::info!(server = %authority.base_url(), "Starting riffle");

    let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let mut session = FeedSession::new(
        authority,
        event_tx,
        config.session_settings(),
        config.initial_filter(),
    );
    if let Some(view) = &args.view {
        session
            .apply_view_query(view)
            .with_context(|| format!("Invalid --view '{}'", view))?;
    }

    let mut keybindings = KeybindingRegistry::new();
    for warning in keybindings.apply_overrides(&config.keybindings) {
        tracing::warn!("{}", warning);
    }

    let mut app = App::new(
        session,
        keybindings,
        config.swipe_threshold,
        config.backdrop_close,
    );

    ui::run(&mut app, event_rx, config.refresh_interval()).await?;

    tracing::info!("Exiting");
    Ok(())
}
