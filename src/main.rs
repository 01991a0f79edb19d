//! Taskpilot server binary.
//!
//! Serves the task REST API, the chat endpoint, and the WebSocket feeds on a
//! single port, backed by SQLite.

use anyhow::Result;
use clap::Parser;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use taskpilot::agent::TaskAgent;
use taskpilot::agent::anthropic::AnthropicClient;
use taskpilot::config::Config;
use taskpilot::db::Database;
use taskpilot::server::{AppState, start_server};
use taskpilot::tools::ToolHandler;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "taskpilot", version, about = "Task tracking with a natural-language interface")]
struct Cli {
    /// Path to a YAML config file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// SQLite database path (overrides config).
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Host to bind (overrides config).
    #[arg(long)]
    host: Option<IpAddr>,

    /// Port to bind (overrides config).
    #[arg(long)]
    port: Option<u16>,

    /// Verbose logging when RUST_LOG is not set.
    #[arg(long)]
    debug: bool,
}

fn init_tracing(debug: bool) {
    let default = if debug { "taskpilot=debug,tower_http=debug" } else { "taskpilot=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load_or_default(cli.config.as_deref())?;
    if let Some(db_path) = cli.db_path {
        config.server.db_path = db_path;
    }
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if cli.debug {
        config.server.debug = true;
    }

    init_tracing(config.server.debug);

    if config.model.api_key.is_none() {
        warn!("ANTHROPIC_API_KEY not set; chat endpoints will return errors");
    }

    config.ensure_db_dir()?;
    let db = Arc::new(Database::open(&config.server.db_path)?);
    info!("database ready at {}", config.server.db_path.display());

    let tools = Arc::new(ToolHandler::new(Arc::clone(&db)));
    let mut client = AnthropicClient::new(config.model.api_key.clone(), config.model.model.clone());
    if let Some(base_url) = config.model.base_url.clone() {
        client = client.with_base_url(base_url);
    }
    let client = Arc::new(client);
    let agent = Arc::new(TaskAgent::new(client, tools));

    let state = AppState::new(db, agent);
    let (shutdown_tx, _addr) = start_server(state, &config).await?;

    tokio::signal::ctrl_c().await?;
    info!("interrupt received");
    let _ = shutdown_tx.send(());

    Ok(())
}
