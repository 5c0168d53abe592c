//! Simulator server binary.
//!
//! # Usage
//!
//! ```bash
//! # Defaults: classic 4545, actor 4546, viewer 4547, API 8000
//! opsim-server
//!
//! # Custom ports and profile
//! opsim-server --classic-port 14545 --profile cleco --data-dir ./data
//! ```
//!
//! Every flag has an environment-variable counterpart (`HOST`, `API_PORT`,
//! `SIM_*`); flags win when both are set.

use std::path::PathBuf;

use clap::Parser;
use opsim_server::{Server, Settings};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Open Protocol torque-tool controller simulator
#[derive(Parser, Debug)]
#[command(name = "opsim-server")]
#[command(about = "Open Protocol torque-tool controller simulator")]
#[command(version)]
struct Args {
    /// Bind host for every listener
    #[arg(long)]
    host: Option<String>,

    /// HTTP control-plane port
    #[arg(long)]
    api_port: Option<u16>,

    /// Classic-role Open Protocol port
    #[arg(long)]
    classic_port: Option<u16>,

    /// Actor-role Open Protocol port
    #[arg(long)]
    actor_port: Option<u16>,

    /// Viewer-role Open Protocol port
    #[arg(long)]
    viewer_port: Option<u16>,

    /// Active profile at startup
    #[arg(long)]
    profile: Option<String>,

    /// Directory holding mid_catalog.json, profiles/, scenarios.json
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Persist state and traffic to disk
    #[arg(long)]
    persist: bool,

    /// Database path when persistence is enabled
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    let mut settings = Settings::from_env();
    if let Some(host) = args.host {
        settings.host = host;
    }
    if let Some(port) = args.api_port {
        settings.api_port = port;
    }
    if let Some(port) = args.classic_port {
        settings.classic_port = port;
    }
    if let Some(port) = args.actor_port {
        settings.actor_port = port;
    }
    if let Some(port) = args.viewer_port {
        settings.viewer_port = port;
    }
    if let Some(profile) = args.profile {
        settings.profile = profile;
    }
    if let Some(data_dir) = args.data_dir {
        settings.data_dir = data_dir;
    }
    if args.persist {
        settings.persist = true;
    }
    if let Some(db_path) = args.db_path {
        settings.db_path = db_path;
    }

    tracing::info!("opsim server starting (profile {})", settings.profile);

    let server = Server::bind(settings).await?;
    server.run().await?;

    Ok(())
}
