//! Ferrylink remote side
//!
//! Runs where the open internet is:
//! - Accepts persistent links from the local side
//! - Fetches plain HTTP requests from their origins
//! - Opens raw CONNECT tunnels

use anyhow::{Context, Result};
use clap::Parser;
use ferrylink::{
    config::{generate_example_config, Config},
    proxy::Dispatcher,
};
use tokio::net::TcpListener;
use tracing::info;

/// Ferrylink remote side - origin-facing dispatcher
#[derive(Parser, Debug)]
#[command(name = "ferry-remote")]
#[command(about = "Ferrylink remote side - performs fetches and tunnels for the local side")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Print an example configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Listen address (overrides config)
    #[arg(short, long)]
    listen: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'v', long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        let example = toml::to_string_pretty(&generate_example_config())
            .context("Failed to render example config")?;
        println!("{}", example);
        return Ok(());
    }

    let config = Config::load_or_default(&args.config).context("Failed to load configuration")?;
    config.logging.init(args.log_level.as_deref())?;

    let listen_addr = args.listen.unwrap_or_else(|| config.remote.listen.clone());

    info!("Ferrylink remote side v{}", ferrylink::VERSION);

    let listener = TcpListener::bind(&listen_addr)
        .await
        .context("Failed to bind to address")?;
    info!("Listening for links on {}", listen_addr);

    let dispatcher = Dispatcher::new(config.remote.settings());

    tokio::select! {
        _ = dispatcher.serve(listener) => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down...");
        }
    }

    Ok(())
}
