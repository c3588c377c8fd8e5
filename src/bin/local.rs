//! Ferrylink local side
//!
//! Runs next to the clients:
//! - Accepts HTTP proxy clients concurrently
//! - Queues them in arrival order
//! - Forwards one transaction at a time over the persistent link

use anyhow::{Context, Result};
use clap::Parser;
use ferrylink::{
    config::{generate_example_config, Config},
    proxy::LocalProxy,
    transport::TcpDialer,
};
use tokio::net::TcpListener;
use tracing::info;

/// Ferrylink local side - single-flight HTTP proxy front door
#[derive(Parser, Debug)]
#[command(name = "ferry-local")]
#[command(about = "Ferrylink local side - serializes proxy clients over one persistent link")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Print an example configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Client listen address (overrides config)
    #[arg(short, long)]
    listen: Option<String>,

    /// Remote side address (overrides config)
    #[arg(short, long)]
    remote: Option<String>,

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

    let mut local = config.local.clone();
    if let Some(listen) = args.listen {
        local.listen = listen;
    }
    if let Some(remote) = args.remote {
        local.remote = remote;
    }

    info!("Ferrylink local side v{}", ferrylink::VERSION);
    info!("Remote side: {}", local.remote);

    let listener = TcpListener::bind(&local.listen)
        .await
        .context("Failed to bind to address")?;
    info!("Listening for proxy clients on {}", local.listen);

    let proxy = LocalProxy::new(
        TcpDialer::new(local.remote.clone(), local.transport()),
        local.settings(),
    );

    tokio::select! {
        _ = proxy.run(listener) => {
            info!("Processor stopped");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down...");
        }
    }

    Ok(())
}
