use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use keepalive::config::KeepAliveConfig;
use keepalive::fetch::{Fetcher, HttpFetcher, OutcomeKind};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "keepalive",
    about = "Keeps idle web services awake by pinging them on independent timers",
    version,
    long_about = None
)]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the daemon (API server + keep-alive tasks)
    Serve {
        /// TOML config file (defaults to $KEEPALIVE_CONFIG, then ./keepalive.toml)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Bind address, overriding the config and $PORT
        #[arg(long)]
        bind: Option<SocketAddr>,
    },

    /// Ping a URL once and print the outcome
    Check {
        /// URL to ping
        url: String,

        /// TOML config file for fetch settings
        #[arg(long)]
        config: Option<PathBuf>,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Commands::Serve { config, bind } => {
            let mut config = KeepAliveConfig::resolve(config.as_deref())?;
            if let Some(addr) = bind {
                config.server.host = addr.ip().to_string();
                config.server.port = addr.port();
            }
            tracing::info!(bind = %config.server.bind_address(), sites = config.sites.len(), "Starting keepalive daemon");
            keepalive::serve(config).await?;
        }
        Commands::Check { url, config, json } => {
            let config = KeepAliveConfig::resolve(config.as_deref())?;
            let fetcher = HttpFetcher::from_config(&config.fetch)?;

            tracing::info!(%url, "Pinging once");
            let outcome = fetcher.fetch(&url).await;

            if json {
                let json_output =
                    serde_json::to_string_pretty(&outcome).context("Failed to encode outcome")?;
                println!("{}", json_output);
            } else {
                let marker = match outcome.kind {
                    OutcomeKind::Success => "OK  ",
                    OutcomeKind::Failure => "FAIL",
                    OutcomeKind::Error => "ERR ",
                };
                println!("{} {} -> {}", marker, outcome.url, outcome.status_text);
            }

            if !outcome.is_success() {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
