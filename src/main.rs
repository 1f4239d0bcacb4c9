//! Command-line front end for the server manager.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use server_manager::{
    AppState, Config, NewServer, ServerClient, ServerService, Status, StatusFilter,
    TracingNotifier,
};

#[derive(Parser)]
#[command(name = "server-manager", version, about = "Monitor and manage a fleet of servers")]
struct Cli {
    /// Path to a TOML config file
    #[arg(long, global = true)]
    config: Option<String>,

    /// Backend base URL (overrides config and environment)
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Discard results superseded by a newer call of the same kind
    #[arg(long, global = true)]
    drop_stale: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List all servers
    List,
    /// Re-check reachability of an address
    Ping { ip_address: String },
    /// Show only servers with the given status (ALL, UP, DOWN)
    Filter { status: StatusFilter },
    /// Register a new server
    Save {
        #[arg(long)]
        name: String,
        #[arg(long)]
        ip: String,
        #[arg(long = "type")]
        kind: String,
        #[arg(long, default_value = "")]
        image_url: String,
        #[arg(long, default_value = "DOWN", value_parser = parse_status)]
        status: Status,
    },
    /// Delete a server by id
    Delete { id: i64 },
    /// Periodically ping every server until Ctrl+C
    Watch {
        /// Seconds between sweeps
        #[arg(long)]
        interval: Option<u64>,
    },
}

fn parse_status(raw: &str) -> Result<Status, String> {
    match raw.parse::<StatusFilter>()? {
        StatusFilter::Only(status) => Ok(status),
        StatusFilter::All => Err("status must be UP or DOWN".into()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("server_manager=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(url) = cli.api_url {
        config.api_url = url;
    }
    if cli.drop_stale {
        config.drop_stale_completions = true;
    }
    config.normalize();
    tracing::debug!(?config, "resolved configuration");

    let client = ServerClient::from_config(&config)?;
    let (service, states) = ServerService::new(
        Arc::new(client),
        Arc::new(TracingNotifier),
        config.stale_policy(),
    );
    let service = Arc::new(service);
    let printer = tokio::spawn(render(states));

    let last = match cli.command {
        // Watch owns its startup list and retries it until the backend answers.
        Command::Watch { interval } => {
            let secs = interval.unwrap_or(config.watch_interval_secs).max(1);
            server_manager::watch::run(service.clone(), Duration::from_secs(secs), async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!("Unable to listen for shutdown signal: {}", e);
                }
            })
            .await;
            AppState::loaded(service.snapshot())
        }
        command => {
            // The fleet is always loaded first, as on startup of any front end.
            let loaded = service.list().await;
            if loaded.is_error() {
                loaded
            } else {
                run_after_load(&service, command).await.unwrap_or(loaded)
            }
        }
    };

    // Closing the last sender ends the printer.
    drop(service);
    printer.await.context("state printer failed")?;

    if let AppState::Error { detail } = last {
        anyhow::bail!("{}", detail);
    }
    Ok(())
}

/// Run `command` against an already loaded fleet. `None` means the list
/// itself was the requested result.
async fn run_after_load(service: &ServerService, command: Command) -> Option<AppState> {
    let state = match command {
        Command::Ping { ip_address } => service.ping(&ip_address).await,
        Command::Filter { status } => service.filter(status),
        Command::Save {
            name,
            ip,
            kind,
            image_url,
            status,
        } => {
            let server = NewServer {
                name,
                ip_address: ip,
                status,
                kind,
                image_url,
            };
            service.save(&server).await
        }
        Command::Delete { id } => service.delete(id).await,
        Command::List | Command::Watch { .. } => return None,
    };
    Some(state)
}

async fn render(mut states: mpsc::UnboundedReceiver<AppState>) {
    while let Some(state) = states.recv().await {
        match state {
            AppState::Loading => println!("Loading..."),
            AppState::Error { detail } => println!("Error: {}", detail),
            AppState::Loaded { envelope } => {
                println!(
                    "{:<6} {:<20} {:<16} {:<6} {}",
                    "ID", "NAME", "IP ADDRESS", "STATUS", "TYPE"
                );
                for server in envelope.servers() {
                    println!(
                        "{:<6} {:<20} {:<16} {:<6} {}",
                        server.id, server.name, server.ip_address, server.status, server.kind
                    );
                }
                if !envelope.message.is_empty() {
                    println!("-- {}", envelope.message);
                }
                println!();
            }
        }
    }
}
