//! SOS Relay Daemon
//!
//! Receives emergency SOS alerts and broadcasts them in real time to every
//! connected admin viewer session.

mod api;
mod config;
mod error;
mod events;
mod lifecycle;
mod models;
mod registry;
mod service;
mod storage;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use crate::config::Config;

#[derive(Parser)]
#[command(name = "sos-relay")]
#[command(about = "Receive and broadcast SOS emergency alerts in real time")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable debug output
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the alert relay server
    Serve {
        /// Host to bind to (overrides config)
        #[arg(short = 'H', long)]
        host: Option<String>,

        /// Port to bind to (overrides config)
        #[arg(short, long)]
        port: Option<u16>,

        /// Path to config file
        #[arg(short, long)]
        config: Option<String>,
    },

    /// List stored alerts
    Alerts {
        /// Maximum number of alerts to show
        #[arg(short, long, default_value = "20")]
        limit: usize,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Manage configuration
    Config {
        /// Show current configuration
        #[arg(short, long)]
        show: bool,

        /// Initialize default configuration file
        #[arg(short, long)]
        init: bool,
    },

    /// Show version
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.debug {
        Level::DEBUG
    } else if cli.verbose {
        Level::INFO
    } else {
        Level::WARN
    };

    let _ = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .try_init();

    match cli.command {
        Commands::Serve { host, port, config } => {
            run_serve(host, port, config).await?;
        }
        Commands::Alerts { limit, json } => {
            list_alerts(limit, json).await?;
        }
        Commands::Config { show, init } => {
            manage_config(show, init)?;
        }
        Commands::Version => {
            println!("sos-relay v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}

async fn run_serve(
    host: Option<String>,
    port: Option<u16>,
    config_path: Option<String>,
) -> Result<()> {
    let config = match config_path {
        Some(path) => Config::load(&path)?,
        None => Config::default(),
    };
    config.ensure_dirs()?;

    let host = host.unwrap_or_else(|| config.host.clone());
    let port = port.unwrap_or(config.http_port);

    info!("Starting SOS relay daemon");

    let storage = storage::Storage::new(
        &config.db_path,
        Duration::from_secs(config.store_timeout_secs),
    )
    .await?;
    storage.initialize().await?;

    // Composition root: bus, registry, and service are wired here.
    let bus = events::EventBus::new(config.event_capacity);
    let registry = registry::ConnectionRegistry::new(bus.clone());
    let service = service::AlertService::new(storage, bus);

    let state = api::AppState { service, registry };
    api::run_server(&host, port, state).await?;

    Ok(())
}

async fn list_alerts(limit: usize, json_output: bool) -> Result<()> {
    let config = Config::default();

    if !config.db_path.exists() {
        if json_output {
            println!(r#"{{"error": "Database not found"}}"#);
        } else {
            eprintln!("Error: database not found. Is the daemon running?");
        }
        return Ok(());
    }

    let storage = storage::Storage::new(
        &config.db_path,
        Duration::from_secs(config.store_timeout_secs),
    )
    .await?;
    let alerts = storage.list().await?;
    let alerts: Vec<_> = alerts.into_iter().take(limit).collect();

    if json_output {
        println!("{}", serde_json::to_string_pretty(&alerts)?);
        return Ok(());
    }

    if alerts.is_empty() {
        println!("No alerts found");
        return Ok(());
    }

    println!(
        "{:<10} {:<20} {:<13} {:>9} {:>10}  {}",
        "ID", "Name", "Status", "Lat", "Lng", "Created"
    );
    for alert in &alerts {
        println!(
            "{:<10} {:<20} {:<13} {:>9.4} {:>10.4}  {}",
            &alert.id[..8],
            truncate(&alert.user_name, 20),
            alert.status.to_string(),
            alert.location.latitude,
            alert.location.longitude,
            alert.created_at.format("%Y-%m-%d %H:%M:%S"),
        );
    }

    Ok(())
}

fn manage_config(show: bool, init: bool) -> Result<()> {
    let config = Config::default();
    let config_path = config.config_dir.join("config.json");
    let config_path_str = config_path.to_string_lossy().to_string();

    if init {
        config.ensure_dirs()?;
        config.save(&config_path_str)?;
        println!("Configuration created at {}", config_path_str);
        return Ok(());
    }

    if show || !init {
        let config = if config_path.exists() {
            Config::load(&config_path_str)?
        } else {
            println!("No config file found, showing defaults");
            config
        };

        println!("data_dir:           {:?}", config.data_dir);
        println!("db_path:            {:?}", config.db_path);
        println!("host:               {}", config.host);
        println!("http_port:          {}", config.http_port);
        println!("store_timeout_secs: {}", config.store_timeout_secs);
        println!("event_capacity:     {}", config.event_capacity);
    }

    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        let head: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{head}…")
    } else {
        s.to_string()
    }
}
