//! Momentum Trader - market-health-gated momentum trading on Solana
//!
//! # WARNING
//! - This bot trades with real money. Only use funds you can afford to lose.
//! - Momentum signals lag; a trailing stop limits losses but does not prevent them.
//! - Run with `--dry-run` first to see how the configured strategy behaves.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Mutex;
use tracing::error;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter, Layer};

// Use the library crate
use momentum_trader::cli::commands;
use momentum_trader::config::{Config, LoggingConfig};

/// Momentum Trader - trend-following token trader
#[derive(Parser)]
#[command(name = "trader")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Emit JSON log lines on stdout
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the trader
    Start {
        /// Run in dry-run mode (paper trades, separate state)
        #[arg(long)]
        dry_run: bool,
    },

    /// Open a position now
    Buy {
        /// Asset name or mint address
        asset: String,

        /// Use the paper venue and dry-run state
        #[arg(long)]
        dry_run: bool,
    },

    /// Close a position now
    Sell {
        /// Asset name or mint address
        asset: String,

        /// Skip confirmation prompt
        #[arg(long)]
        force: bool,

        /// Use the paper venue and dry-run state
        #[arg(long)]
        dry_run: bool,
    },

    /// Show open positions and P&L
    Status {
        /// Show dry-run positions
        #[arg(long)]
        dry_run: bool,
    },

    /// Show current configuration (secrets masked)
    Config,

    /// Check system health (RPC, providers, market health)
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Parse CLI arguments
    let cli = Cli::parse();

    // Configuration decides where logs go, so it loads before tracing
    let config = match Config::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration: {:#}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = init_tracing(&config.logging, cli.json_logs) {
        eprintln!("Failed to initialize logging: {:#}", e);
        std::process::exit(1);
    }

    // Execute command
    let result = match cli.command {
        Commands::Start { dry_run } => commands::start(&config, dry_run).await,
        Commands::Buy { asset, dry_run } => commands::buy(&config, &asset, dry_run).await,
        Commands::Sell {
            asset,
            force,
            dry_run,
        } => commands::sell(&config, &asset, force, dry_run).await,
        Commands::Status { dry_run } => commands::status(&config, dry_run).await,
        Commands::Config => commands::show_config(&config),
        Commands::Health => commands::health(&config).await,
    };

    if let Err(e) = result {
        error!("Command failed: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// Stdout logging, plus an append-only file when `logging.file` is set
fn init_tracing(logging: &LoggingConfig, json_stdout: bool) -> Result<()> {
    let filter = EnvFilter::from_default_env().add_directive("momentum_trader=info".parse()?);

    let stdout = if json_stdout {
        fmt::layer().json().with_target(true).boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed()
    };

    let file = match &logging.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path))?;
            let layer = fmt::layer()
                .with_ansi(false)
                .with_target(true)
                .with_writer(Mutex::new(file));
            Some(if logging.json {
                layer.json().boxed()
            } else {
                layer.boxed()
            })
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout)
        .with(file)
        .try_init()?;

    Ok(())
}
