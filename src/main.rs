//! beforward-daily main entry point
//!
//! Command-line interface for the one-vehicle-a-day BE FORWARD scraper.

use beforward_daily::config::{load_config_with_hash, validate, Config, DEFAULT_CONFIG_HASH};
use beforward_daily::crawler::{Coordinator, RunRequest};
use beforward_daily::output::{load_statistics, print_statistics};
use beforward_daily::server::{serve, AppState};
use beforward_daily::state::StateStore;
use beforward_daily::storage::open_history;
use beforward_daily::ImageMode;
use clap::Parser;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;
use url::Url;

/// BE FORWARD daily: one new vehicle per day
///
/// Walks the stock list, picks the first vehicle not processed yet, saves its
/// specification, photos and a ready-to-post description, then records it so
/// the next run moves on to the following vehicle.
#[derive(Parser, Debug)]
#[command(name = "beforward-daily")]
#[command(version)]
#[command(about = "One BE FORWARD vehicle a day, ready to post", long_about = None)]
struct Cli {
    /// Path to TOML configuration file (built-in defaults when omitted)
    #[arg(value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Run even if a vehicle was already processed today
    #[arg(long)]
    force: bool,

    /// Process this detail page instead of the next one in the stock list
    #[arg(long, value_name = "URL")]
    url: Option<Url>,

    /// How photos are retrieved (overrides the config)
    #[arg(long, value_enum)]
    mode: Option<ImageMode>,

    /// Do not download photos
    #[arg(long)]
    skip_images: bool,

    /// Keep photos uncropped
    #[arg(long)]
    no_crop: bool,

    /// Stock location, name or numeric code (overrides the config)
    #[arg(long, value_name = "NAME|CODE")]
    country: Option<String>,

    /// Also append logs to this file
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Show progress and run history, then exit
    #[arg(long, conflicts_with = "serve")]
    status: bool,

    /// Serve the HTTP API instead of running once
    #[arg(long, conflicts_with = "status")]
    serve: bool,

    /// Address to listen on with --serve (overrides the config)
    #[arg(long, value_name = "ADDR", requires = "serve")]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet, cli.log_file.as_deref())?;

    let (config, config_hash) = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            match load_config_with_hash(path) {
                Ok((cfg, hash)) => {
                    tracing::info!("Configuration loaded successfully (hash: {})", hash);
                    (cfg, hash)
                }
                Err(e) => {
                    tracing::error!("Failed to load configuration: {}", e);
                    return Err(e.into());
                }
            }
        }
        None => {
            let config = Config::default();
            validate(&config)?;
            tracing::info!("No configuration file given, using defaults");
            (config, DEFAULT_CONFIG_HASH.to_string())
        }
    };

    if cli.status {
        handle_status(&config)?;
    } else if cli.serve {
        handle_serve(config, config_hash, cli.bind).await?;
    } else {
        let request = RunRequest {
            force: cli.force,
            explicit_listing: cli.url,
            image_mode: cli.mode,
            skip_images: cli.skip_images,
            no_crop: cli.no_crop,
            country: cli.country,
        };
        let code = handle_run(config, config_hash, &request).await?;
        if code != 0 {
            std::process::exit(code);
        }
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
///
/// With `log_file`, a second plain-text layer appends to that file.
fn setup_logging(
    verbose: u8,
    quiet: bool,
    log_file: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("beforward_daily=info,warn"),
            1 => EnvFilter::new("beforward_daily=debug,info"),
            2 => EnvFilter::new("beforward_daily=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    let file_layer = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_target(false)
                    .with_writer(Arc::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_file(false),
        )
        .with(file_layer)
        .init();

    Ok(())
}

/// Handles the --status mode: progress from the state file and run history
fn handle_status(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    println!("State file: {}", config.output.state_path.display());
    println!("History: {}\n", config.output.history_path.display());

    let state = StateStore::new(config.output.state_path.clone()).load();
    let history = open_history(&config.output.history_path)?;
    let stats = load_statistics(&state, &history, 5)?;

    print_statistics(&stats);
    Ok(())
}

/// Handles the --serve mode
async fn handle_serve(
    config: Config,
    config_hash: String,
    bind: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let bind = bind.unwrap_or_else(|| config.server.bind.clone());
    let coordinator = Coordinator::new(config, config_hash)?;
    serve(AppState::new(coordinator), &bind).await?;
    Ok(())
}

/// Handles a single daily run, returning the process exit code
async fn handle_run(
    config: Config,
    config_hash: String,
    request: &RunRequest,
) -> Result<i32, Box<dyn std::error::Error>> {
    tracing::info!(
        "Stock country: {}, image mode: {}",
        request.country.as_deref().unwrap_or(&config.site.country),
        request.image_mode.unwrap_or(config.images.mode)
    );

    let coordinator = Coordinator::new(config, config_hash)?;
    let report = coordinator.run(request).await;

    println!("{}", serde_json::to_string_pretty(&report)?);
    if !report.outcome.is_success() {
        tracing::error!(
            "Run failed: {}",
            report.message.as_deref().unwrap_or("unknown error")
        );
    }

    Ok(report.exit_code())
}
