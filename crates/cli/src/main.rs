//! dropsort CLI: the main entry point.
//!
//! Commands:
//! - `watch`   : Watch the downloads folder and process archives as they complete
//! - `ingest`  : Feed fragment files in by hand and process what completes
//! - `parse`   : Show how file names parse as fragments
//! - `classify`: Run the classification chain on one file
//! - `status`  : Survey fragments waiting in the downloads folder
//! - `config`  : Validate, show or locate the configuration
//! - `doctor`  : Diagnose system health
//! - `onboard` : Write a default configuration

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "dropsort",
    about = "dropsort — reassemble split archive downloads and sort their assets",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    /// Use this config file instead of ~/.dropsort/config.toml
    #[arg(short, long, global = true, env = "DROPSORT_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch the downloads folder until Ctrl-C
    Watch,

    /// Ingest fragment files and process every group they complete
    Ingest {
        /// Fragment files
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Page or URL the archive was downloaded from
        #[arg(long)]
        origin: Option<String>,
    },

    /// Parse file names with the fragment grammar
    Parse {
        #[arg(required = true)]
        names: Vec<String>,
    },

    /// Classify a single file
    Classify { path: PathBuf },

    /// Show fragments waiting in the downloads folder
    Status,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Diagnose system health
    Doctor,

    /// Write a default configuration file
    Onboard,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Check the configuration for errors
    Validate,
    /// Print the effective configuration
    Show,
    /// Print the config file path
    Path,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    if cli.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .init();
    }

    let config = cli.config.as_deref();
    match cli.command {
        Commands::Watch => commands::watch::run(config).await?,
        Commands::Ingest { paths, origin } => commands::ingest::run(config, paths, origin).await?,
        Commands::Parse { names } => commands::parse::run(&names)?,
        Commands::Classify { path } => commands::classify::run(config, &path).await?,
        Commands::Status => commands::status::run(config).await?,
        Commands::Config { action } => match action {
            ConfigAction::Validate => commands::config_cmd::validate(config).await?,
            ConfigAction::Show => commands::config_cmd::show(config).await?,
            ConfigAction::Path => commands::config_cmd::path(config).await?,
        },
        Commands::Doctor => commands::doctor::run(config).await?,
        Commands::Onboard => commands::onboard::run().await?,
    }

    Ok(())
}
