//! lmsync CLI - Command-line interface for lmsync
//!
//! Provides commands for:
//! - Signing in to the learning platform
//! - Running a sync with live progress
//! - Renaming and toggling mirrored courses
//! - Reading platform notifications
//! - Inspecting configuration and sync settings

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod context;
mod output;

use commands::{
    auth::AuthCommand, config::ConfigCommand, courses::CoursesCommand,
    notifications::NotificationsCommand, settings::SettingsCommand, sync::SyncCommand,
};
use output::OutputFormat;

#[derive(Debug, Parser)]
#[command(name = "lmsync", version, about = "Mirror your Moodle course files locally")]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use alternate config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Authentication commands
    #[command(subcommand)]
    Auth(AuthCommand),
    /// Download new and changed course files
    Sync(SyncCommand),
    /// List and manage mirrored courses
    #[command(subcommand)]
    Courses(CoursesCommand),
    /// Read platform notifications
    #[command(subcommand)]
    Notifications(NotificationsCommand),
    /// View and change sync settings
    #[command(subcommand)]
    Settings(SettingsCommand),
    /// View and validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

fn log_filter(verbose: u8, quiet: bool) -> &'static str {
    if quiet {
        return "error";
    }
    match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_filter(cli.verbose, cli.quiet)));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Human
    };
    let config = cli.config.as_deref();

    match &cli.command {
        Commands::Auth(cmd) => cmd.execute(config, format).await,
        Commands::Sync(cmd) => cmd.execute(config, format).await,
        Commands::Courses(cmd) => cmd.execute(config, format).await,
        Commands::Notifications(cmd) => cmd.execute(config, format).await,
        Commands::Settings(cmd) => cmd.execute(config, format).await,
        Commands::Config(cmd) => cmd.execute(config, format).await,
    }
}
