//! WorldSync CLI
//!
//! Command-line launcher for the world server.
//!
//! # Commands
//!
//! - `serve` - Run the server from a config file
//! - `check-config` - Validate a config file and print the effective settings
//! - `version` - Show version information

mod commands;

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// WorldSync server tools.
#[derive(Parser)]
#[command(name = "worldsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the world server
    Serve {
        /// Path to the JSON config file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Override the bind address
        #[arg(short, long)]
        bind: Option<SocketAddr>,

        /// Credential signing secret
        #[arg(long, env = "WORLDSYNC_AUTH_SECRET", hide_env_values = true)]
        auth_secret: Option<String>,

        /// Issue and print a credential for a development agent with full
        /// rights in every sync group
        #[arg(long)]
        dev_agent: bool,
    },

    /// Validate a config file
    CheckConfig {
        /// Path to the JSON config file
        #[arg(short, long)]
        config: PathBuf,

        /// Credential signing secret
        #[arg(long, env = "WORLDSYNC_AUTH_SECRET", hide_env_values = true)]
        auth_secret: Option<String>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Serve {
            config,
            bind,
            auth_secret,
            dev_agent,
        } => {
            let config = commands::load_config(config.as_deref(), bind, auth_secret)?;
            commands::serve::run(config, dev_agent)?;
        }
        Commands::CheckConfig {
            config,
            auth_secret,
            format,
        } => {
            let config = commands::load_config(Some(&config), None, auth_secret)?;
            commands::check_config::run(&config, &format)?;
        }
        Commands::Version => {
            println!("WorldSync CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
