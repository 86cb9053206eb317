//! # tablesync
//!
//! CLI tool for exercising the tablesync engine without a live backend.
//!
//! ## Commands
//!
//! - `replay`: Feed a scripted remote stream through the coordinator
//! - `classify`: Show how an error code is classified and retried
//!
//! ## Example
//!
//! ```bash
//! # Replay a script and print the final table grid
//! tablesync replay demo.json
//!
//! # Start the replay with the network down
//! tablesync replay demo.json --offline
//!
//! # Inspect the backoff schedule for an error code
//! tablesync classify NETWORK_ERROR --attempts 6
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod config;

use commands::{classify, replay};

/// CLI tool for exercising the tablesync engine.
#[derive(Parser, Debug)]
#[command(name = "tablesync")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Configuration file (default: tablesync.toml in the config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replay a scripted remote stream and print the final tables
    Replay {
        /// JSON script file
        script: PathBuf,

        /// Start with no network available
        #[arg(long)]
        offline: bool,
    },

    /// Classify a remote error code and print its retry schedule
    Classify {
        /// Error code name (NETWORK_ERROR) or number (-24)
        #[arg(allow_hyphen_values = true)]
        code: String,

        /// Diagnostic message attached to the error
        #[arg(long, short, default_value = "")]
        message: String,

        /// Number of consecutive failures to simulate
        #[arg(long, short, default_value = "6")]
        attempts: u32,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let config = config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Replay { script, offline } => {
            replay::run(&script, config, offline).await?;
        }
        Commands::Classify {
            code,
            message,
            attempts,
        } => {
            classify::run(&code, &message, attempts, &config)?;
        }
    }

    Ok(())
}

/// Install the log subscriber. `RUST_LOG` wins over `--verbose`.
fn init_logging(verbose: u8) {
    let filter = match std::env::var("RUST_LOG") {
        Ok(_) => tracing_subscriber::EnvFilter::from_default_env(),
        Err(_) => tracing_subscriber::EnvFilter::new(match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
