//! acctreg CLI
//!
//! Command-line tools for keeping account definitions in step with a remote
//! account catalog.
//!
//! # Commands
//!
//! - `sync` - Run one sync cycle and print the resulting account sets
//! - `watch` - Poll the remote on a fixed delay until Ctrl-C
//! - `convert` - Convert an accounts JSON file offline
//! - `sign` - Print SigV4 headers for a URL

mod commands;
mod settings;

use acctreg_protocol::ProtocolVariant;
use clap::{Parser, Subcommand};
use settings::Settings;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Remote account registry tools.
#[derive(Parser)]
#[command(name = "acctreg")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to a JSON settings file
    #[arg(global = true, short, long)]
    config: Option<PathBuf>,

    /// Remote catalog URL (overrides the settings file)
    #[arg(global = true, long)]
    url: Option<String>,

    /// Protocol variant: bookmark or pagination-link
    #[arg(global = true, long)]
    variant: Option<ProtocolVariant>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one sync cycle
    Sync {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Poll the remote until interrupted
    Watch {
        /// Delay between cycles in seconds
        #[arg(short, long)]
        interval: Option<u64>,

        /// Stop after this many cycles
        #[arg(short, long)]
        max_cycles: Option<u64>,
    },

    /// Convert an accounts JSON file without contacting the remote
    Convert {
        /// File holding a response page or a plain array of accounts
        input: PathBuf,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Print SigV4 headers for a GET of a URL
    Sign {
        /// URL to sign, including its query
        target: String,

        /// Signing region (defaults to the settings file)
        #[arg(short, long)]
        region: Option<String>,

        /// Signing service (defaults to the settings file)
        #[arg(short, long)]
        service: Option<String>,

        /// Fixed signing time, e.g. 20200908T080808Z
        #[arg(short, long)]
        time: Option<String>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let mut settings = match &cli.config {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    settings.apply_overrides(cli.url, cli.variant);

    match cli.command {
        Commands::Sync { format } => {
            commands::sync::run(&settings, &format)?;
        }
        Commands::Watch {
            interval,
            max_cycles,
        } => {
            commands::watch::run(&settings, interval, max_cycles)?;
        }
        Commands::Convert { input, format } => {
            commands::convert::run(&settings, &input, &format)?;
        }
        Commands::Sign {
            target,
            region,
            service,
            time,
            format,
        } => {
            let options = commands::sign::SignOptions {
                region,
                service,
                time,
            };
            commands::sign::run(&settings, &target, &options, &format)?;
        }
        Commands::Version => {
            println!("acctreg CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
