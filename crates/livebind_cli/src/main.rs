//! livebind CLI
//!
//! Binds a page description to its data sources from the command line.
//!
//! # Commands
//!
//! - `run` - Bind a page and print every render
//! - `check` - Validate a page's targets without connecting
//! - `resolve` - Show how a single endpoint would be bound

mod commands;
mod page;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// livebind command-line runner.
#[derive(Parser)]
#[command(name = "livebind")]
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
    /// Bind a page and print every render
    Run {
        /// Page description file (JSON)
        page: PathBuf,

        /// Stop after this many seconds
        #[arg(short, long)]
        duration: Option<u64>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Validate a page's targets without connecting
    Check {
        /// Page description file (JSON)
        page: PathBuf,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show how a single endpoint would be bound
    Resolve {
        /// Endpoint as written on an element
        endpoint: String,

        /// Base url for relative endpoints
        #[arg(short, long)]
        base: Option<String>,

        /// Declared mode
        #[arg(short, long, default_value = "auto")]
        mode: String,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging; RUST_LOG overrides the default level.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run {
            page,
            duration,
            format,
        } => {
            let duration = duration.map(Duration::from_secs);
            commands::run::run(&page, duration, &format, cli.verbose).await?;
        }
        Commands::Check { page, format } => {
            commands::check::run(&page, &format)?;
        }
        Commands::Resolve {
            endpoint,
            base,
            mode,
            format,
        } => {
            commands::resolve::run(&endpoint, base.as_deref(), &mode, &format)?;
        }
        Commands::Version => {
            println!("livebind CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
