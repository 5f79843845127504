//! ukfaasd — the single-node unikernel FaaS provider.
//!
//! # Quick Start
//!
//! ```bash
//! # Start the provider in the current directory
//! ukfaasd up
//!
//! # Start on a different port with a preloaded image catalogue
//! ukfaasd up --port 9090 --images ./images.json
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// ukfaasd - serverless functions as unikernel VMs.
#[derive(Parser)]
#[command(name = "ukfaasd")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version information.
    Version,

    /// Start the provider.
    Up {
        /// Working directory for config and bootstrap files.
        #[arg(short, long)]
        working_dir: Option<PathBuf>,

        /// Override the provider port.
        #[arg(short, long)]
        port: Option<u16>,

        /// JSON catalogue of image targets to preload.
        #[arg(long)]
        images: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Version => {
            commands::version::run();
            Ok(())
        }
        Commands::Up {
            working_dir,
            port,
            images,
        } => commands::up::run(working_dir, port, images).await,
    }
}
