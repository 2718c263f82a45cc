//! Catalyst CLI
//!
//! Command-line tools for catalyst content nodes.
//!
//! # Commands
//!
//! - `validate` - Run the validation pipeline on a deployment file
//! - `hash` - Print the content address of files
//! - `watermarks` - Inspect or repair the persisted sync watermarks

mod commands;

use clap::{Parser, Subcommand};
use commands::validate::Context;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Catalyst content node tools.
#[derive(Parser)]
#[command(name = "catalyst")]
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
    /// Validate a deployment offline
    Validate {
        /// JSON file holding `{ "entity": ..., "auditInfo": ... }`
        #[arg(short, long)]
        deployment: PathBuf,

        /// Directory of files uploaded with the deployment
        #[arg(short, long)]
        files: Option<PathBuf>,

        /// Context the deployment arrives in
        #[arg(short, long, value_enum, default_value = "local")]
        context: Context,

        /// Output format (text, json)
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Print the content address of each file
    Hash {
        /// Files to hash
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Inspect the per-peer sync watermarks
    Watermarks {
        /// Path to the node's system properties file
        #[arg(short, long)]
        properties: PathBuf,

        /// Overwrite a watermark, as `<peer>=<timestamp>`
        #[arg(long, value_name = "PEER=TIMESTAMP")]
        set: Vec<String>,

        /// Output format (text, json)
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Validate {
            deployment,
            files,
            context,
            format,
        } => {
            commands::validate::run(&deployment, files.as_deref(), context, &format).await?;
        }
        Commands::Hash { files } => {
            commands::hash::run(&files)?;
        }
        Commands::Watermarks {
            properties,
            set,
            format,
        } => {
            commands::watermarks::run(&properties, &set, &format).await?;
        }
        Commands::Version => {
            println!("Catalyst CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("Catalyst protocol v{}", catalyst_protocol::VERSION);
        }
    }

    Ok(())
}
