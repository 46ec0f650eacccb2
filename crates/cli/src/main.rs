//! Parlance CLI — the main entry point.
//!
//! Commands:
//! - `exec`   — Run one expression command line (e.g. `"/expr list"`)
//! - `status` — Show configuration and store status

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "parlance",
    about = "Parlance — expression manager for conversational agents",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the configuration file
    #[arg(short, long, default_value = "parlance.toml", global = true)]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one expression command line
    Exec {
        /// The command text, e.g. "/expr add 感叹 哇塞 w=1.5"
        text: String,

        /// Target chat reference (canonical key or platform:id:type)
        #[arg(long)]
        chat: Option<String>,

        /// Sender id recorded in logs
        #[arg(long)]
        sender: Option<String>,
    },

    /// Show configuration and store status
    Status,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Exec {
            text,
            chat,
            sender,
        } => commands::exec::run(&cli.config, text, chat, sender).await?,
        Commands::Status => commands::status::run(&cli.config).await?,
    }

    Ok(())
}
