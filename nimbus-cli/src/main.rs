//! Nimbus CLI
//!
//! Command-line interface for interacting with the Nimbus controller.

mod commands;
mod config;
mod id_resolver;
mod types;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, handle_command};
use config::Config;

#[derive(Parser)]
#[command(name = "nimbus")]
#[command(about = "Nimbus ephemeral instance controller CLI", long_about = None)]
struct Cli {
    /// Controller URL
    #[arg(
        long,
        env = "NIMBUS_CONTROLLER_URL",
        default_value = "http://localhost:8080"
    )]
    controller_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config {
        controller_url: cli.controller_url,
    };

    handle_command(cli.command, &config).await
}
