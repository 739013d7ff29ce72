//! Operation log command handlers

use anyhow::Result;
use clap::Subcommand;
use colored::*;
use nimbus_core::domain::log::{LogEntry, LogLevel};

use crate::config::Config;
use nimbus_client::ControllerClient;

/// Log subcommands
#[derive(Subcommand)]
pub enum LogCommands {
    /// Show the operation log
    Show {
        /// Only the last N entries
        #[arg(short, long)]
        tail: Option<usize>,
    },
    /// Clear the operation log
    Clear,
}

pub async fn handle_log_command(command: LogCommands, config: &Config) -> Result<()> {
    let client = ControllerClient::new(&config.controller_url);

    match command {
        LogCommands::Show { tail } => show_log(&client, tail).await,
        LogCommands::Clear => {
            client.clear_log().await?;
            println!("{}", "✓ Operation log cleared".green().bold());
            Ok(())
        }
    }
}

async fn show_log(client: &ControllerClient, tail: Option<usize>) -> Result<()> {
    let entries = client.get_log().await?;

    if entries.is_empty() {
        println!("{}", "Operation log is empty.".yellow());
        return Ok(());
    }

    let skip = tail.map_or(0, |n| entries.len().saturating_sub(n));
    for entry in &entries[skip..] {
        print_entry(entry);
    }

    Ok(())
}

fn print_entry(entry: &LogEntry) {
    let level = match entry.level {
        LogLevel::Debug => "DEBUG".dimmed(),
        LogLevel::Info => "INFO ".blue(),
        LogLevel::Warning => "WARN ".yellow(),
        LogLevel::Error => "ERROR".red().bold(),
    };
    let mut lines = entry.message.lines();
    println!(
        "{} {} {}",
        entry.timestamp.format("%Y-%m-%d %H:%M:%S").to_string().dimmed(),
        level,
        lines.next().unwrap_or_default()
    );
    // Multi-line entries carry command transcripts
    for line in lines {
        println!("{:>26}{}", "", line.dimmed());
    }
}
