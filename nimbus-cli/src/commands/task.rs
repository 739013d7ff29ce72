//! Task and status command handlers

use anyhow::Result;
use clap::Subcommand;
use colored::*;

use crate::commands::instance::colorize_status;
use crate::config::Config;
use nimbus_client::ControllerClient;

/// Task subcommands
#[derive(Subcommand)]
pub enum TaskCommands {
    /// List lifecycle operations in flight
    List,
}

pub async fn handle_task_command(command: TaskCommands, config: &Config) -> Result<()> {
    let client = ControllerClient::new(&config.controller_url);

    match command {
        TaskCommands::List => list_tasks(&client).await,
    }
}

async fn list_tasks(client: &ControllerClient) -> Result<()> {
    let tasks = client.list_tasks().await?;

    if tasks.is_empty() {
        println!("{}", "No tasks running.".yellow());
        return Ok(());
    }

    for task in tasks {
        println!(
            "  {} {:<6} {}  {}",
            "▸".cyan(),
            task.operation.to_string().bold(),
            task.description,
            format!(
                "{} since {}",
                task.id,
                task.started_at.format("%H:%M:%S")
            )
            .dimmed()
        );
    }

    Ok(())
}

/// Print the controller status summary
pub async fn show_status(config: &Config) -> Result<()> {
    let client = ControllerClient::new(&config.controller_url);
    let status = client.status().await?;

    println!("{}", "Nimbus controller".bold());
    println!("  URL:        {}", client.base_url().cyan());
    println!("  Instances:  {}", status.instances.len());
    println!("  Tasks:      {}", status.tasks.len());
    println!("  Log lines:  {}", status.log_count);

    if !status.instances.is_empty() {
        println!();
        for instance in &status.instances {
            println!(
                "  {:<24} {:<12} {}",
                instance.display_name,
                colorize_status(instance.status),
                instance.url.as_deref().unwrap_or("").dimmed()
            );
        }
    }

    Ok(())
}
