//! Instance command handlers
//!
//! Handles listing, inspecting, creating, registering, starting, stopping,
//! renaming and removing instances, plus the remote application log.

use anyhow::Result;
use clap::Subcommand;
use colored::*;
use nimbus_core::domain::instance::{Instance, InstanceStatus};
use nimbus_core::domain::task::TaskId;

use crate::config::Config;
use crate::id_resolver::resolve_instance_id;
use nimbus_client::ControllerClient;

/// Instance subcommands
#[derive(Subcommand)]
pub enum InstanceCommands {
    /// List all tracked instances
    List,
    /// Show instance details
    Get {
        /// Instance ID, unambiguous prefix or display name
        id: String,
    },
    /// Allocate and provision a new instance
    Create {
        /// Display name
        #[arg(short, long)]
        name: Option<String>,
    },
    /// Track an instance that already exists on the provider
    Register {
        /// Full provider instance ID
        id: String,

        /// Display name
        #[arg(short, long)]
        name: Option<String>,
    },
    /// Start an instance and relaunch its application
    Start {
        /// Instance ID, unambiguous prefix or display name
        id: String,
    },
    /// Stop an instance
    Stop {
        /// Instance ID, unambiguous prefix or display name
        id: String,
    },
    /// Change an instance's display name
    Rename {
        /// Instance ID, unambiguous prefix or display name
        id: String,

        /// New display name
        name: String,
    },
    /// Stop tracking an instance (the remote node is left alone)
    Remove {
        /// Instance ID, unambiguous prefix or display name
        id: String,
    },
    /// Show the application process status and log tail
    AppLog {
        /// Instance ID, unambiguous prefix or display name
        id: String,

        /// Number of log lines
        #[arg(short, long, default_value = "100")]
        lines: usize,
    },
}

/// Handle instance commands
pub async fn handle_instance_command(command: InstanceCommands, config: &Config) -> Result<()> {
    let client = ControllerClient::new(&config.controller_url);

    match command {
        InstanceCommands::List => list_instances(&client).await,
        InstanceCommands::Get { id } => get_instance(&client, &id).await,
        InstanceCommands::Create { name } => create_instance(&client, name).await,
        InstanceCommands::Register { id, name } => register_instance(&client, &id, name).await,
        InstanceCommands::Start { id } => start_instance(&client, &id).await,
        InstanceCommands::Stop { id } => stop_instance(&client, &id).await,
        InstanceCommands::Rename { id, name } => rename_instance(&client, &id, &name).await,
        InstanceCommands::Remove { id } => remove_instance(&client, &id).await,
        InstanceCommands::AppLog { id, lines } => app_log(&client, &id, lines).await,
    }
}

async fn list_instances(client: &ControllerClient) -> Result<()> {
    let instances = client.list_instances().await?;

    if instances.is_empty() {
        println!("{}", "No instances tracked.".yellow());
        return Ok(());
    }

    println!(
        "{}",
        format!("Found {} tracked instance(s):", instances.len()).bold()
    );
    println!();
    for instance in &instances {
        print_instance_summary(instance);
    }

    Ok(())
}

async fn get_instance(client: &ControllerClient, id: &str) -> Result<()> {
    let id = resolve_instance_id(client, id).await?;
    let instance = client.get_instance(&id).await?;

    print_instance_summary(&instance);
    match &instance.schedule {
        Some(schedule) => println!(
            "    Schedule:  {} - {} ({} min)",
            schedule.start_time, schedule.end_time, schedule.duration_minutes
        ),
        None => println!("    Schedule:  {}", "none".dimmed()),
    }

    Ok(())
}

async fn create_instance(client: &ControllerClient, name: Option<String>) -> Result<()> {
    let task_id = client.create_instance(name).await?;
    print_accepted("Instance creation", &task_id);
    Ok(())
}

async fn register_instance(client: &ControllerClient, id: &str, name: Option<String>) -> Result<()> {
    let instance = client.register_instance(id, name).await?;

    println!("{}", "✓ Instance registered".green().bold());
    print_instance_summary(&instance);
    Ok(())
}

async fn start_instance(client: &ControllerClient, id: &str) -> Result<()> {
    let id = resolve_instance_id(client, id).await?;
    let task_id = client.start_instance(&id).await?;
    print_accepted(&format!("Start of {}", id), &task_id);
    Ok(())
}

async fn stop_instance(client: &ControllerClient, id: &str) -> Result<()> {
    let id = resolve_instance_id(client, id).await?;
    let task_id = client.stop_instance(&id).await?;
    print_accepted(&format!("Stop of {}", id), &task_id);
    Ok(())
}

async fn rename_instance(client: &ControllerClient, id: &str, name: &str) -> Result<()> {
    let id = resolve_instance_id(client, id).await?;
    let instance = client.rename_instance(&id, name).await?;

    println!(
        "{} {} is now {}",
        "✓".green().bold(),
        instance.id.cyan(),
        instance.display_name.bold()
    );
    Ok(())
}

async fn remove_instance(client: &ControllerClient, id: &str) -> Result<()> {
    let id = resolve_instance_id(client, id).await?;
    let instance = client.remove_instance(&id).await?;

    println!(
        "{} No longer tracking {} ({})",
        "✓".green().bold(),
        instance.id.cyan(),
        instance.display_name
    );
    println!("  {}", "The remote instance was not stopped or terminated.".dimmed());
    Ok(())
}

async fn app_log(client: &ControllerClient, id: &str, lines: usize) -> Result<()> {
    let id = resolve_instance_id(client, id).await?;
    let log = client.fetch_app_log(&id, lines).await?;

    let process = if log.process_running {
        "running".green()
    } else {
        "not running".red()
    };
    println!("{} {}", "Application process:".bold(), process);
    println!(
        "{}",
        format!("Last {} line(s) of the application log:", log.lines).dimmed()
    );
    println!();
    print!("{}", log.content);
    if !log.content.ends_with('\n') {
        println!();
    }

    Ok(())
}

fn print_accepted(what: &str, task_id: &TaskId) {
    println!("{} {} accepted", "✓".green().bold(), what);
    println!("  Task: {}", task_id.to_string().cyan());
    println!(
        "  {}",
        "Follow progress with `nimbus task list` and `nimbus log show`.".dimmed()
    );
}

/// Print an instance summary
fn print_instance_summary(instance: &Instance) {
    println!(
        "  {} {} {}",
        "▸".cyan(),
        instance.display_name.bold(),
        format!("({})", instance.id).dimmed()
    );
    println!("    Status:    {}", colorize_status(instance.status));
    if let Some(url) = &instance.url {
        println!("    URL:       {}", url.underline());
    }
    println!();
}

/// Colorize instance status for display
pub fn colorize_status(status: InstanceStatus) -> ColoredString {
    let label = status.to_string();
    match status {
        InstanceStatus::Running => label.green(),
        InstanceStatus::Stopped => label.dimmed(),
        InstanceStatus::Created | InstanceStatus::Setup => label.blue(),
        InstanceStatus::Starting | InstanceStatus::Stopping => label.yellow(),
        InstanceStatus::Terminated => label.red().dimmed(),
        InstanceStatus::Error => label.red().bold(),
    }
}
