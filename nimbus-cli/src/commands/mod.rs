//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod instance;
mod log;
mod schedule;
mod task;

pub use instance::InstanceCommands;
pub use log::LogCommands;
pub use schedule::ScheduleCommands;
pub use task::TaskCommands;

use anyhow::Result;
use clap::Subcommand;

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Instance tracking and lifecycle
    Instance {
        #[command(subcommand)]
        command: InstanceCommands,
    },
    /// Daily on/off schedules
    Schedule {
        #[command(subcommand)]
        command: ScheduleCommands,
    },
    /// Lifecycle operations in flight
    Task {
        #[command(subcommand)]
        command: TaskCommands,
    },
    /// Controller operation log
    Log {
        #[command(subcommand)]
        command: LogCommands,
    },
    /// Summary of instances, tasks and log size
    Status,
}

/// Handle a CLI command
///
/// Routes the command to the appropriate handler module.
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Instance { command } => instance::handle_instance_command(command, config).await,
        Commands::Schedule { command } => schedule::handle_schedule_command(command, config).await,
        Commands::Task { command } => task::handle_task_command(command, config).await,
        Commands::Log { command } => log::handle_log_command(command, config).await,
        Commands::Status => task::show_status(config).await,
    }
}
