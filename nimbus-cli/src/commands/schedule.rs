//! Schedule command handlers

use anyhow::Result;
use clap::Subcommand;
use colored::*;

use crate::config::Config;
use crate::id_resolver::resolve_instance_id;
use nimbus_client::ControllerClient;

/// Schedule subcommands
#[derive(Subcommand)]
pub enum ScheduleCommands {
    /// List all schedules with their next start and stop
    List,
    /// Show installed triggers
    Triggers,
    /// Set or replace an instance's daily schedule
    Set {
        /// Instance ID, unambiguous prefix or display name
        id: String,

        /// Daily start time (HH:MM, controller timezone)
        start: String,

        /// Minutes the instance stays up
        duration: i64,
    },
    /// Remove an instance's schedule
    Remove {
        /// Instance ID, unambiguous prefix or display name
        id: String,
    },
    /// Fire an instance's start trigger now
    Run {
        /// Instance ID, unambiguous prefix or display name
        id: String,
    },
}

/// Handle schedule commands
pub async fn handle_schedule_command(command: ScheduleCommands, config: &Config) -> Result<()> {
    let client = ControllerClient::new(&config.controller_url);

    match command {
        ScheduleCommands::List => list_schedules(&client).await,
        ScheduleCommands::Triggers => list_triggers(&client).await,
        ScheduleCommands::Set {
            id,
            start,
            duration,
        } => set_schedule(&client, &id, &start, duration).await,
        ScheduleCommands::Remove { id } => remove_schedule(&client, &id).await,
        ScheduleCommands::Run { id } => run_schedule(&client, &id).await,
    }
}

async fn list_schedules(client: &ControllerClient) -> Result<()> {
    let schedules = client.list_schedules().await?;

    if schedules.is_empty() {
        println!("{}", "No schedules configured.".yellow());
        return Ok(());
    }

    println!(
        "{}",
        format!("Found {} schedule(s):", schedules.len()).bold()
    );
    println!();
    for view in schedules {
        let schedule = &view.schedule;
        println!("  {} {}", "▸".cyan(), schedule.instance_id.bold());
        println!(
            "    Window:      {} - {} {} ({} min)",
            schedule.start_time,
            schedule.end_time,
            view.timezone.dimmed(),
            schedule.duration_minutes
        );
        if let Some(next) = view.next_start {
            println!(
                "    Next start:  {}",
                next.format("%Y-%m-%d %H:%M UTC").to_string().dimmed()
            );
        }
        if let Some(next) = view.next_stop {
            println!(
                "    Next stop:   {}",
                next.format("%Y-%m-%d %H:%M UTC").to_string().dimmed()
            );
        }
        println!();
    }

    Ok(())
}

async fn list_triggers(client: &ControllerClient) -> Result<()> {
    let triggers = client.list_triggers().await?;

    if triggers.is_empty() {
        println!("{}", "No triggers installed.".yellow());
        return Ok(());
    }

    for trigger in triggers {
        let state = if trigger.executing {
            "executing".yellow()
        } else {
            "idle".dimmed()
        };
        println!(
            "  {} {:<5} at {}  next {}  {}",
            trigger.instance_id.bold(),
            trigger.direction.to_string().cyan(),
            trigger.at,
            trigger.next_fire.format("%Y-%m-%d %H:%M UTC"),
            state
        );
    }

    Ok(())
}

async fn set_schedule(client: &ControllerClient, id: &str, start: &str, duration: i64) -> Result<()> {
    let id = resolve_instance_id(client, id).await?;
    let schedule = client.set_schedule(&id, start, duration).await?;

    println!("{}", "✓ Schedule set".green().bold());
    println!("  Instance: {}", schedule.instance_id.cyan());
    println!(
        "  Window:   {} - {} ({} min)",
        schedule.start_time, schedule.end_time, schedule.duration_minutes
    );
    Ok(())
}

async fn remove_schedule(client: &ControllerClient, id: &str) -> Result<()> {
    let id = resolve_instance_id(client, id).await?;
    client.remove_schedule(&id).await?;

    println!("{} Schedule removed for {}", "✓".green().bold(), id.cyan());
    Ok(())
}

async fn run_schedule(client: &ControllerClient, id: &str) -> Result<()> {
    let id = resolve_instance_id(client, id).await?;
    match client.run_schedule_now(&id).await {
        Ok(task_id) => {
            println!("{} Start trigger fired for {}", "✓".green().bold(), id.cyan());
            println!("  Task: {}", task_id.to_string().cyan());
            Ok(())
        }
        Err(e) if e.is_conflict() => {
            println!(
                "{} A previous fire for {} is still executing",
                "!".yellow().bold(),
                id
            );
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
