//! Controller configuration
//!
//! Defines all configurable parameters for the controller including
//! provider credentials, remote provisioning commands, wait bounds and
//! scheduler timing.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono_tz::Tz;

use crate::provisioning::SshCredentials;
use crate::provisioning::ssh::SshSettings;
use crate::service::lifecycle::LifecycleSettings;
use crate::service::scheduler::SchedulerSettings;

/// Separator between entries of SETUP_COMMANDS / LAUNCH_COMMANDS
const COMMAND_SEPARATOR: &str = ";;";

/// Where snapshots of the registry and schedules are kept
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotBackend {
    /// JSON document on the local filesystem
    File(PathBuf),
    /// Single-row table in Postgres
    Postgres(String),
    /// Nothing survives a restart
    Memory,
}

impl FromStr for SnapshotBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s == "memory" {
            Ok(SnapshotBackend::Memory)
        } else if s.starts_with("postgres://") || s.starts_with("postgresql://") {
            Ok(SnapshotBackend::Postgres(s.to_string()))
        } else if let Some(path) = s.strip_prefix("file:") {
            if path.is_empty() {
                anyhow::bail!("snapshot file path cannot be empty");
            }
            Ok(SnapshotBackend::File(PathBuf::from(path)))
        } else {
            anyhow::bail!(
                "unsupported snapshot backend '{}', expected file:<path>, memory or a postgres:// URL",
                s
            )
        }
    }
}

/// Controller configuration
///
/// Every timeout and interval is configurable so the same binary can be tuned
/// for slow cloud regions or quick local experiments.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP API binds to
    pub bind_addr: String,

    /// AWS region; falls back to the SDK's default provider chain when unset
    pub aws_region: Option<String>,

    /// Launch template used to create new instances
    pub launch_template_id: Option<String>,

    /// User for remote commands
    pub ssh_username: String,

    /// Private key for remote commands
    pub ssh_key_path: Option<PathBuf>,

    /// Port the launched application listens on
    pub app_port: u16,

    pub snapshot: SnapshotBackend,

    /// Timezone schedule times are interpreted in
    pub timezone: Tz,

    /// Upper bound for waiting on a provider state change
    pub state_wait_timeout: Duration,

    /// How often the provider is polled while waiting
    pub state_poll_interval: Duration,

    pub ssh_connect_retries: u32,
    pub ssh_retry_delay: Duration,
    pub ssh_connect_timeout: Duration,
    pub ssh_command_timeout: Duration,

    /// Lifecycle operations allowed to run at the same time
    pub max_parallel_operations: usize,

    /// How often the scheduler checks for due triggers
    pub scheduler_tick: Duration,

    /// How late a trigger may still fire
    pub schedule_grace: Duration,

    /// Commands that install the application on a fresh node
    pub setup_commands: Vec<String>,

    /// Commands that (re)start the application
    pub launch_commands: Vec<String>,
}

impl Config {
    /// Creates a configuration with defaults
    pub fn new() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            aws_region: None,
            launch_template_id: None,
            ssh_username: "ubuntu".to_string(),
            ssh_key_path: None,
            app_port: 1100,
            snapshot: SnapshotBackend::File(PathBuf::from("nimbus-snapshot.json")),
            timezone: Tz::UTC,
            state_wait_timeout: Duration::from_secs(600),
            state_poll_interval: Duration::from_secs(5),
            ssh_connect_retries: 5,
            ssh_retry_delay: Duration::from_secs(10),
            ssh_connect_timeout: Duration::from_secs(20),
            ssh_command_timeout: Duration::from_secs(1800),
            max_parallel_operations: 4,
            scheduler_tick: Duration::from_secs(15),
            schedule_grace: Duration::from_secs(300),
            setup_commands: default_setup_commands(),
            launch_commands: default_launch_commands(),
        }
    }

    /// Creates configuration from environment variables
    ///
    /// A `.env` file in the working directory is loaded first when present.
    ///
    /// Recognized variables:
    /// - NIMBUS_BIND_ADDR (default: 0.0.0.0:8080)
    /// - AWS_REGION, LAUNCH_TEMPLATE_ID
    /// - SSH_USERNAME (default: ubuntu), SSH_KEY_PATH
    /// - APP_PORT (default: 1100)
    /// - NIMBUS_SNAPSHOT (default: file:nimbus-snapshot.json)
    /// - NIMBUS_TIMEZONE (default: UTC)
    /// - STATE_WAIT_TIMEOUT, STATE_POLL_INTERVAL (seconds)
    /// - SSH_CONNECT_RETRIES, SSH_RETRY_DELAY, SSH_CONNECT_TIMEOUT, SSH_COMMAND_TIMEOUT
    /// - MAX_PARALLEL_OPERATIONS (default: 4)
    /// - SCHEDULER_TICK, SCHEDULE_GRACE (seconds)
    /// - SETUP_COMMANDS, LAUNCH_COMMANDS (entries separated by `;;`)
    pub fn from_env() -> anyhow::Result<Self> {
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                anyhow::bail!("failed to load .env file: {}", e);
            }
        }

        let defaults = Self::new();

        let snapshot = match std::env::var("NIMBUS_SNAPSHOT") {
            Ok(value) => value.parse()?,
            Err(_) => defaults.snapshot,
        };

        let timezone = match std::env::var("NIMBUS_TIMEZONE") {
            Ok(value) => value
                .parse::<Tz>()
                .map_err(|e| anyhow::anyhow!("invalid NIMBUS_TIMEZONE '{}': {}", value, e))?,
            Err(_) => defaults.timezone,
        };

        Ok(Self {
            bind_addr: env_string("NIMBUS_BIND_ADDR").unwrap_or(defaults.bind_addr),
            aws_region: env_string("AWS_REGION"),
            launch_template_id: env_string("LAUNCH_TEMPLATE_ID"),
            ssh_username: env_string("SSH_USERNAME").unwrap_or(defaults.ssh_username),
            ssh_key_path: env_string("SSH_KEY_PATH").map(PathBuf::from),
            app_port: env_parse("APP_PORT").unwrap_or(defaults.app_port),
            snapshot,
            timezone,
            state_wait_timeout: env_secs("STATE_WAIT_TIMEOUT")
                .unwrap_or(defaults.state_wait_timeout),
            state_poll_interval: env_secs("STATE_POLL_INTERVAL")
                .unwrap_or(defaults.state_poll_interval),
            ssh_connect_retries: env_parse("SSH_CONNECT_RETRIES")
                .unwrap_or(defaults.ssh_connect_retries),
            ssh_retry_delay: env_secs("SSH_RETRY_DELAY").unwrap_or(defaults.ssh_retry_delay),
            ssh_connect_timeout: env_secs("SSH_CONNECT_TIMEOUT")
                .unwrap_or(defaults.ssh_connect_timeout),
            ssh_command_timeout: env_secs("SSH_COMMAND_TIMEOUT")
                .unwrap_or(defaults.ssh_command_timeout),
            max_parallel_operations: env_parse("MAX_PARALLEL_OPERATIONS")
                .unwrap_or(defaults.max_parallel_operations),
            scheduler_tick: env_secs("SCHEDULER_TICK").unwrap_or(defaults.scheduler_tick),
            schedule_grace: env_secs("SCHEDULE_GRACE").unwrap_or(defaults.schedule_grace),
            setup_commands: env_string("SETUP_COMMANDS")
                .map(|s| split_commands(&s))
                .unwrap_or(defaults.setup_commands),
            launch_commands: env_string("LAUNCH_COMMANDS")
                .map(|s| split_commands(&s))
                .unwrap_or(defaults.launch_commands),
        })
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.bind_addr.is_empty() {
            anyhow::bail!("bind_addr cannot be empty");
        }

        if self.ssh_username.is_empty() {
            anyhow::bail!("ssh_username cannot be empty");
        }

        if self.app_port == 0 {
            anyhow::bail!("app_port must be greater than 0");
        }

        if self.state_poll_interval.is_zero() {
            anyhow::bail!("state_poll_interval must be greater than 0");
        }

        if self.state_wait_timeout < self.state_poll_interval {
            anyhow::bail!("state_wait_timeout must not be shorter than state_poll_interval");
        }

        if self.ssh_connect_retries == 0 {
            anyhow::bail!("ssh_connect_retries must be greater than 0");
        }

        if self.max_parallel_operations == 0 {
            anyhow::bail!("max_parallel_operations must be greater than 0");
        }

        if self.scheduler_tick.is_zero() {
            anyhow::bail!("scheduler_tick must be greater than 0");
        }

        if self.schedule_grace < self.scheduler_tick {
            anyhow::bail!("schedule_grace must cover at least one scheduler_tick");
        }

        if self.launch_commands.is_empty() {
            anyhow::bail!("launch_commands cannot be empty");
        }

        Ok(())
    }

    pub fn lifecycle_settings(&self) -> LifecycleSettings {
        LifecycleSettings {
            launch_template_id: self.launch_template_id.clone(),
            credentials: SshCredentials {
                username: self.ssh_username.clone(),
                key_path: self.ssh_key_path.clone(),
            },
            app_port: self.app_port,
            setup_commands: self.setup_commands.clone(),
            launch_commands: self.launch_commands.clone(),
            state_wait_timeout: self.state_wait_timeout,
            state_poll_interval: self.state_poll_interval,
        }
    }

    pub fn ssh_settings(&self) -> SshSettings {
        SshSettings {
            connect_retries: self.ssh_connect_retries,
            retry_delay: self.ssh_retry_delay,
            connect_timeout: self.ssh_connect_timeout,
            command_timeout: self.ssh_command_timeout,
        }
    }

    pub fn scheduler_settings(&self) -> SchedulerSettings {
        SchedulerSettings {
            timezone: self.timezone,
            tick: self.scheduler_tick,
            grace: self.schedule_grace,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

fn default_setup_commands() -> Vec<String> {
    vec![
        "git clone https://github.com/jacksonlmakl/manager.git && cd manager && bash bin/install"
            .to_string(),
    ]
}

fn default_launch_commands() -> Vec<String> {
    ["launch", "stop", "start"]
        .iter()
        .map(|script| {
            format!(
                "cd manager && (bash ~/manager/{script} > ~/{script}.log 2>&1 &) < /dev/null"
            )
        })
        .collect()
}

fn split_commands(raw: &str) -> Vec<String> {
    raw.split(COMMAND_SEPARATOR)
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect()
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.trim().parse().ok())
}

fn env_secs(name: &str) -> Option<Duration> {
    env_parse::<u64>(name).map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.app_port, 1100);
        assert_eq!(config.ssh_connect_retries, 5);
        assert_eq!(config.ssh_retry_delay, Duration::from_secs(10));
        assert_eq!(config.timezone, Tz::UTC);
        assert_eq!(config.launch_commands.len(), 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();

        config.ssh_username = String::new();
        assert!(config.validate().is_err());
        config.ssh_username = "ubuntu".to_string();

        config.max_parallel_operations = 0;
        assert!(config.validate().is_err());
        config.max_parallel_operations = 2;

        config.schedule_grace = Duration::from_secs(1);
        assert!(config.validate().is_err());
        config.schedule_grace = Duration::from_secs(300);

        config.state_wait_timeout = Duration::from_secs(1);
        assert!(config.validate().is_err());
        config.state_wait_timeout = Duration::from_secs(600);

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_snapshot_backend_parsing() {
        assert_eq!(
            "file:/var/lib/nimbus/state.json".parse::<SnapshotBackend>().unwrap(),
            SnapshotBackend::File(PathBuf::from("/var/lib/nimbus/state.json"))
        );
        assert_eq!(
            "memory".parse::<SnapshotBackend>().unwrap(),
            SnapshotBackend::Memory
        );
        assert!(matches!(
            "postgres://nimbus@localhost/nimbus".parse::<SnapshotBackend>(),
            Ok(SnapshotBackend::Postgres(_))
        ));
        assert!("file:".parse::<SnapshotBackend>().is_err());
        assert!("redis://localhost".parse::<SnapshotBackend>().is_err());
    }

    #[test]
    fn test_split_commands() {
        let commands = split_commands("sudo apt-get update ;; bash install.sh;;  ");
        assert_eq!(commands, vec!["sudo apt-get update", "bash install.sh"]);
    }

    #[test]
    fn test_default_launch_commands_background_scripts() {
        let commands = default_launch_commands();
        assert_eq!(
            commands[0],
            "cd manager && (bash ~/manager/launch > ~/launch.log 2>&1 &) < /dev/null"
        );
        assert!(commands[2].contains("~/manager/start > ~/start.log"));
    }
}
