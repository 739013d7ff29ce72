//! Lifecycle Controller
//!
//! Drives the per-instance state machine:
//! - create: allocate, wait for running, install, launch
//! - start: start (or wait out a transition), wait for running, launch
//! - stop: stop, wait for stopped
//!
//! Create, start and stop validate synchronously and then run as tracked
//! tasks. Operations on the same instance are serialized by a per-instance
//! lock held for the whole remote sequence; operations on different instances
//! run in parallel up to the task pool size. Failures are caught at the task
//! boundary, recorded in the operation log and reflected as status `error`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use nimbus_core::domain::instance::{Instance, InstanceStatus};
use nimbus_core::domain::task::{Operation, TaskId};
use nimbus_core::dto::instance::AppLog;
use tokio::sync::OwnedMutexGuard;

use crate::error::{ControlError, Result};
use crate::oplog::OperationLog;
use crate::provider::{ComputeProvider, RemoteInstance, RemoteState};
use crate::provisioning::{ProvisioningAgent, SshCredentials};
use crate::registry::InstanceRegistry;
use crate::snapshot::SnapshotWriter;
use crate::tasks::{TaskHandle, TaskTracker};

/// Application log read by [`LifecycleController::fetch_app_log`]
const APP_LOG_PATH: &str = "~/launch.log";

/// Matches the launched application; the bracket keeps pgrep from matching itself
const APP_PROCESS_PATTERN: &str = "[m]anager/launch";

/// Upper bound for a log tail request
pub const MAX_LOG_LINES: usize = 10_000;

#[derive(Debug, Clone)]
pub struct LifecycleSettings {
    pub launch_template_id: Option<String>,
    pub credentials: SshCredentials,
    pub app_port: u16,
    /// Run once on a freshly created node
    pub setup_commands: Vec<String>,
    /// Run after every create and start
    pub launch_commands: Vec<String>,
    pub state_wait_timeout: Duration,
    pub state_poll_interval: Duration,
}

pub struct LifecycleController {
    registry: Arc<InstanceRegistry>,
    oplog: Arc<OperationLog>,
    tasks: Arc<TaskTracker>,
    provider: Arc<dyn ComputeProvider>,
    agent: Arc<dyn ProvisioningAgent>,
    snapshots: Arc<SnapshotWriter>,
    settings: LifecycleSettings,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

/// Local status mirroring a remote state
fn status_from_remote(state: RemoteState) -> InstanceStatus {
    match state {
        RemoteState::Pending => InstanceStatus::Starting,
        RemoteState::Running => InstanceStatus::Running,
        RemoteState::Stopping => InstanceStatus::Stopping,
        RemoteState::Stopped => InstanceStatus::Stopped,
        RemoteState::ShuttingDown | RemoteState::Terminated => InstanceStatus::Terminated,
        RemoteState::Unknown => InstanceStatus::Error,
    }
}

impl LifecycleController {
    pub fn new(
        registry: Arc<InstanceRegistry>,
        oplog: Arc<OperationLog>,
        tasks: Arc<TaskTracker>,
        provider: Arc<dyn ComputeProvider>,
        agent: Arc<dyn ProvisioningAgent>,
        snapshots: Arc<SnapshotWriter>,
        settings: LifecycleSettings,
    ) -> Self {
        Self {
            registry,
            oplog,
            tasks,
            provider,
            agent,
            snapshots,
            settings,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Application endpoint for a public address
    pub fn url_for(&self, address: &str) -> String {
        format!("http://{}:{}", address, self.settings.app_port)
    }

    fn ensure_known(&self, id: &str) -> Result<()> {
        if self.registry.contains(id) {
            Ok(())
        } else {
            Err(ControlError::NotFound(id.to_string()))
        }
    }

    /// Waits for exclusive access to `id`
    async fn lock_instance(&self, id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(id.to_string()).or_default())
        };
        lock.lock_owned().await
    }

    async fn set_status(&self, id: &str, status: InstanceStatus) -> Result<()> {
        self.registry.set_status(id, status)?;
        self.snapshots.persist().await;
        Ok(())
    }

    async fn set_url(&self, id: &str, url: Option<String>) -> Result<()> {
        self.registry.set_url(id, url)?;
        self.snapshots.persist().await;
        Ok(())
    }

    async fn wait_for(&self, id: &str, target: RemoteState) -> Result<RemoteInstance> {
        self.provider
            .wait_until(
                id,
                target,
                self.settings.state_wait_timeout,
                self.settings.state_poll_interval,
            )
            .await
    }

    async fn launch(&self, id: &str, address: &str) -> Result<()> {
        self.oplog.info(format!("Launching application on instance {}", id));
        self.agent
            .run_sequence(address, &self.settings.credentials, &self.settings.launch_commands)
            .await?
            .into_result()
    }

    /// Records a failed operation; the instance, if any, ends up in `error`
    async fn fail(&self, id: Option<&str>, action: &str, err: &ControlError) {
        match id {
            Some(id) => {
                // The instance may have been removed while the task ran
                if self.registry.set_status(id, InstanceStatus::Error).is_ok() {
                    let _ = self.registry.set_url(id, None);
                    self.snapshots.persist().await;
                }
                self.oplog
                    .error(format!("Failed to {} instance {}: {}", action, id, err.report()));
            }
            None => self
                .oplog
                .error(format!("Failed to {} instance: {}", action, err.report())),
        }
    }

    /// Allocates a node from the launch template, installs and launches the application
    pub fn create(self: &Arc<Self>, display_name: Option<String>) -> Result<TaskHandle> {
        if self.settings.launch_template_id.is_none() {
            return Err(ControlError::Validation(
                "LAUNCH_TEMPLATE_ID is not configured".to_string(),
            ));
        }

        let this = Arc::clone(self);
        Ok(self.tasks.spawn_with(
            Operation::Create,
            None,
            "Creating new instance",
            move |task_id| async move {
                let mut created = None;
                let mut lock = None;
                let result = this
                    .create_inner(task_id, display_name, &mut created, &mut lock)
                    .await;
                // Recorded before the lock is released so a queued operation never sees it
                if let Err(e) = &result {
                    this.fail(created.as_deref(), "create", e).await;
                }
                drop(lock);
                result
            },
        ))
    }

    async fn create_inner(
        &self,
        task_id: TaskId,
        display_name: Option<String>,
        created: &mut Option<String>,
        lock: &mut Option<OwnedMutexGuard<()>>,
    ) -> Result<()> {
        let id = self
            .provider
            .create(self.settings.launch_template_id.as_deref())
            .await?;
        *created = Some(id.clone());
        self.tasks.set_instance(task_id, &id);

        *lock = Some(self.lock_instance(&id).await);

        let instance = Instance::new(&id, display_name, InstanceStatus::Created);
        self.oplog.info(format!(
            "Created instance {} ({})",
            id, instance.display_name
        ));
        self.registry.upsert(instance);
        self.snapshots.persist().await;

        let remote = self.wait_for(&id, RemoteState::Running).await?;
        let address = remote.public_address.ok_or_else(|| {
            ControlError::Provider(format!("instance {} has no public address", id))
        })?;

        self.oplog.info(format!("Installing software on instance {}", id));
        self.agent
            .run_sequence(&address, &self.settings.credentials, &self.settings.setup_commands)
            .await?
            .into_result()?;
        self.set_status(&id, InstanceStatus::Setup).await?;

        self.launch(&id, &address).await?;
        self.set_status(&id, InstanceStatus::Running).await?;

        let url = self.url_for(&address);
        self.set_url(&id, Some(url.clone())).await?;
        self.oplog
            .info(format!("Instance {} is running at {}", id, url));
        Ok(())
    }

    /// Starts a tracked instance and relaunches its application
    pub fn start(self: &Arc<Self>, id: &str) -> Result<TaskHandle> {
        self.ensure_known(id)?;

        let this = Arc::clone(self);
        let id = id.to_string();
        Ok(self.tasks.spawn(
            Operation::Start,
            Some(id.clone()),
            format!("Starting instance {}", id),
            async move {
                let _lock = this.lock_instance(&id).await;
                let result = this.start_inner(&id).await;
                if let Err(e) = &result {
                    this.fail(Some(&id), "start", e).await;
                }
                result
            },
        ))
    }

    async fn start_inner(&self, id: &str) -> Result<()> {
        let remote = self.provider.describe(id).await?;

        match remote.state {
            RemoteState::Running => {
                self.set_status(id, InstanceStatus::Running).await?;
                self.set_url(id, remote.public_address.as_deref().map(|a| self.url_for(a)))
                    .await?;
                self.oplog
                    .info(format!("Instance {} is already running", id));
                return Ok(());
            }
            state if state.is_gone() => {
                self.set_status(id, InstanceStatus::Terminated).await?;
                return Err(ControlError::Provider(format!(
                    "instance {} is {} and cannot be started",
                    id, state
                )));
            }
            RemoteState::Pending => {
                self.set_status(id, InstanceStatus::Starting).await?;
                self.oplog
                    .info(format!("Instance {} is already starting", id));
            }
            RemoteState::Stopping => {
                self.set_status(id, InstanceStatus::Starting).await?;
                self.oplog.info(format!(
                    "Instance {} is stopping, waiting before starting it",
                    id
                ));
                self.wait_for(id, RemoteState::Stopped).await?;
                self.provider.start(id).await?;
            }
            _ => {
                self.set_status(id, InstanceStatus::Starting).await?;
                self.oplog.info(format!("Starting instance {}", id));
                self.provider.start(id).await?;
            }
        }

        let remote = self.wait_for(id, RemoteState::Running).await?;
        self.set_status(id, InstanceStatus::Running).await?;

        let address = remote.public_address.ok_or_else(|| {
            ControlError::Provider(format!("instance {} has no public address", id))
        })?;
        self.launch(id, &address).await?;

        let url = self.url_for(&address);
        self.set_url(id, Some(url.clone())).await?;
        self.oplog
            .info(format!("Instance {} started at {}", id, url));
        Ok(())
    }

    /// Stops a tracked instance
    pub fn stop(self: &Arc<Self>, id: &str) -> Result<TaskHandle> {
        self.ensure_known(id)?;

        let this = Arc::clone(self);
        let id = id.to_string();
        Ok(self.tasks.spawn(
            Operation::Stop,
            Some(id.clone()),
            format!("Stopping instance {}", id),
            async move {
                let _lock = this.lock_instance(&id).await;
                let result = this.stop_inner(&id).await;
                if let Err(e) = &result {
                    this.fail(Some(&id), "stop", e).await;
                }
                result
            },
        ))
    }

    async fn stop_inner(&self, id: &str) -> Result<()> {
        let remote = self.provider.describe(id).await?;

        match remote.state {
            RemoteState::Stopped => {
                self.set_status(id, InstanceStatus::Stopped).await?;
                self.set_url(id, None).await?;
                self.oplog
                    .info(format!("Instance {} is already stopped", id));
                return Ok(());
            }
            state if state.is_gone() => {
                self.set_status(id, InstanceStatus::Terminated).await?;
                self.set_url(id, None).await?;
                self.oplog
                    .warn(format!("Instance {} is {}, nothing to stop", id, state));
                return Ok(());
            }
            RemoteState::Stopping => {
                self.set_status(id, InstanceStatus::Stopping).await?;
                self.set_url(id, None).await?;
                self.oplog
                    .info(format!("Instance {} is already stopping", id));
            }
            RemoteState::Pending => {
                self.set_status(id, InstanceStatus::Stopping).await?;
                self.set_url(id, None).await?;
                self.oplog.info(format!(
                    "Instance {} is still starting, waiting before stopping it",
                    id
                ));
                self.wait_for(id, RemoteState::Running).await?;
                self.provider.stop(id).await?;
            }
            _ => {
                self.set_status(id, InstanceStatus::Stopping).await?;
                self.set_url(id, None).await?;
                self.oplog.info(format!("Stopping instance {}", id));
                self.provider.stop(id).await?;
            }
        }

        self.wait_for(id, RemoteState::Stopped).await?;
        self.set_status(id, InstanceStatus::Stopped).await?;
        self.oplog.info(format!("Instance {} stopped", id));
        Ok(())
    }

    /// Starts tracking an instance that already exists on the provider
    pub async fn register_existing(&self, id: &str, display_name: Option<String>) -> Result<Instance> {
        let id = id.trim();
        if id.is_empty() {
            return Err(ControlError::Validation("instance id cannot be empty".to_string()));
        }
        if self.registry.contains(id) {
            return Err(ControlError::Validation(format!(
                "instance {} is already registered",
                id
            )));
        }

        let remote = self.provider.describe(id).await?;

        let mut instance = Instance::new(id, display_name, status_from_remote(remote.state));
        if remote.state == RemoteState::Running {
            instance.url = remote.public_address.as_deref().map(|a| self.url_for(a));
        }

        self.registry.upsert(instance.clone());
        self.oplog.info(format!(
            "Registered existing instance {} ({}) as {}",
            id, instance.display_name, instance.status
        ));
        self.snapshots.persist().await;
        Ok(instance)
    }

    /// Changes the label of a tracked instance
    pub async fn rename(&self, id: &str, display_name: &str) -> Result<Instance> {
        let display_name = display_name.trim();
        if display_name.is_empty() {
            return Err(ControlError::Validation("display name cannot be empty".to_string()));
        }

        self.registry.set_display_name(id, display_name.to_string())?;
        self.oplog
            .info(format!("Renamed instance {} to {}", id, display_name));
        self.snapshots.persist().await;

        self.registry
            .get(id)
            .ok_or_else(|| ControlError::NotFound(id.to_string()))
    }

    /// Application process status and tail of its log on a running instance
    pub async fn fetch_app_log(&self, id: &str, lines: usize) -> Result<AppLog> {
        self.ensure_known(id)?;
        if lines == 0 || lines > MAX_LOG_LINES {
            return Err(ControlError::Validation(format!(
                "lines must be between 1 and {}",
                MAX_LOG_LINES
            )));
        }

        let remote = self.provider.describe(id).await?;
        if remote.state != RemoteState::Running {
            return Err(ControlError::Validation(format!(
                "instance {} is {}, not running",
                id, remote.state
            )));
        }
        let address = remote.public_address.ok_or_else(|| {
            ControlError::Provider(format!("instance {} has no public address", id))
        })?;

        let creds = &self.settings.credentials;
        let process = self
            .agent
            .run(&address, creds, &format!("pgrep -f '{}'", APP_PROCESS_PATTERN))
            .await?;
        let tail = self
            .agent
            .run(&address, creds, &format!("tail -n {} {}", lines, APP_LOG_PATH))
            .await?;
        if !tail.success() {
            return Err(ControlError::Provisioning {
                message: format!("failed to read {} on instance {}", APP_LOG_PATH, id),
                detail: Some(tail.transcript()),
            });
        }

        Ok(AppLog {
            instance_id: id.to_string(),
            process_running: process.success() && !process.stdout.trim().is_empty(),
            lines,
            content: tail.stdout,
        })
    }
}
