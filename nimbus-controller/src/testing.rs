//! In-memory stand-ins for the compute provider and provisioning agent

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use crate::error::{ControlError, Result};
use crate::oplog::OperationLog;
use crate::provider::{ComputeProvider, RemoteInstance, RemoteState};
use crate::provisioning::{CommandResult, ProvisioningAgent, SshCredentials};
use crate::registry::InstanceRegistry;
use crate::service::lifecycle::{LifecycleController, LifecycleSettings};
use crate::snapshot::{MemorySnapshotStore, SnapshotWriter};
use crate::tasks::TaskTracker;

struct FakeNode {
    state: RemoteState,
    address: Option<String>,
    /// State reached after the given number of further describe calls
    pending: Option<(RemoteState, u32)>,
}

/// Compute provider whose nodes settle after a fixed number of polls
pub struct FakeProvider {
    nodes: Mutex<HashMap<String, FakeNode>>,
    settle_polls: u32,
    created: AtomicUsize,
    starts: AtomicUsize,
    stops: AtomicUsize,
    stuck: AtomicBool,
    fail_starts: AtomicBool,
    gate: Mutex<Option<Arc<Semaphore>>>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self {
            nodes: Mutex::new(HashMap::new()),
            settle_polls: 1,
            created: AtomicUsize::new(0),
            starts: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
            stuck: AtomicBool::new(false),
            fail_starts: AtomicBool::new(false),
            gate: Mutex::new(None),
        }
    }

    fn nodes(&self) -> std::sync::MutexGuard<'_, HashMap<String, FakeNode>> {
        self.nodes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn address_for(id: &str) -> String {
        format!("10.0.0.{}", id.len())
    }

    pub fn insert(&self, id: &str, state: RemoteState) {
        let address = (state == RemoteState::Running).then(|| Self::address_for(id));
        self.nodes().insert(
            id.to_string(),
            FakeNode {
                state,
                address,
                pending: None,
            },
        );
    }

    /// Schedules `id` to reach `state` after `polls` describe calls
    pub fn transition_after(&self, id: &str, state: RemoteState, polls: u32) {
        if let Some(node) = self.nodes().get_mut(id) {
            node.pending = Some((state, polls));
        }
    }

    pub fn state(&self, id: &str) -> Option<RemoteState> {
        self.nodes().get(id).map(|n| n.state)
    }

    /// Transitions never complete
    pub fn set_stuck(&self, stuck: bool) {
        self.stuck.store(stuck, Ordering::SeqCst);
    }

    pub fn fail_starts(&self, fail: bool) {
        self.fail_starts.store(fail, Ordering::SeqCst);
    }

    /// Makes every start call block until [`release_starts`](Self::release_starts)
    pub fn hold_starts(&self) {
        *self.gate.lock().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(Semaphore::new(0)));
    }

    pub fn release_starts(&self, count: usize) {
        if let Some(gate) = self.gate.lock().unwrap_or_else(PoisonError::into_inner).as_ref() {
            gate.add_permits(count);
        }
    }

    pub fn create_calls(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn start_calls(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stop_calls(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    fn begin_transition(&self, id: &str, through: RemoteState, target: RemoteState) -> Result<RemoteState> {
        let settle = self.settle_polls;
        let mut nodes = self.nodes();
        let node = nodes
            .get_mut(id)
            .ok_or_else(|| ControlError::NotFound(id.to_string()))?;
        let previous = node.state;
        node.state = through;
        node.pending = Some((target, settle));
        Ok(previous)
    }
}

#[async_trait]
impl ComputeProvider for FakeProvider {
    async fn describe(&self, id: &str) -> Result<RemoteInstance> {
        let stuck = self.stuck.load(Ordering::SeqCst);
        let mut nodes = self.nodes();
        let node = nodes
            .get_mut(id)
            .ok_or_else(|| ControlError::NotFound(id.to_string()))?;

        if let Some((target, polls)) = node.pending {
            if !stuck {
                if polls <= 1 {
                    node.state = target;
                    node.pending = None;
                } else {
                    node.pending = Some((target, polls - 1));
                }
            }
        }
        node.address = (node.state == RemoteState::Running).then(|| Self::address_for(id));

        Ok(RemoteInstance {
            state: node.state,
            public_address: node.address.clone(),
        })
    }

    async fn create(&self, _template_id: Option<&str>) -> Result<String> {
        let n = self.created.fetch_add(1, Ordering::SeqCst) + 1;
        let id = format!("i-fake{:012}", n);
        self.insert(&id, RemoteState::Pending);
        self.transition_after(&id, RemoteState::Running, self.settle_polls);
        Ok(id)
    }

    async fn start(&self, id: &str) -> Result<RemoteState> {
        let gate = self.gate.lock().unwrap_or_else(PoisonError::into_inner).clone();
        if let Some(gate) = gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
        self.starts.fetch_add(1, Ordering::SeqCst);
        if self.fail_starts.load(Ordering::SeqCst) {
            return Err(ControlError::Provider(format!("start of {} rejected", id)));
        }
        self.begin_transition(id, RemoteState::Pending, RemoteState::Running)
    }

    async fn stop(&self, id: &str) -> Result<RemoteState> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.begin_transition(id, RemoteState::Stopping, RemoteState::Stopped)
    }
}

/// Provisioning agent that records commands and answers from a script
#[derive(Default)]
pub struct FakeAgent {
    executed: Mutex<Vec<String>>,
    failures: Mutex<HashMap<String, i32>>,
    responses: Mutex<HashMap<String, String>>,
    unreachable: AtomicBool,
    gate: Mutex<Option<Arc<Semaphore>>>,
}

impl FakeAgent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commands run so far, in order
    pub fn executed(&self) -> Vec<String> {
        self.executed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// `command` exits with `status`
    pub fn fail_command(&self, command: &str, status: i32) {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(command.to_string(), status);
    }

    /// Commands starting with `prefix` print `stdout`
    pub fn respond(&self, prefix: &str, stdout: &str) {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(prefix.to_string(), stdout.to_string());
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Makes every command block until [`release_runs`](Self::release_runs)
    pub fn hold_runs(&self) {
        *self.gate.lock().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(Semaphore::new(0)));
    }

    pub fn release_runs(&self, count: usize) {
        if let Some(gate) = self.gate.lock().unwrap_or_else(PoisonError::into_inner).as_ref() {
            gate.add_permits(count);
        }
    }
}

#[async_trait]
impl ProvisioningAgent for FakeAgent {
    async fn wait_ready(&self, address: &str, _creds: &SshCredentials) -> Result<()> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(ControlError::provisioning(format!("could not connect to {}", address)));
        }
        Ok(())
    }

    async fn run(&self, _address: &str, _creds: &SshCredentials, command: &str) -> Result<CommandResult> {
        let gate = self.gate.lock().unwrap_or_else(PoisonError::into_inner).clone();
        if let Some(gate) = gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }

        self.executed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(command.to_string());

        let exit_status = self
            .failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(command)
            .copied()
            .unwrap_or(0);
        let stdout = self
            .responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|(prefix, _)| command.starts_with(prefix.as_str()))
            .map(|(_, out)| out.clone())
            .unwrap_or_default();

        Ok(CommandResult {
            command: command.to_string(),
            exit_status,
            stdout,
            stderr: if exit_status == 0 {
                String::new()
            } else {
                "simulated failure".to_string()
            },
        })
    }
}

pub fn test_settings() -> LifecycleSettings {
    LifecycleSettings {
        launch_template_id: Some("lt-test".to_string()),
        credentials: SshCredentials {
            username: "ubuntu".to_string(),
            key_path: None,
        },
        app_port: 1100,
        setup_commands: vec!["install".to_string()],
        launch_commands: vec!["launch".to_string()],
        state_wait_timeout: Duration::from_millis(500),
        state_poll_interval: Duration::from_millis(2),
    }
}

/// Lifecycle controller wired to fakes, with handles kept for assertions
pub struct Harness {
    pub registry: Arc<InstanceRegistry>,
    pub oplog: Arc<OperationLog>,
    pub tasks: Arc<TaskTracker>,
    pub provider: Arc<FakeProvider>,
    pub agent: Arc<FakeAgent>,
    pub store: Arc<MemorySnapshotStore>,
    pub snapshots: Arc<SnapshotWriter>,
    pub lifecycle: Arc<LifecycleController>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_settings(test_settings())
    }

    pub fn with_settings(settings: LifecycleSettings) -> Self {
        let registry = Arc::new(InstanceRegistry::new());
        let oplog = Arc::new(OperationLog::new());
        let tasks = Arc::new(TaskTracker::new(4));
        let provider = Arc::new(FakeProvider::new());
        let agent = Arc::new(FakeAgent::new());
        let store = Arc::new(MemorySnapshotStore::new());
        let snapshots = Arc::new(SnapshotWriter::new(store.clone(), registry.clone(), oplog.clone()));

        let lifecycle = Arc::new(LifecycleController::new(
            registry.clone(),
            oplog.clone(),
            tasks.clone(),
            provider.clone(),
            agent.clone(),
            snapshots.clone(),
            settings,
        ));

        Self {
            registry,
            oplog,
            tasks,
            provider,
            agent,
            store,
            snapshots,
            lifecycle,
        }
    }

    /// Tracks an instance that exists on the fake provider in `state`
    pub async fn track(&self, id: &str, state: RemoteState) {
        self.provider.insert(id, state);
        self.lifecycle
            .register_existing(id, None)
            .await
            .expect("register fake instance");
    }

    pub fn log_contains(&self, needle: &str) -> bool {
        self.oplog.entries().iter().any(|e| e.message.contains(needle))
    }
}
