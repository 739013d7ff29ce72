//! Configuration snapshots
//!
//! The full registry and schedule set are written wholesale after every state
//! change and read back once at startup.

pub mod file;
pub mod memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nimbus_core::domain::instance::Instance;
use nimbus_core::domain::schedule::Schedule;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::Result;
use crate::oplog::OperationLog;
use crate::registry::InstanceRegistry;

pub use file::FileSnapshotStore;
pub use memory::MemorySnapshotStore;
pub use postgres::PgSnapshotStore;

/// Current document layout
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub instances: Vec<Instance>,
    #[serde(default)]
    pub schedules: Vec<Schedule>,
}

impl Snapshot {
    /// Captures the registry; schedules are taken from the instance records
    pub fn capture(registry: &InstanceRegistry) -> Self {
        let instances = registry.list();
        let schedules = instances
            .iter()
            .filter_map(|i| i.schedule.clone())
            .collect();

        Self {
            version: SNAPSHOT_VERSION,
            saved_at: Utc::now(),
            instances,
            schedules,
        }
    }
}

#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Replaces the stored snapshot
    async fn save(&self, snapshot: &Snapshot) -> Result<()>;

    /// Last saved snapshot, `None` if nothing was ever saved
    async fn load(&self) -> Result<Option<Snapshot>>;
}

/// Best-effort persistence shared by the lifecycle controller and scheduler
///
/// Saves are serialized and the snapshot is captured while the lock is held,
/// so the last completed save always reflects the latest registry state.
pub struct SnapshotWriter {
    store: Arc<dyn SnapshotStore>,
    registry: Arc<InstanceRegistry>,
    oplog: Arc<OperationLog>,
    lock: Mutex<()>,
}

impl SnapshotWriter {
    pub fn new(
        store: Arc<dyn SnapshotStore>,
        registry: Arc<InstanceRegistry>,
        oplog: Arc<OperationLog>,
    ) -> Self {
        Self {
            store,
            registry,
            oplog,
            lock: Mutex::new(()),
        }
    }

    /// Saves the current state; failures are logged and swallowed
    pub async fn persist(&self) {
        let _guard = self.lock.lock().await;
        let snapshot = Snapshot::capture(&self.registry);
        if let Err(e) = self.store.save(&snapshot).await {
            self.oplog
                .error(format!("Failed to save configuration snapshot: {}", e.report()));
        }
    }

    pub async fn load(&self) -> Result<Option<Snapshot>> {
        self.store.load().await
    }
}
