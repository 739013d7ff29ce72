//! Control Plane
//!
//! Single entry point used by the HTTP layer. Wires the registry, operation
//! log, task tracker, lifecycle controller, scheduler and snapshot writer
//! together and exposes the operator-facing operations.

use std::sync::Arc;

use nimbus_core::domain::instance::Instance;
use nimbus_core::domain::log::LogEntry;
use nimbus_core::domain::schedule::Schedule;
use nimbus_core::domain::task::{ActiveTask, TaskId};
use nimbus_core::dto::instance::AppLog;
use nimbus_core::dto::schedule::{ScheduleView, TriggerInfo};
use nimbus_core::dto::status::StatusSummary;

use crate::error::{ControlError, Result};
use crate::oplog::OperationLog;
use crate::provider::ComputeProvider;
use crate::provisioning::ProvisioningAgent;
use crate::registry::InstanceRegistry;
use crate::service::lifecycle::{LifecycleController, LifecycleSettings};
use crate::service::scheduler::{Scheduler, SchedulerSettings};
use crate::snapshot::{SnapshotStore, SnapshotWriter};
use crate::tasks::TaskTracker;

pub struct ControlPlane {
    registry: Arc<InstanceRegistry>,
    oplog: Arc<OperationLog>,
    tasks: Arc<TaskTracker>,
    snapshots: Arc<SnapshotWriter>,
    lifecycle: Arc<LifecycleController>,
    scheduler: Arc<Scheduler>,
}

impl ControlPlane {
    pub fn new(
        provider: Arc<dyn ComputeProvider>,
        agent: Arc<dyn ProvisioningAgent>,
        store: Arc<dyn SnapshotStore>,
        lifecycle_settings: LifecycleSettings,
        scheduler_settings: SchedulerSettings,
        max_parallel_operations: usize,
    ) -> Self {
        let registry = Arc::new(InstanceRegistry::new());
        let oplog = Arc::new(OperationLog::new());
        let tasks = Arc::new(TaskTracker::new(max_parallel_operations));
        let snapshots = Arc::new(SnapshotWriter::new(store, registry.clone(), oplog.clone()));

        let lifecycle = Arc::new(LifecycleController::new(
            registry.clone(),
            oplog.clone(),
            tasks.clone(),
            provider,
            agent,
            snapshots.clone(),
            lifecycle_settings,
        ));
        let scheduler = Arc::new(Scheduler::new(
            lifecycle.clone(),
            registry.clone(),
            oplog.clone(),
            snapshots.clone(),
            scheduler_settings,
        ));

        Self {
            registry,
            oplog,
            tasks,
            snapshots,
            lifecycle,
            scheduler,
        }
    }

    pub fn scheduler(&self) -> Arc<Scheduler> {
        Arc::clone(&self.scheduler)
    }

    /// Repopulates the registry and reinstalls schedules from the last snapshot
    ///
    /// Nothing is saved while restoring.
    pub async fn restore(&self) -> Result<usize> {
        let Some(snapshot) = self.snapshots.load().await? else {
            self.oplog.info("No configuration snapshot found, starting empty");
            return Ok(0);
        };

        let count = snapshot.instances.len();
        self.registry.replace_all(snapshot.instances);
        let schedules = self.scheduler.restore(snapshot.schedules);

        self.oplog.info(format!(
            "Restored {} instance(s) and {} schedule(s) from snapshot saved at {}",
            count, schedules, snapshot.saved_at
        ));
        Ok(count)
    }

    pub fn create_instance(&self, display_name: Option<String>) -> Result<TaskId> {
        Ok(self.lifecycle.create(display_name)?.id)
    }

    pub fn start_instance(&self, id: &str) -> Result<TaskId> {
        Ok(self.lifecycle.start(id)?.id)
    }

    pub fn stop_instance(&self, id: &str) -> Result<TaskId> {
        Ok(self.lifecycle.stop(id)?.id)
    }

    pub async fn register_existing(&self, id: &str, display_name: Option<String>) -> Result<Instance> {
        self.lifecycle.register_existing(id, display_name).await
    }

    /// Forgets an instance and its schedule; the remote node is left alone
    pub async fn remove_instance(&self, id: &str) -> Result<Instance> {
        let removed = self
            .registry
            .remove(id)
            .ok_or_else(|| ControlError::NotFound(id.to_string()))?;
        if self.scheduler.forget(id).is_some() {
            self.oplog
                .info(format!("Schedule removed for instance {}", id));
        }

        self.oplog.info(format!(
            "Removed instance {} ({}) from tracking",
            id, removed.display_name
        ));
        self.snapshots.persist().await;
        Ok(removed)
    }

    pub async fn rename_instance(&self, id: &str, display_name: &str) -> Result<Instance> {
        self.lifecycle.rename(id, display_name).await
    }

    pub fn get_instance(&self, id: &str) -> Result<Instance> {
        self.registry
            .get(id)
            .ok_or_else(|| ControlError::NotFound(id.to_string()))
    }

    pub fn list_instances(&self) -> Vec<Instance> {
        self.registry.list()
    }

    pub async fn fetch_app_log(&self, id: &str, lines: usize) -> Result<AppLog> {
        self.lifecycle.fetch_app_log(id, lines).await
    }

    pub async fn set_schedule(&self, id: &str, start_time: &str, duration_minutes: i64) -> Result<Schedule> {
        self.scheduler
            .set_schedule(id, start_time, duration_minutes)
            .await
    }

    pub async fn remove_schedule(&self, id: &str) -> Result<()> {
        self.scheduler.remove_schedule(id).await
    }

    pub fn run_schedule_now(&self, id: &str) -> Result<TaskId> {
        self.scheduler.run_now(id)
    }

    pub fn list_schedules(&self) -> Vec<ScheduleView> {
        self.scheduler.list_schedules()
    }

    pub fn list_triggers(&self) -> Vec<TriggerInfo> {
        self.scheduler.list_triggers()
    }

    pub fn list_active_tasks(&self) -> Vec<ActiveTask> {
        self.tasks.list()
    }

    pub fn operation_log(&self) -> Vec<LogEntry> {
        self.oplog.entries()
    }

    pub fn clear_operation_log(&self) {
        self.oplog.clear();
    }

    pub fn status(&self) -> StatusSummary {
        StatusSummary {
            instances: self.registry.list(),
            tasks: self.tasks.list().into_iter().map(|t| t.id).collect(),
            log_count: self.oplog.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use chrono_tz::Tz;
    use nimbus_core::domain::instance::InstanceStatus;

    use crate::provider::RemoteState;
    use crate::snapshot::FileSnapshotStore;
    use crate::testing::{FakeAgent, FakeProvider, test_settings};

    fn plane(provider: Arc<FakeProvider>, store: Arc<dyn SnapshotStore>) -> ControlPlane {
        ControlPlane::new(
            provider,
            Arc::new(FakeAgent::new()),
            store,
            test_settings(),
            SchedulerSettings {
                timezone: Tz::UTC,
                tick: Duration::from_secs(15),
                grace: Duration::from_secs(300),
            },
            2,
        )
    }

    #[tokio::test]
    async fn test_remove_instance_removes_schedule() {
        let provider = Arc::new(FakeProvider::new());
        provider.insert("i-1", RemoteState::Stopped);
        let plane = plane(provider, Arc::new(crate::snapshot::MemorySnapshotStore::new()));

        plane.register_existing("i-1", None).await.unwrap();
        plane.set_schedule("i-1", "09:00", 60).await.unwrap();
        assert_eq!(plane.list_schedules().len(), 1);

        let removed = plane.remove_instance("i-1").await.unwrap();
        assert_eq!(removed.id, "i-1");
        assert!(plane.list_schedules().is_empty());
        assert!(plane.list_triggers().is_empty());
        assert!(plane.list_instances().is_empty());
        assert!(matches!(
            plane.remove_instance("i-1").await,
            Err(ControlError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_snapshot_round_trip_through_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let provider = Arc::new(FakeProvider::new());
        provider.insert("i-1", RemoteState::Running);
        provider.insert("i-2", RemoteState::Stopped);

        let first = plane(provider.clone(), Arc::new(FileSnapshotStore::new(&path)));
        first.register_existing("i-1", Some("web".to_string())).await.unwrap();
        first.register_existing("i-2", None).await.unwrap();
        first.set_schedule("i-2", "23:30", 90).await.unwrap();
        let before_instances = first.list_instances();
        let before_schedules: Vec<_> = first.list_schedules().into_iter().map(|v| v.schedule).collect();

        // Fresh control plane over the same file
        let second = plane(provider, Arc::new(FileSnapshotStore::new(&path)));
        assert_eq!(second.restore().await.unwrap(), 2);

        assert_eq!(second.list_instances(), before_instances);
        let after_schedules: Vec<_> = second.list_schedules().into_iter().map(|v| v.schedule).collect();
        assert_eq!(after_schedules, before_schedules);
        assert_eq!(after_schedules[0].end_time.to_string(), "01:00");
        assert_eq!(second.list_triggers().len(), 2);
    }

    #[tokio::test]
    async fn test_restore_without_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let plane = plane(
            Arc::new(FakeProvider::new()),
            Arc::new(FileSnapshotStore::new(dir.path().join("missing.json"))),
        );
        assert_eq!(plane.restore().await.unwrap(), 0);
        assert!(plane.list_instances().is_empty());
    }

    #[tokio::test]
    async fn test_status_summary_and_log() {
        let provider = Arc::new(FakeProvider::new());
        provider.insert("i-1", RemoteState::Stopped);
        let plane = plane(provider, Arc::new(crate::snapshot::MemorySnapshotStore::new()));

        plane.register_existing("i-1", None).await.unwrap();
        let status = plane.status();
        assert_eq!(status.instances.len(), 1);
        assert_eq!(status.instances[0].status, InstanceStatus::Stopped);
        assert!(status.tasks.is_empty());
        assert_eq!(status.log_count, plane.operation_log().len());

        plane.clear_operation_log();
        assert!(plane.operation_log().is_empty());
    }
}
