//! Task tracking
//!
//! Bounded worker pool for lifecycle operations together with the active task
//! set. A task is visible in the set from the moment it is submitted until its
//! future finishes, fails, panics or is dropped; removal happens in a drop
//! guard owned by the spawned future.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use nimbus_core::domain::task::{ActiveTask, Operation, TaskId};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::{ControlError, Result};

type ActiveSet = Arc<Mutex<HashMap<TaskId, ActiveTask>>>;

/// Handle to a submitted task
///
/// Dropping the handle detaches the task; it keeps running.
pub struct TaskHandle {
    pub id: TaskId,
    join: JoinHandle<Result<()>>,
}

impl TaskHandle {
    /// Waits for the task and returns its outcome
    pub async fn wait(self) -> Result<()> {
        match self.join.await {
            Ok(result) => result,
            Err(e) => Err(ControlError::Internal(format!("task {} aborted: {}", self.id, e))),
        }
    }
}

/// Removes a task from the active set when dropped
struct TaskGuard {
    id: TaskId,
    active: ActiveSet,
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
        debug!("Task {} finished", self.id);
    }
}

pub struct TaskTracker {
    active: ActiveSet,
    permits: Arc<Semaphore>,
}

impl TaskTracker {
    /// Creates a tracker running at most `max_parallel` tasks at once
    pub fn new(max_parallel: usize) -> Self {
        Self {
            active: Arc::new(Mutex::new(HashMap::new())),
            permits: Arc::new(Semaphore::new(max_parallel.max(1))),
        }
    }

    /// Registers and spawns a unit of work, returning immediately
    pub fn spawn<F>(
        &self,
        operation: Operation,
        instance_id: Option<String>,
        description: impl Into<String>,
        work: F,
    ) -> TaskHandle
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        self.spawn_with(operation, instance_id, description, |_| work)
    }

    /// Like [`spawn`](Self::spawn), handing the task id to the work
    pub fn spawn_with<B, F>(
        &self,
        operation: Operation,
        instance_id: Option<String>,
        description: impl Into<String>,
        build: B,
    ) -> TaskHandle
    where
        B: FnOnce(TaskId) -> F,
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let id = TaskId::new();
        let work = build(id);
        let task = ActiveTask {
            id,
            operation,
            instance_id,
            description: description.into(),
            started_at: chrono::Utc::now(),
        };
        debug!("Task {} submitted: {}", id, task.description);

        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, task);

        let guard = TaskGuard {
            id,
            active: Arc::clone(&self.active),
        };
        let permits = Arc::clone(&self.permits);

        let join = tokio::spawn(async move {
            let _guard = guard;
            let _permit = permits
                .acquire_owned()
                .await
                .map_err(|_| ControlError::Internal("worker pool closed".to_string()))?;
            work.await
        });

        TaskHandle { id, join }
    }

    /// Attaches the instance id once it is known (create allocates it mid-task)
    pub fn set_instance(&self, id: TaskId, instance_id: &str) {
        if let Some(task) = self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(&id)
        {
            task.instance_id = Some(instance_id.to_string());
            task.description = format!("{} ({})", task.description, instance_id);
        }
    }

    /// In-flight tasks, oldest first
    pub fn list(&self) -> Vec<ActiveTask> {
        let mut tasks: Vec<_> = self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        tasks.sort_by_key(|t| t.started_at);
        tasks
    }

    pub fn len(&self) -> usize {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
