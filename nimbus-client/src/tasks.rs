//! Active tasks, operation log and status endpoints

use crate::ControllerClient;
use crate::error::Result;
use nimbus_core::domain::log::LogEntry;
use nimbus_core::domain::task::ActiveTask;
use nimbus_core::dto::status::StatusSummary;

impl ControllerClient {
    /// Lifecycle operations currently in flight
    pub async fn list_tasks(&self) -> Result<Vec<ActiveTask>> {
        let response = self.client.get(self.url("/tasks")).send().await?;
        self.handle_response(response).await
    }

    pub async fn get_log(&self) -> Result<Vec<LogEntry>> {
        let response = self.client.get(self.url("/log")).send().await?;
        self.handle_response(response).await
    }

    pub async fn clear_log(&self) -> Result<()> {
        let response = self.client.delete(self.url("/log")).send().await?;
        self.handle_empty_response(response).await
    }

    /// Compact summary of instances, in-flight task ids and log length
    pub async fn status(&self) -> Result<StatusSummary> {
        let response = self.client.get(self.url("/status")).send().await?;
        self.handle_response(response).await
    }
}
