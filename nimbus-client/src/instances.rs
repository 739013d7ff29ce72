//! Instance-related API endpoints

use crate::ControllerClient;
use crate::error::Result;
use nimbus_core::domain::instance::Instance;
use nimbus_core::domain::task::TaskId;
use nimbus_core::dto::instance::{AppLog, CreateInstance, RegisterInstance, RenameInstance};
use nimbus_core::dto::task::TaskAccepted;

impl ControllerClient {
    // =============================================================================
    // Instance Query
    // =============================================================================

    /// List all tracked instances
    pub async fn list_instances(&self) -> Result<Vec<Instance>> {
        let response = self.client.get(self.url("/instances")).send().await?;
        self.handle_response(response).await
    }

    /// Get a tracked instance by id
    pub async fn get_instance(&self, id: &str) -> Result<Instance> {
        let url = self.url(&format!("/instances/{}", id));
        let response = self.client.get(&url).send().await?;
        self.handle_response(response).await
    }

    /// Fetch the application process status and the last `lines` log lines
    pub async fn fetch_app_log(&self, id: &str, lines: usize) -> Result<AppLog> {
        let url = self.url(&format!("/instances/{}/app-log", id));
        let response = self
            .client
            .get(&url)
            .query(&[("lines", lines)])
            .send()
            .await?;
        self.handle_response(response).await
    }

    // =============================================================================
    // Instance Lifecycle
    // =============================================================================

    /// Ask the controller to allocate and provision a new instance
    ///
    /// # Returns
    /// The id of the background task doing the work
    pub async fn create_instance(&self, display_name: Option<String>) -> Result<TaskId> {
        let response = self
            .client
            .post(self.url("/instances"))
            .json(&CreateInstance { display_name })
            .send()
            .await?;
        let accepted: TaskAccepted = self.handle_response(response).await?;
        Ok(accepted.task_id)
    }

    /// Start tracking an instance that already exists on the provider
    pub async fn register_instance(&self, id: &str, display_name: Option<String>) -> Result<Instance> {
        let response = self
            .client
            .post(self.url("/instances/register"))
            .json(&RegisterInstance {
                id: id.to_string(),
                display_name,
            })
            .send()
            .await?;
        self.handle_response(response).await
    }

    pub async fn start_instance(&self, id: &str) -> Result<TaskId> {
        let url = self.url(&format!("/instances/{}/start", id));
        let response = self.client.post(&url).send().await?;
        let accepted: TaskAccepted = self.handle_response(response).await?;
        Ok(accepted.task_id)
    }

    pub async fn stop_instance(&self, id: &str) -> Result<TaskId> {
        let url = self.url(&format!("/instances/{}/stop", id));
        let response = self.client.post(&url).send().await?;
        let accepted: TaskAccepted = self.handle_response(response).await?;
        Ok(accepted.task_id)
    }

    pub async fn rename_instance(&self, id: &str, display_name: &str) -> Result<Instance> {
        let url = self.url(&format!("/instances/{}/name", id));
        let response = self
            .client
            .put(&url)
            .json(&RenameInstance {
                display_name: display_name.to_string(),
            })
            .send()
            .await?;
        self.handle_response(response).await
    }

    /// Stop tracking an instance; the remote node keeps running
    pub async fn remove_instance(&self, id: &str) -> Result<Instance> {
        let url = self.url(&format!("/instances/{}", id));
        let response = self.client.delete(&url).send().await?;
        self.handle_response(response).await
    }
}
