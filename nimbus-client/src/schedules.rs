//! Schedule-related API endpoints

use crate::ControllerClient;
use crate::error::Result;
use nimbus_core::domain::schedule::Schedule;
use nimbus_core::domain::task::TaskId;
use nimbus_core::dto::schedule::{ScheduleView, SetSchedule, TriggerInfo};
use nimbus_core::dto::task::TaskAccepted;

impl ControllerClient {
    /// Set or replace the daily schedule of an instance
    ///
    /// # Arguments
    /// * `start_time` - `HH:MM` in the controller's timezone
    /// * `duration_minutes` - How long the instance stays up each day
    pub async fn set_schedule(
        &self,
        id: &str,
        start_time: &str,
        duration_minutes: i64,
    ) -> Result<Schedule> {
        let url = self.url(&format!("/instances/{}/schedule", id));
        let response = self
            .client
            .put(&url)
            .json(&SetSchedule {
                start_time: start_time.to_string(),
                duration_minutes,
            })
            .send()
            .await?;
        self.handle_response(response).await
    }

    pub async fn remove_schedule(&self, id: &str) -> Result<()> {
        let url = self.url(&format!("/instances/{}/schedule", id));
        let response = self.client.delete(&url).send().await?;
        self.handle_empty_response(response).await
    }

    /// Fire the instance's start trigger immediately
    pub async fn run_schedule_now(&self, id: &str) -> Result<TaskId> {
        let url = self.url(&format!("/instances/{}/schedule/run", id));
        let response = self.client.post(&url).send().await?;
        let accepted: TaskAccepted = self.handle_response(response).await?;
        Ok(accepted.task_id)
    }

    pub async fn list_schedules(&self) -> Result<Vec<ScheduleView>> {
        let response = self.client.get(self.url("/schedules")).send().await?;
        self.handle_response(response).await
    }

    /// Installed triggers with their next fire time
    pub async fn list_triggers(&self) -> Result<Vec<TriggerInfo>> {
        let response = self
            .client
            .get(self.url("/schedules/triggers"))
            .send()
            .await?;
        self.handle_response(response).await
    }
}
