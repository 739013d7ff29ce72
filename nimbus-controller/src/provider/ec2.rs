//! EC2 compute provider

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_ec2::Client as Ec2Client;
use aws_sdk_ec2::error::ProvideErrorMetadata;
use aws_sdk_ec2::types::{InstanceStateChange, InstanceStateName, LaunchTemplateSpecification};
use tracing::info;

use super::{ComputeProvider, RemoteInstance, RemoteState};
use crate::error::{ControlError, Result};

/// Launch template version used for new instances
const TEMPLATE_VERSION: &str = "$Latest";

#[derive(Debug, Clone)]
pub struct Ec2Provider {
    client: Ec2Client,
}

impl Ec2Provider {
    /// Loads credentials from the default AWS provider chain
    pub async fn new(region: Option<String>) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(aws_config::Region::new(region));
        }
        let config = loader.load().await;

        Self {
            client: Ec2Client::new(&config),
        }
    }

    fn map_state(state: Option<&InstanceStateName>) -> RemoteState {
        match state {
            Some(InstanceStateName::Pending) => RemoteState::Pending,
            Some(InstanceStateName::Running) => RemoteState::Running,
            Some(InstanceStateName::Stopping) => RemoteState::Stopping,
            Some(InstanceStateName::Stopped) => RemoteState::Stopped,
            Some(InstanceStateName::ShuttingDown) => RemoteState::ShuttingDown,
            Some(InstanceStateName::Terminated) => RemoteState::Terminated,
            _ => RemoteState::Unknown,
        }
    }

    fn previous_state(changes: &[InstanceStateChange], id: &str) -> RemoteState {
        let change = changes
            .iter()
            .find(|c| c.instance_id() == Some(id))
            .or_else(|| changes.first());
        Self::map_state(
            change
                .and_then(|c| c.previous_state())
                .and_then(|s| s.name()),
        )
    }
}

/// Unknown or malformed instance ids become NotFound, everything else a provider error
fn map_sdk_error<E>(id: &str, action: &str, err: E) -> ControlError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    if err
        .code()
        .is_some_and(|code| code.starts_with("InvalidInstanceID"))
    {
        return ControlError::NotFound(id.to_string());
    }
    ControlError::ProviderApi {
        action: action.to_string(),
        target: id.to_string(),
        source: Box::new(err),
    }
}

#[async_trait]
impl ComputeProvider for Ec2Provider {
    async fn describe(&self, id: &str) -> Result<RemoteInstance> {
        let output = self
            .client
            .describe_instances()
            .instance_ids(id)
            .send()
            .await
            .map_err(|e| map_sdk_error(id, "describe", e))?;

        let instance = output
            .reservations()
            .iter()
            .flat_map(|r| r.instances())
            .find(|i| i.instance_id() == Some(id))
            .ok_or_else(|| ControlError::NotFound(id.to_string()))?;

        Ok(RemoteInstance {
            state: Self::map_state(instance.state().and_then(|s| s.name())),
            public_address: instance.public_ip_address().map(str::to_string),
        })
    }

    async fn create(&self, template_id: Option<&str>) -> Result<String> {
        let template_id = template_id.ok_or_else(|| {
            ControlError::Validation("LAUNCH_TEMPLATE_ID is not configured".to_string())
        })?;

        let template = LaunchTemplateSpecification::builder()
            .launch_template_id(template_id)
            .version(TEMPLATE_VERSION)
            .build();

        let output = self
            .client
            .run_instances()
            .launch_template(template)
            .min_count(1)
            .max_count(1)
            .send()
            .await
            .map_err(|e| map_sdk_error(template_id, "launch from template", e))?;

        let id = output
            .instances()
            .first()
            .and_then(|i| i.instance_id())
            .ok_or_else(|| ControlError::Provider("run_instances returned no instance".to_string()))?
            .to_string();

        info!("Launched instance {} from template {}", id, template_id);
        Ok(id)
    }

    async fn start(&self, id: &str) -> Result<RemoteState> {
        let output = self
            .client
            .start_instances()
            .instance_ids(id)
            .send()
            .await
            .map_err(|e| map_sdk_error(id, "start", e))?;

        Ok(Self::previous_state(output.starting_instances(), id))
    }

    async fn stop(&self, id: &str) -> Result<RemoteState> {
        let output = self
            .client
            .stop_instances()
            .instance_ids(id)
            .send()
            .await
            .map_err(|e| map_sdk_error(id, "stop", e))?;

        Ok(Self::previous_state(output.stopping_instances(), id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_state() {
        assert_eq!(
            Ec2Provider::map_state(Some(&InstanceStateName::Running)),
            RemoteState::Running
        );
        assert_eq!(
            Ec2Provider::map_state(Some(&InstanceStateName::ShuttingDown)),
            RemoteState::ShuttingDown
        );
        assert_eq!(Ec2Provider::map_state(None), RemoteState::Unknown);
    }
}
