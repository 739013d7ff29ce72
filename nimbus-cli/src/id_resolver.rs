//! ID resolver module
//!
//! Resolves instance arguments to full provider ids by querying the
//! controller. Operators may type a full id, an unambiguous id prefix or a
//! display name.

use anyhow::{Context, Result, anyhow};
use nimbus_client::ControllerClient;
use nimbus_core::domain::instance::Instance;

use crate::types::InstanceRef;

/// Resolve an instance argument to a full id
///
/// Full ids are returned without a round trip.
///
/// # Errors
/// Returns an error if nothing matches, if the argument is ambiguous, or if
/// the instance list cannot be fetched.
pub async fn resolve_instance_id(client: &ControllerClient, input: &str) -> Result<String> {
    let reference = InstanceRef::parse(input);
    if let InstanceRef::Full(id) = reference {
        return Ok(id);
    }

    let instances = client
        .list_instances()
        .await
        .context("Failed to fetch instances for ID resolution")?;

    match_instance(&instances, reference.as_str())
}

/// Pick the single instance an argument refers to
///
/// Exact id or display name matches win over prefix matches.
fn match_instance(instances: &[Instance], input: &str) -> Result<String> {
    let needle = input.to_lowercase();

    if let Some(exact) = instances.iter().find(|i| i.id == input) {
        return Ok(exact.id.clone());
    }

    let named: Vec<_> = instances
        .iter()
        .filter(|i| i.display_name.to_lowercase() == needle)
        .collect();
    if named.len() == 1 {
        return Ok(named[0].id.clone());
    }

    let matches: Vec<_> = instances
        .iter()
        .filter(|i| {
            i.id.to_lowercase().starts_with(&needle)
                || i.display_name.to_lowercase().starts_with(&needle)
        })
        .collect();

    match matches.len() {
        0 => Err(anyhow!(
            "No instance found with ID or name starting with '{}'",
            input
        )),
        1 => Ok(matches[0].id.clone()),
        _ => {
            let ids: Vec<String> = matches
                .iter()
                .map(|i| format!("{} ({})", i.id, i.display_name))
                .collect();
            Err(anyhow!(
                "Ambiguous reference '{}' matches multiple instances: {}",
                input,
                ids.join(", ")
            ))
        }
    }
}
