//! Instance Registry
//!
//! In-memory store of tracked instances. Every mutation is applied under a
//! single lock and published on a broadcast channel so readers observe
//! transitions in order. Per-instance exclusivity of lifecycle operations is
//! enforced by the lifecycle controller, not here.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use nimbus_core::domain::instance::{Instance, InstanceStatus};
use nimbus_core::domain::schedule::Schedule;
use tokio::sync::broadcast;

use crate::error::{ControlError, Result};

/// Capacity of the change feed; slow subscribers lag rather than block writers
const EVENT_CAPACITY: usize = 256;

/// Change notification published for every registry mutation
#[derive(Debug, Clone, PartialEq)]
pub enum RegistryEvent {
    Upserted(Instance),
    StatusChanged { id: String, status: InstanceStatus },
    UrlChanged { id: String, url: Option<String> },
    Removed(String),
}

pub struct InstanceRegistry {
    instances: RwLock<BTreeMap<String, Instance>>,
    events: broadcast::Sender<RegistryEvent>,
}

impl InstanceRegistry {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            instances: RwLock::new(BTreeMap::new()),
            events,
        }
    }

    /// Subscribes to the change feed
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }

    fn publish(&self, event: RegistryEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    /// Applies `f` to the record of `id` while holding the write lock
    fn update<T>(&self, id: &str, f: impl FnOnce(&mut Instance) -> T) -> Result<T> {
        let mut instances = self
            .instances
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let instance = instances
            .get_mut(id)
            .ok_or_else(|| ControlError::NotFound(id.to_string()))?;
        Ok(f(instance))
    }

    pub fn upsert(&self, instance: Instance) {
        self.instances
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(instance.id.clone(), instance.clone());
        self.publish(RegistryEvent::Upserted(instance));
    }

    pub fn get(&self, id: &str) -> Option<Instance> {
        self.instances
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.instances
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(id)
    }

    /// Forgets an instance; the remote node is left untouched
    pub fn remove(&self, id: &str) -> Option<Instance> {
        let removed = self
            .instances
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
        if removed.is_some() {
            self.publish(RegistryEvent::Removed(id.to_string()));
        }
        removed
    }

    /// All tracked instances ordered by id
    pub fn list(&self) -> Vec<Instance> {
        self.instances
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.instances
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn set_status(&self, id: &str, status: InstanceStatus) -> Result<()> {
        self.update(id, |instance| instance.status = status)?;
        self.publish(RegistryEvent::StatusChanged {
            id: id.to_string(),
            status,
        });
        Ok(())
    }

    pub fn set_url(&self, id: &str, url: Option<String>) -> Result<()> {
        self.update(id, |instance| instance.url = url.clone())?;
        self.publish(RegistryEvent::UrlChanged {
            id: id.to_string(),
            url,
        });
        Ok(())
    }

    pub fn set_display_name(&self, id: &str, display_name: String) -> Result<()> {
        let instance = self.update(id, |instance| {
            instance.display_name = display_name;
            instance.clone()
        })?;
        self.publish(RegistryEvent::Upserted(instance));
        Ok(())
    }

    pub fn set_schedule(&self, id: &str, schedule: Option<Schedule>) -> Result<()> {
        let instance = self.update(id, |instance| {
            instance.schedule = schedule;
            instance.clone()
        })?;
        self.publish(RegistryEvent::Upserted(instance));
        Ok(())
    }

    /// Replaces the whole content, used when restoring a snapshot
    pub fn replace_all(&self, instances: Vec<Instance>) {
        let mut map = self
            .instances
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        map.clear();
        for instance in instances {
            map.insert(instance.id.clone(), instance);
        }
    }
}

impl Default for InstanceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instance(id: &str) -> Instance {
        Instance::new(id, None, InstanceStatus::Stopped)
    }

    #[test]
    fn test_upsert_get_remove() {
        let registry = InstanceRegistry::new();
        registry.upsert(instance("i-b"));
        registry.upsert(instance("i-a"));

        assert_eq!(registry.len(), 2);
        assert_eq!(
            registry.list().iter().map(|i| i.id.as_str()).collect::<Vec<_>>(),
            vec!["i-a", "i-b"]
        );
        assert!(registry.get("i-a").is_some());

        assert!(registry.remove("i-a").is_some());
        assert!(registry.remove("i-a").is_none());
        assert!(!registry.contains("i-a"));
    }

    #[test]
    fn test_field_updates() {
        let registry = InstanceRegistry::new();
        registry.upsert(instance("i-a"));

        registry.set_status("i-a", InstanceStatus::Running).unwrap();
        registry
            .set_url("i-a", Some("http://10.0.0.1:1100".to_string()))
            .unwrap();
        registry.set_display_name("i-a", "web".to_string()).unwrap();

        let stored = registry.get("i-a").unwrap();
        assert_eq!(stored.status, InstanceStatus::Running);
        assert_eq!(stored.url.as_deref(), Some("http://10.0.0.1:1100"));
        assert_eq!(stored.display_name, "web");
    }

    #[test]
    fn test_updates_on_unknown_id_fail() {
        let registry = InstanceRegistry::new();
        assert!(matches!(
            registry.set_status("missing", InstanceStatus::Running),
            Err(ControlError::NotFound(_))
        ));
        assert!(matches!(
            registry.set_url("missing", None),
            Err(ControlError::NotFound(_))
        ));
    }

    #[test]
    fn test_events_published_in_order() {
        let registry = InstanceRegistry::new();
        let mut events = registry.subscribe();

        registry.upsert(instance("i-a"));
        registry.set_status("i-a", InstanceStatus::Starting).unwrap();
        registry.set_status("i-a", InstanceStatus::Running).unwrap();
        registry.remove("i-a");

        assert!(matches!(events.try_recv(), Ok(RegistryEvent::Upserted(_))));
        assert_eq!(
            events.try_recv().unwrap(),
            RegistryEvent::StatusChanged {
                id: "i-a".to_string(),
                status: InstanceStatus::Starting
            }
        );
        assert_eq!(
            events.try_recv().unwrap(),
            RegistryEvent::StatusChanged {
                id: "i-a".to_string(),
                status: InstanceStatus::Running
            }
        );
        assert_eq!(
            events.try_recv().unwrap(),
            RegistryEvent::Removed("i-a".to_string())
        );
    }

    #[test]
    fn test_replace_all() {
        let registry = InstanceRegistry::new();
        registry.upsert(instance("i-old"));
        registry.replace_all(vec![instance("i-1"), instance("i-2")]);

        assert!(!registry.contains("i-old"));
        assert_eq!(registry.len(), 2);
    }
}
