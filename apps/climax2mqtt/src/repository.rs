use crate::device::{Device, DeviceId};
use std::collections::{HashMap, HashSet};

/// Last observed snapshot per device, owned by the reconcile task.
#[derive(Debug, Default)]
pub struct DeviceRepository {
    devices: HashMap<DeviceId, Device>,
}

impl DeviceRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_new_device(&self, id: &DeviceId) -> bool {
        !self.devices.contains_key(id)
    }

    /// Stores `device` when it is unknown or its comparable state moved.
    /// Returns whether the stored snapshot was replaced.
    pub fn add_or_update(&mut self, device: &Device) -> bool {
        match self.devices.get_mut(device.identity()) {
            Some(stored) if stored.comparable_state() == device.comparable_state() => false,
            Some(stored) => {
                *stored = device.clone();
                true
            }
            None => {
                self.devices
                    .insert(device.identity().clone(), device.clone());
                true
            }
        }
    }

    pub fn get_device(&self, id: &DeviceId) -> Option<&Device> {
        self.devices.get(id)
    }

    /// Drops every device not present in `seen`, returning the removed ids.
    pub fn prune_missing(&mut self, seen: &HashSet<DeviceId>) -> Vec<DeviceId> {
        let mut removed: Vec<DeviceId> = self
            .devices
            .keys()
            .filter(|id| !seen.contains(*id))
            .cloned()
            .collect();
        removed.sort();
        for id in &removed {
            self.devices.remove(id);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sensor(status: &str) -> Device {
        Device::from_record(&json!({"id": "ZB:445001", "type": 20, "name": "Kök", "status": status}))
            .expect("device")
    }

    #[test]
    fn add_or_update_is_idempotent() {
        let mut repo = DeviceRepository::new();
        let device = sensor("6.68 °C");
        assert!(repo.add_or_update(&device));
        assert!(!repo.add_or_update(&device));
        assert_eq!(repo.len(), 1);
    }

    #[test]
    fn new_until_first_add() {
        let mut repo = DeviceRepository::new();
        let device = sensor("6.68 °C");
        let id = device.identity().clone();
        assert!(repo.is_new_device(&id));
        assert!(repo.is_new_device(&id), "lookup has no side effect");
        repo.add_or_update(&device);
        assert!(!repo.is_new_device(&id));
        repo.add_or_update(&sensor("7.00 °C"));
        assert!(!repo.is_new_device(&id));
    }

    #[test]
    fn replaces_only_on_state_change() {
        let mut repo = DeviceRepository::new();
        repo.add_or_update(&sensor("6.68 °C"));
        let id = DeviceId::normalize("ZB:445001");

        assert!(!repo.add_or_update(&sensor("6.680 °C")));
        assert_eq!(
            repo.get_device(&id).map(|d| d.info().status.as_str()),
            Some("6.68 °C"),
            "formatting noise must not replace the snapshot"
        );

        assert!(repo.add_or_update(&sensor("7.1 °C")));
        assert_eq!(
            repo.get_device(&id).map(|d| d.info().status.as_str()),
            Some("7.1 °C")
        );
    }

    #[test]
    fn power_meter_changes_on_any_reading_field() {
        let meter = |status: &str| {
            Device::from_record(&json!({"id": "ZB:b02a01", "type": 48, "status": status}))
                .expect("device")
        };
        let mut repo = DeviceRepository::new();
        assert!(repo.add_or_update(&meter("On, 10W, 1.0kWh")));
        assert!(!repo.add_or_update(&meter("On,10W,1.0kWh")));
        assert!(repo.add_or_update(&meter("On, 10W, 1.1kWh")));
        assert!(repo.add_or_update(&meter("Off, 10W, 1.1kWh")));
        assert!(repo.add_or_update(&meter("Off, 0W, 1.1kWh")));
    }

    #[test]
    fn prune_removes_unseen_devices() {
        let mut repo = DeviceRepository::new();
        repo.add_or_update(&sensor("6.68 °C"));
        let other = Device::from_record(&json!({"id": "ZB:1", "type": 11})).expect("device");
        repo.add_or_update(&other);

        let seen: HashSet<DeviceId> = [other.identity().clone()].into_iter().collect();
        let removed = repo.prune_missing(&seen);
        assert_eq!(removed, vec![DeviceId::normalize("ZB445001")]);
        assert_eq!(repo.len(), 1);
        assert!(repo.is_new_device(&DeviceId::normalize("ZB445001")));
    }
}
