/**
 * DEVICE REGISTRY - Canonical in-memory view of every known camera
 *
 * ROLE: deviceId -> last known DeviceSnapshot, in first-sighting order
 * (display order). Presence means online; removal is the only offline signal.
 *
 * The registry itself never notifies anyone: it reports what happened and the
 * owning `Dashboard` fans the change out to alerts, pacers and the render layer.
 */

use crate::models::{DeviceSnapshot, SnapshotPatch};
use indexmap::IndexMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryChange {
    Created,
    Updated,
    Unchanged,
}

#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: IndexMap<String, DeviceSnapshot>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges the supplied fields into the device, creating it (online) on first sighting.
    pub fn upsert(&mut self, device_id: &str, patch: &SnapshotPatch) -> RegistryChange {
        match self.devices.get_mut(device_id) {
            Some(existing) => {
                if patch.apply_to(existing) {
                    RegistryChange::Updated
                } else {
                    RegistryChange::Unchanged
                }
            }
            None => {
                let mut snapshot = DeviceSnapshot::new(device_id);
                patch.apply_to(&mut snapshot);
                self.devices.insert(device_id.to_string(), snapshot);
                RegistryChange::Created
            }
        }
    }

    /// Deletes the device; unknown ids are a no-op.
    pub fn remove(&mut self, device_id: &str) -> Option<DeviceSnapshot> {
        self.devices.shift_remove(device_id)
    }

    pub fn get(&self, device_id: &str) -> Option<&DeviceSnapshot> {
        self.devices.get(device_id)
    }

    pub fn contains(&self, device_id: &str) -> bool {
        self.devices.contains_key(device_id)
    }

    pub fn list(&self) -> impl Iterator<Item = &DeviceSnapshot> {
        self.devices.values()
    }

    pub fn ids(&self) -> Vec<String> {
        self.devices.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn recording_count(&self) -> usize {
        self.devices.values().filter(|d| d.recording).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn battery(v: f64) -> SnapshotPatch {
        SnapshotPatch { battery_percent: Some(v), ..Default::default() }
    }

    #[test]
    fn test_upsert_creates_online_device() {
        let mut reg = DeviceRegistry::new();
        assert_eq!(reg.upsert("D1", &battery(15.0)), RegistryChange::Created);

        let d1 = reg.get("D1").unwrap();
        assert!(d1.online);
        assert!(!d1.recording);
        assert_eq!(d1.battery_percent, Some(15.0));
        assert_eq!(d1.signal_strength_dbm, None);
    }

    #[test]
    fn test_upsert_is_idempotent() {
        let mut reg = DeviceRegistry::new();
        let patch = SnapshotPatch {
            battery_percent: Some(80.0),
            signal_strength_dbm: Some(-70.0),
            ..Default::default()
        };
        reg.upsert("D1", &patch);
        let once: Vec<DeviceSnapshot> = reg.list().cloned().collect();

        assert_eq!(reg.upsert("D1", &patch), RegistryChange::Unchanged);
        let twice: Vec<DeviceSnapshot> = reg.list().cloned().collect();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_fields_never_regress_to_absent() {
        let mut reg = DeviceRegistry::new();
        reg.upsert("D1", &battery(50.0));
        reg.upsert("D1", &SnapshotPatch { channel: Some(3), ..Default::default() });
        reg.upsert("D1", &SnapshotPatch::default());

        let d1 = reg.get("D1").unwrap();
        assert_eq!(d1.battery_percent, Some(50.0));
        assert_eq!(d1.channel, Some(3));

        assert_eq!(reg.upsert("D1", &battery(45.0)), RegistryChange::Updated);
        assert_eq!(reg.get("D1").unwrap().battery_percent, Some(45.0));
    }

    #[test]
    fn test_list_keeps_insertion_order_across_removal() {
        let mut reg = DeviceRegistry::new();
        for id in ["C", "A", "B"] {
            reg.upsert(id, &SnapshotPatch::default());
        }
        reg.upsert("A", &battery(10.0));
        assert!(reg.remove("C").is_some());
        reg.upsert("C", &SnapshotPatch::default());

        let order: Vec<&str> = reg.list().map(|d| d.device_id.as_str()).collect();
        assert_eq!(order, vec!["A", "B", "C"]);
    }

    #[test]
    fn test_remove_unknown_is_noop() {
        let mut reg = DeviceRegistry::new();
        reg.upsert("D1", &SnapshotPatch::recording(true));
        assert!(reg.remove("nope").is_none());
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.recording_count(), 1);
    }
}
