use std::collections::HashMap;

use super::device::Device;

/// Insertion-ordered device table. `std::collections::HashMap` gives no
/// iteration-order guarantee, but the scheduler's turn-on/turn-off priority
/// is defined entirely by declaration order, so order
/// must be tracked explicitly: a `Vec` holds devices in registration order
/// and a name index gives O(1) lookup, the way `IndexMap` would.
#[derive(Default)]
pub struct Registry {
    order: Vec<Device>,
    index: HashMap<String, usize>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a new device. Re-registering an existing name replaces it in
    /// place, preserving its original position.
    pub fn register(&mut self, device: Device) {
        if let Some(&i) = self.index.get(&device.name) {
            self.order[i] = device;
        } else {
            self.index.insert(device.name.clone(), self.order.len());
            self.order.push(device);
        }
    }

    pub fn get(&self, name: &str) -> Option<&Device> {
        self.index.get(name).map(|&i| &self.order[i])
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Device> {
        let i = *self.index.get(name)?;
        Some(&mut self.order[i])
    }

    /// Snapshot of every device in registration order, cheap to clone
    /// because [`Device`] only holds `Arc`s and scalars.
    pub fn snapshot(&self) -> Vec<Device> {
        self.order.clone()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(|d| d.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::device::DeviceType;

    #[test]
    fn preserves_registration_order() {
        let mut r = Registry::new();
        r.register(Device::new("c", DeviceType::Switch, 1.0, None, None));
        r.register(Device::new("a", DeviceType::Switch, 1.0, None, None));
        r.register(Device::new("b", DeviceType::Switch, 1.0, None, None));
        let names: Vec<_> = r.names().collect();
        assert_eq!(names, vec!["c", "a", "b"]);
    }

    #[test]
    fn re_registering_replaces_in_place() {
        let mut r = Registry::new();
        r.register(Device::new("a", DeviceType::Switch, 1.0, None, None));
        r.register(Device::new("b", DeviceType::Switch, 1.0, None, None));
        r.register(Device::new("a", DeviceType::Switch, 99.0, None, None));
        let names: Vec<_> = r.names().collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(r.get("a").unwrap().expected_consumption, 99.0);
    }
}
