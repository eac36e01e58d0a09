//! Per-device state table
//!
//! Maps each attached physical device to its BAR window, staged
//! configuration and controller registry. The map lock is held only for
//! lookup, insert and remove. Each entry carries its own mutex, and that is
//! what serializes writers for one device.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use fpga_spi_layout::MemoryWindow;

use crate::backend::AttributeGroupHandle;
use crate::config::StagedConfig;
use crate::device::PhysicalDeviceId;
use crate::error::{Result, SpiError};
use crate::registry::ControllerRegistry;

/// State kept for one attached physical device
#[derive(Debug, Default)]
pub struct DeviceEntry {
    /// BAR window as last reported by map/unmap
    pub window: MemoryWindow,
    /// Values staged through the attribute interface
    pub staged: StagedConfig,
    /// Instantiated sub-controllers
    pub registry: ControllerRegistry,
    pub(crate) interface: Option<AttributeGroupHandle>,
    pub(crate) detached: bool,
}

impl DeviceEntry {
    /// Fresh entry: zero window, default staging, empty registry
    #[must_use]
    pub fn new(interface: Option<AttributeGroupHandle>) -> Self {
        Self {
            interface,
            ..Self::default()
        }
    }

    /// Whether the entry was removed from its table
    #[must_use]
    pub const fn is_detached(&self) -> bool {
        self.detached
    }
}

/// Shared handle to one entry
pub type SharedEntry = Arc<Mutex<DeviceEntry>>;

/// Lock an entry, recovering the data if a previous holder panicked
pub fn lock_entry(entry: &SharedEntry) -> MutexGuard<'_, DeviceEntry> {
    entry.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Sparse map from physical device to its state
#[derive(Debug, Default)]
pub struct DeviceTable {
    entries: RwLock<HashMap<PhysicalDeviceId, SharedEntry>>,
}

impl DeviceTable {
    /// Create an empty table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the entry of a newly attached device
    ///
    /// # Errors
    ///
    /// Returns `SpiError::AlreadyExists` if `device` already has an entry;
    /// the existing entry is kept.
    pub fn insert(&self, device: PhysicalDeviceId, entry: DeviceEntry) -> Result<SharedEntry> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if entries.contains_key(&device) {
            return Err(SpiError::already_exists(format!("spi module data for {device}")));
        }
        let shared = Arc::new(Mutex::new(entry));
        entries.insert(device, Arc::clone(&shared));
        Ok(shared)
    }

    /// Entry of `device`
    #[must_use]
    pub fn get(&self, device: &PhysicalDeviceId) -> Option<SharedEntry> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(device)
            .cloned()
    }

    /// Remove and return the entry of `device`
    pub fn remove(&self, device: &PhysicalDeviceId) -> Option<SharedEntry> {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(device)
    }

    /// Whether `device` has an entry
    #[must_use]
    pub fn contains(&self, device: &PhysicalDeviceId) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(device)
    }

    /// Attached devices, sorted
    #[must_use]
    pub fn ids(&self) -> Vec<PhysicalDeviceId> {
        let mut ids: Vec<_> = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    /// Number of attached devices
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether no device is attached
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every entry
    pub fn drain(&self) -> Vec<(PhysicalDeviceId, SharedEntry)> {
        let mut drained: Vec<_> = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .collect();
        drained.sort_by(|a, b| a.0.cmp(&b.0));
        drained
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_get_remove() {
        let table = DeviceTable::new();
        let a = PhysicalDeviceId::new("0000:01:00.0");
        let b = PhysicalDeviceId::new("0000:02:00.0");

        table.insert(b.clone(), DeviceEntry::new(None)).unwrap();
        table.insert(a.clone(), DeviceEntry::new(None)).unwrap();
        assert_eq!(table.ids(), vec![a.clone(), b.clone()]);

        lock_entry(&table.get(&a).unwrap()).window = MemoryWindow::mapped(0x2000, 0x1000);
        assert!(lock_entry(&table.get(&a).unwrap()).window.mapped);
        assert!(!lock_entry(&table.get(&b).unwrap()).window.mapped);

        assert!(table.remove(&a).is_some());
        assert!(table.get(&a).is_none());
        assert!(table.remove(&a).is_none());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_double_insert_keeps_first_entry() {
        let table = DeviceTable::new();
        let id = PhysicalDeviceId::new("0000:01:00.0");
        table.insert(id.clone(), DeviceEntry::new(None)).unwrap();
        lock_entry(&table.get(&id).unwrap()).staged.slot_size = 0x40;

        let err = table.insert(id.clone(), DeviceEntry::new(None)).unwrap_err();
        assert!(matches!(err, SpiError::AlreadyExists { .. }));
        assert_eq!(lock_entry(&table.get(&id).unwrap()).staged.slot_size, 0x40);
    }

    #[test]
    fn test_drain() {
        let table = DeviceTable::new();
        table.insert("0000:03:00.0".into(), DeviceEntry::new(None)).unwrap();
        table.insert("0000:01:00.0".into(), DeviceEntry::new(None)).unwrap();
        let drained = table.drain();
        assert_eq!(drained[0].0.as_str(), "0000:01:00.0");
        assert!(table.is_empty());
    }
}
