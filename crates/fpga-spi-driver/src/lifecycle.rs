//! Lifecycle controller
//!
//! Glue between the multi-FPGA core's callbacks, the attribute interface and
//! the [`DeviceTable`]. Every entry point resolves the physical device first;
//! an unknown device is an error for attribute traffic (`ENODEV`) and a
//! logged no-op for core callbacks, which must always complete.
//!
//! # Flow
//!
//! ```text
//! attach ──▶ entry + attribute group
//! map_window ──▶ entry.window = BAR
//! write slot_size / ... ──▶ entry.staged
//! write create_controller N ──▶ registry.create(N) ──▶ PlatformBus
//! write delete_controller N ──▶ registry.destroy(N)
//! unmap_window ──▶ entry.window zeroed (controllers kept unless revoked)
//! detach ──▶ registry.destroy_all, group removed, entry dropped
//! ```

use std::sync::{Arc, Weak};

use fpga_spi_layout::MemoryWindow;
use tracing::{error, info, warn};

use crate::attrs::{Attribute, ATTRIBUTE_GROUP};
use crate::backend::{AttributeHost, AttributeOps, PlatformBus, ProtocolOps};
use crate::config::{parse_index, StagedConfig};
use crate::device::PhysicalDeviceId;
use crate::error::{Result, SpiError};
use crate::options::ManagerOptions;
use crate::registry::{ControllerRegistry, SubControllerHandle};
use crate::table::{lock_entry, DeviceEntry, DeviceTable, SharedEntry};

/// Owns the device table and drives the lifecycle of every sub-controller
#[derive(Debug)]
pub struct SpiControllerManager {
    table: DeviceTable,
    bus: Arc<dyn PlatformBus>,
    attributes: Arc<dyn AttributeHost>,
    options: ManagerOptions,
    me: Weak<SpiControllerManager>,
}

impl SpiControllerManager {
    /// Create a manager with default options
    pub fn new(bus: Arc<dyn PlatformBus>, attributes: Arc<dyn AttributeHost>) -> Arc<Self> {
        Self::with_options(bus, attributes, ManagerOptions::default())
    }

    /// Create a manager with explicit options
    pub fn with_options(
        bus: Arc<dyn PlatformBus>,
        attributes: Arc<dyn AttributeHost>,
        options: ManagerOptions,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            table: DeviceTable::new(),
            bus,
            attributes,
            options,
            me: me.clone(),
        })
    }

    /// Active options
    #[must_use]
    pub const fn options(&self) -> &ManagerOptions {
        &self.options
    }

    /// Set up state for a newly enumerated device and publish its
    /// attribute group
    ///
    /// # Errors
    ///
    /// Returns `AlreadyExists` if the device is already attached, or the
    /// attribute host's error if the group cannot be created.
    pub fn attach(&self, device: &PhysicalDeviceId) -> Result<()> {
        info!("[attach] pci_dev {device}");

        if self.table.contains(device) {
            error!("[attach] {device} is already attached");
            return Err(SpiError::already_exists(format!("spi module data for {device}")));
        }

        let ops: Weak<dyn AttributeOps> = self.me.clone();
        let group = self
            .attributes
            .create_group(device, ATTRIBUTE_GROUP, &Attribute::ALL, ops)
            .inspect_err(|e| error!("[attach] attribute group for {device}: {e}"))?;

        if let Err(e) = self.table.insert(device.clone(), DeviceEntry::new(Some(group))) {
            self.attributes.remove_group(group);
            return Err(e);
        }
        Ok(())
    }

    /// Destroy every controller of `device`, remove its attribute group and
    /// forget it. Unknown devices are logged and ignored.
    pub fn detach(&self, device: &PhysicalDeviceId) {
        info!("[detach] pci_dev {device}");

        let Some(entry) = self.table.remove(device) else {
            error!("[detach] unable to find spi module data for device {device}");
            return;
        };
        self.teardown(device, &entry);
    }

    // The entry is already out of the table; flag it so writers still
    // holding it fail instead of repopulating a slot.
    fn teardown(&self, device: &PhysicalDeviceId, entry: &SharedEntry) {
        let group = {
            let mut entry = lock_entry(entry);
            entry.detached = true;
            let destroyed = entry.registry.destroy_all(self.bus.as_ref());
            info!("[detach] {device}: destroyed {destroyed} controller(s)");
            entry.interface.take()
        };

        if let Some(group) = group {
            self.attributes.remove_group(group);
        }
    }

    /// Record the BAR the core mapped for `device`. Unknown devices are
    /// logged and ignored.
    pub fn map_window(&self, device: &PhysicalDeviceId, base: u64, len: u64) {
        info!("[map_bar] pci_dev {device} base {base:#x} len {len:#x}");
        let Some(entry) = self.lookup_for_callback(device, "map_bar") else {
            return;
        };
        lock_entry(&entry).window = MemoryWindow::mapped(base, len);
    }

    /// Forget the BAR of `device`. Controllers survive unless
    /// [`ManagerOptions::revoke_on_unmap`] is set. Unknown devices are
    /// logged and ignored.
    pub fn unmap_window(&self, device: &PhysicalDeviceId) {
        info!("[unmap_bar] pci_dev {device}");
        let Some(entry) = self.lookup_for_callback(device, "unmap_bar") else {
            return;
        };

        let mut entry = lock_entry(&entry);
        entry.window = MemoryWindow::unmapped();

        if self.options.revoke_on_unmap {
            let destroyed = entry.registry.destroy_all(self.bus.as_ref());
            info!("[unmap_bar] {device}: revoked {destroyed} controller(s)");
        } else if !entry.registry.is_empty() {
            warn!(
                "[unmap_bar] {device}: {} controller(s) still reference the unmapped BAR",
                entry.registry.occupancy()
            );
        }
    }

    /// Handle an attribute write; returns the number of bytes consumed
    ///
    /// # Errors
    ///
    /// Returns `DeviceNotFound` for an unknown device, `InvalidInput` for a
    /// malformed value, and any error of `create_controller` /
    /// `delete_controller` for the action attributes.
    pub fn store(&self, device: &PhysicalDeviceId, attr: Attribute, buf: &str) -> Result<usize> {
        let entry = self.resolve(device)?;
        self.store_entry(device, &entry, attr, buf)
    }

    fn store_entry(
        &self,
        device: &PhysicalDeviceId,
        entry: &SharedEntry,
        attr: Attribute,
        buf: &str,
    ) -> Result<usize> {
        let mut entry = lock_entry(entry);
        Self::ensure_attached(device, &entry)?;

        let outcome = match attr {
            Attribute::CreateController => parse_index(buf)
                .and_then(|index| self.create_locked(device, &mut entry, index))
                .map(|_| ()),
            Attribute::DeleteController => parse_index(buf)
                .and_then(|index| entry.registry.destroy(index, self.bus.as_ref()))
                .map(|_| ()),
            _ => entry.staged.store(attr, buf),
        };

        outcome
            .map(|()| buf.len())
            .inspect_err(|e| error!("{device}: write {attr}={:?}: {e}", buf.trim_end()))
    }

    /// Handle an attribute read
    ///
    /// # Errors
    ///
    /// Returns `DeviceNotFound` for an unknown device.
    pub fn show(&self, device: &PhysicalDeviceId, attr: Attribute) -> Result<String> {
        let entry = self.resolve(device)?;
        let entry = lock_entry(&entry);
        Self::ensure_attached(device, &entry)?;
        Ok(entry.staged.show(attr))
    }

    /// Create the controller at 1-based `index` from the staged values
    ///
    /// # Errors
    ///
    /// Returns `DeviceNotFound` for an unknown device, `InvalidInput` when
    /// [`ManagerOptions::require_mapped_window`] is set and no BAR is mapped,
    /// and every error of [`ControllerRegistry::create`].
    pub fn create_controller(
        &self,
        device: &PhysicalDeviceId,
        index: i64,
    ) -> Result<SubControllerHandle> {
        let entry = self.resolve(device)?;
        let mut entry = lock_entry(&entry);
        Self::ensure_attached(device, &entry)?;
        self.create_locked(device, &mut entry, index)
    }

    /// Tear down the controller at 1-based `index`
    ///
    /// # Errors
    ///
    /// Returns `DeviceNotFound` for an unknown device and every error of
    /// [`ControllerRegistry::destroy`].
    pub fn delete_controller(
        &self,
        device: &PhysicalDeviceId,
        index: i64,
    ) -> Result<SubControllerHandle> {
        let entry = self.resolve(device)?;
        let mut entry = lock_entry(&entry);
        Self::ensure_attached(device, &entry)?;
        entry.registry.destroy(index, self.bus.as_ref())
    }

    /// Snapshot of the live controllers of `device`
    ///
    /// # Errors
    ///
    /// Returns `DeviceNotFound` for an unknown device.
    pub fn controllers(&self, device: &PhysicalDeviceId) -> Result<Vec<SubControllerHandle>> {
        self.with_entry(device, |entry| entry.registry.occupied().cloned().collect())
    }

    /// Current BAR window of `device`
    ///
    /// # Errors
    ///
    /// Returns `DeviceNotFound` for an unknown device.
    pub fn window(&self, device: &PhysicalDeviceId) -> Result<MemoryWindow> {
        self.with_entry(device, |entry| entry.window)
    }

    /// Current staged values of `device`
    ///
    /// # Errors
    ///
    /// Returns `DeviceNotFound` for an unknown device.
    pub fn staged(&self, device: &PhysicalDeviceId) -> Result<StagedConfig> {
        self.with_entry(device, |entry| entry.staged.clone())
    }

    /// Attached devices, sorted
    #[must_use]
    pub fn devices(&self) -> Vec<PhysicalDeviceId> {
        self.table.ids()
    }

    /// Detach every device still attached
    pub fn shutdown(&self) {
        info!("[shutdown] {} device(s) attached", self.table.len());
        for (device, entry) in self.table.drain() {
            self.teardown(&device, &entry);
        }
    }

    fn create_locked(
        &self,
        device: &PhysicalDeviceId,
        entry: &mut DeviceEntry,
        index: i64,
    ) -> Result<SubControllerHandle> {
        let slot = ControllerRegistry::slot_for(index)?;

        // An occupied slot reports AlreadyExists from the registry whatever
        // the window state.
        if !entry.window.mapped && entry.registry.get(slot).is_none() {
            if self.options.require_mapped_window {
                return Err(SpiError::invalid_input(format!(
                    "BAR of {device} is not mapped"
                )));
            }
            warn!("{device}: creating SPI controller {index} against an unmapped BAR (base 0)");
        }

        let DeviceEntry {
            window,
            staged,
            registry,
            ..
        } = entry;
        registry
            .create(index, window, staged, device, self.bus.as_ref())
            .cloned()
    }

    fn with_entry<T>(
        &self,
        device: &PhysicalDeviceId,
        f: impl FnOnce(&DeviceEntry) -> T,
    ) -> Result<T> {
        let entry = self.resolve(device)?;
        let entry = lock_entry(&entry);
        Self::ensure_attached(device, &entry)?;
        Ok(f(&entry))
    }

    fn resolve(&self, device: &PhysicalDeviceId) -> Result<SharedEntry> {
        self.table.get(device).ok_or_else(|| {
            error!("unable to find spi module data for device {device}");
            SpiError::device_not_found(device)
        })
    }

    fn lookup_for_callback(
        &self,
        device: &PhysicalDeviceId,
        callback: &str,
    ) -> Option<SharedEntry> {
        let entry = self.table.get(device);
        if entry.is_none() {
            error!("[{callback}] unable to find spi module data for device {device}");
        }
        entry
    }

    // A writer can still hold an entry that detach has just removed.
    fn ensure_attached(device: &PhysicalDeviceId, entry: &DeviceEntry) -> Result<()> {
        if entry.detached {
            return Err(SpiError::device_not_found(device));
        }
        Ok(())
    }
}

impl AttributeOps for SpiControllerManager {
    fn store(&self, device: &PhysicalDeviceId, attr: Attribute, buf: &str) -> Result<usize> {
        SpiControllerManager::store(self, device, attr, buf)
    }

    fn show(&self, device: &PhysicalDeviceId, attr: Attribute) -> Result<String> {
        SpiControllerManager::show(self, device, attr)
    }
}

impl ProtocolOps for SpiControllerManager {
    fn attach(&self, device: &PhysicalDeviceId) -> Result<()> {
        SpiControllerManager::attach(self, device)
    }

    fn detach(&self, device: &PhysicalDeviceId) {
        SpiControllerManager::detach(self, device);
    }

    fn map_bar(&self, device: &PhysicalDeviceId, base: u64, len: u64) {
        self.map_window(device, base, len);
    }

    fn unmap_bar(&self, device: &PhysicalDeviceId) {
        self.unmap_window(device);
    }
}
