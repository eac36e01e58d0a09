//! Software (in-memory) collaborators
//!
//! [`SoftwareBus`] stands in for the platform bus and [`SoftwareHost`] for
//! the multi-FPGA core plus its sysfs attribute layer. Together they let the
//! whole attach → stage → create → detach lifecycle run without an FPGA:
//!
//! 1. **CI without hardware**: every lifecycle path, including partial
//!    instantiation failures, is exercised by unit tests.
//!
//! 2. **Script replay**: the `fpga-spi` CLI drives a manager wired to these
//!    backends.
//!
//! The bus behaves like the kernel platform bus where it matters: device
//! names (`<driver>.<id>`) must be unique among registered devices, and an
//! allocation stays live until it is released or unregistered.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tracing::{debug, info};

use crate::attrs::Attribute;
use crate::backend::{
    AttributeGroupHandle, AttributeHost, AttributeOps, ControllerSpec, PlatformBus,
    PlatformDeviceId, ProtocolHost, ProtocolOps,
};
use crate::config::DriverName;
use crate::device::PhysicalDeviceId;
use crate::error::{Result, SpiError};

/// A device as the software bus sees it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoftwareDevice {
    /// Driver the device was allocated for
    pub driver: DriverName,
    /// Instance id (`<driver>.<instance>`)
    pub instance: u32,
    /// Configuration attached before registration
    pub spec: Option<ControllerSpec>,
    /// Whether the device is registered
    pub registered: bool,
}

impl SoftwareDevice {
    /// Platform device name
    #[must_use]
    pub fn name(&self) -> String {
        format!("{}.{}", self.driver, self.instance)
    }
}

#[derive(Debug, Default)]
struct BusState {
    next_id: u64,
    devices: BTreeMap<PlatformDeviceId, SoftwareDevice>,
    released: usize,
    fail_allocation: bool,
    fail_configure: bool,
    fail_registration: bool,
}

/// In-memory platform bus with one-shot failure injection
#[derive(Debug, Default)]
pub struct SoftwareBus {
    state: Mutex<BusState>,
}

impl SoftwareBus {
    /// Create an empty bus
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, BusState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make the next `allocate` fail
    pub fn fail_next_allocation(&self) {
        self.state().fail_allocation = true;
    }

    /// Make the next `configure` fail
    pub fn fail_next_configure(&self) {
        self.state().fail_configure = true;
    }

    /// Make the next `register` fail
    pub fn fail_next_registration(&self) {
        self.state().fail_registration = true;
    }

    /// Devices currently allocated, registered or not
    pub fn live_devices(&self) -> usize {
        self.state().devices.len()
    }

    /// Number of allocations handed back through `release`
    pub fn released(&self) -> usize {
        self.state().released
    }

    /// Snapshot of one device
    pub fn device(&self, id: PlatformDeviceId) -> Option<SoftwareDevice> {
        self.state().devices.get(&id).cloned()
    }

    /// Names of registered devices in allocation order
    pub fn registered_names(&self) -> Vec<String> {
        self.state()
            .devices
            .values()
            .filter(|d| d.registered)
            .map(SoftwareDevice::name)
            .collect()
    }
}

impl PlatformBus for SoftwareBus {
    fn allocate(&self, driver: &DriverName, instance: u32) -> Result<PlatformDeviceId> {
        let mut state = self.state();
        if std::mem::take(&mut state.fail_allocation) {
            return Err(SpiError::allocation_failed(format!(
                "cannot allocate {driver}.{instance}"
            )));
        }
        state.next_id += 1;
        let id = PlatformDeviceId::new(state.next_id);
        state.devices.insert(
            id,
            SoftwareDevice {
                driver: driver.clone(),
                instance,
                spec: None,
                registered: false,
            },
        );
        debug!("allocated {driver}.{instance} as #{}", id.id());
        Ok(id)
    }

    fn configure(&self, device: PlatformDeviceId, spec: &ControllerSpec) -> Result<()> {
        let mut state = self.state();
        if std::mem::take(&mut state.fail_configure) {
            return Err(SpiError::allocation_failed("cannot attach platform data"));
        }
        let entry = state.devices.get_mut(&device).ok_or_else(|| {
            SpiError::allocation_failed(format!("platform device #{} not allocated", device.id()))
        })?;
        entry.spec = Some(spec.clone());
        Ok(())
    }

    fn register(&self, device: PlatformDeviceId) -> Result<()> {
        let mut state = self.state();
        if std::mem::take(&mut state.fail_registration) {
            return Err(SpiError::registration_failed("injected failure"));
        }
        let name = state
            .devices
            .get(&device)
            .map(SoftwareDevice::name)
            .ok_or_else(|| {
                SpiError::registration_failed(format!(
                    "platform device #{} not allocated",
                    device.id()
                ))
            })?;
        let duplicate = state
            .devices
            .iter()
            .any(|(id, d)| *id != device && d.registered && d.name() == name);
        if duplicate {
            return Err(SpiError::registration_failed(format!("{name} already registered")));
        }
        if let Some(entry) = state.devices.get_mut(&device) {
            entry.registered = true;
        }
        info!("registered platform device {name}");
        Ok(())
    }

    fn release(&self, device: PlatformDeviceId) {
        let mut state = self.state();
        if state.devices.remove(&device).is_some() {
            state.released += 1;
        }
    }

    fn unregister(&self, device: PlatformDeviceId) {
        if let Some(removed) = self.state().devices.remove(&device) {
            info!("unregistered platform device {}", removed.name());
        }
    }
}

#[derive(Debug)]
struct GroupRecord {
    device: PhysicalDeviceId,
    name: String,
    attributes: Vec<Attribute>,
    ops: Weak<dyn AttributeOps>,
}

#[derive(Debug, Default)]
struct HostState {
    next_group: u64,
    groups: BTreeMap<AttributeGroupHandle, GroupRecord>,
    protocols: BTreeMap<String, Arc<dyn ProtocolOps>>,
}

/// In-memory multi-FPGA core and attribute layer
///
/// Protocols register here; `attach`, `map_bar` and friends fan out to every
/// registered protocol the way the core does when it enumerates a card.
/// `write` and `read` reach the published attribute groups.
#[derive(Debug, Default)]
pub struct SoftwareHost {
    state: Mutex<HostState>,
}

impl SoftwareHost {
    /// Create a host with no protocols and no groups
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, HostState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // Callbacks re-enter the host (attach publishes a group), so the lock
    // is released before calling out.
    fn protocols(&self) -> Vec<Arc<dyn ProtocolOps>> {
        self.state().protocols.values().cloned().collect()
    }

    /// Names of registered protocols
    pub fn protocol_names(&self) -> Vec<String> {
        self.state().protocols.keys().cloned().collect()
    }

    /// Deliver a device arrival to every protocol
    ///
    /// # Errors
    ///
    /// Returns the first protocol error; later protocols are not called.
    pub fn attach(&self, device: &PhysicalDeviceId) -> Result<()> {
        for ops in self.protocols() {
            ops.attach(device)?;
        }
        Ok(())
    }

    /// Deliver a device removal to every protocol
    pub fn detach(&self, device: &PhysicalDeviceId) {
        for ops in self.protocols() {
            ops.detach(device);
        }
    }

    /// Deliver a BAR mapping to every protocol
    pub fn map_bar(&self, device: &PhysicalDeviceId, base: u64, len: u64) {
        for ops in self.protocols() {
            ops.map_bar(device, base, len);
        }
    }

    /// Deliver a BAR unmapping to every protocol
    pub fn unmap_bar(&self, device: &PhysicalDeviceId) {
        for ops in self.protocols() {
            ops.unmap_bar(device);
        }
    }

    fn find_ops(
        &self,
        device: &PhysicalDeviceId,
        attr: &str,
    ) -> Result<(Attribute, Arc<dyn AttributeOps>)> {
        let state = self.state();
        let attribute = Attribute::from_name(attr)?;
        let record = state
            .groups
            .values()
            .find(|g| &g.device == device && g.attributes.contains(&attribute))
            .ok_or_else(|| SpiError::device_not_found(device))?;
        let ops = record
            .ops
            .upgrade()
            .ok_or_else(|| SpiError::device_not_found(device))?;
        Ok((attribute, ops))
    }

    /// Write `buf` to attribute `attr` of `device`
    ///
    /// # Errors
    ///
    /// Returns `DeviceNotFound` if no group of `device` has `attr`, and the
    /// store callback's error otherwise.
    pub fn write(&self, device: &PhysicalDeviceId, attr: &str, buf: &str) -> Result<usize> {
        let (attribute, ops) = self.find_ops(device, attr)?;
        ops.store(device, attribute, buf)
    }

    /// Read attribute `attr` of `device`
    ///
    /// # Errors
    ///
    /// Returns `DeviceNotFound` if no group of `device` has `attr`, and the
    /// show callback's error otherwise.
    pub fn read(&self, device: &PhysicalDeviceId, attr: &str) -> Result<String> {
        let (attribute, ops) = self.find_ops(device, attr)?;
        ops.show(device, attribute)
    }

    /// Names of the groups published for `device`
    pub fn groups_for(&self, device: &PhysicalDeviceId) -> Vec<String> {
        self.state()
            .groups
            .values()
            .filter(|g| &g.device == device)
            .map(|g| g.name.clone())
            .collect()
    }

    /// Number of published groups across all devices
    pub fn group_count(&self) -> usize {
        self.state().groups.len()
    }
}

impl AttributeHost for SoftwareHost {
    fn create_group(
        &self,
        device: &PhysicalDeviceId,
        group: &str,
        attributes: &[Attribute],
        ops: Weak<dyn AttributeOps>,
    ) -> Result<AttributeGroupHandle> {
        let mut state = self.state();
        if state
            .groups
            .values()
            .any(|g| &g.device == device && g.name == group)
        {
            return Err(SpiError::already_exists(format!("{device}/{group}")));
        }
        state.next_group += 1;
        let handle = AttributeGroupHandle::new(state.next_group);
        state.groups.insert(
            handle,
            GroupRecord {
                device: device.clone(),
                name: group.to_string(),
                attributes: attributes.to_vec(),
                ops,
            },
        );
        debug!("created attribute group {device}/{group}");
        Ok(handle)
    }

    fn remove_group(&self, handle: AttributeGroupHandle) {
        if let Some(record) = self.state().groups.remove(&handle) {
            debug!("removed attribute group {}/{}", record.device, record.name);
        }
    }
}

impl ProtocolHost for SoftwareHost {
    fn register_protocol(&self, name: &str, ops: Arc<dyn ProtocolOps>) -> Result<()> {
        let mut state = self.state();
        if state.protocols.contains_key(name) {
            return Err(SpiError::already_exists(format!("protocol {name}")));
        }
        state.protocols.insert(name.to_string(), ops);
        info!("registered protocol {name}");
        Ok(())
    }

    fn unregister_protocol(&self, name: &str) {
        if self.state().protocols.remove(name).is_some() {
            info!("unregistered protocol {name}");
        }
    }
}
