//! Collaborator interfaces
//!
//! The manager never talks to a bus, a sysfs tree or the multi-FPGA core
//! directly. It drives three seams:
//!
//! - [`PlatformBus`]: instantiates and tears down sub-controller devices
//! - [`AttributeHost`]: publishes the per-device attribute group
//! - [`ProtocolHost`]: the multi-FPGA core that enumerates physical devices
//!   and calls back into registered protocols through [`ProtocolOps`]
//!
//! In-memory implementations of all three live in
//! [`backends::software`](crate::backends::software).

use std::fmt::Debug;
use std::sync::{Arc, Weak};

use fpga_spi_layout::AddressRange;

use crate::attrs::Attribute;
use crate::config::DriverName;
use crate::device::PhysicalDeviceId;
use crate::error::Result;

/// Token the platform bus hands out for an allocated device
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PlatformDeviceId(u64);

impl PlatformDeviceId {
    /// Create new device token
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get raw token value
    pub const fn id(&self) -> u64 {
        self.0
    }
}

/// Kind of a device resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    /// Memory-mapped register window (`IORESOURCE_MEM`)
    Memory,
}

/// One resource attached to a sub-controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerResource {
    /// Address range of the resource
    pub range: AddressRange,
    /// Resource kind
    pub kind: ResourceKind,
}

/// Peripheral sitting on a sub-controller's bus
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeripheralDescriptor {
    /// Driver bound to the peripheral
    pub modalias: DriverName,
    /// Select line the peripheral answers on
    pub chip_select: u32,
    /// Word width used on the wire
    pub bits_per_word: u8,
}

/// Platform data the controller driver reads at probe time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerPlatformData {
    /// Number of select lines the controller drives
    pub num_chipselect: u32,
    /// Word width of the controller
    pub bits_per_word: u8,
    /// Peripherals to instantiate behind the controller
    pub devices: Vec<PeripheralDescriptor>,
}

/// Everything a freshly allocated sub-controller is populated with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerSpec {
    /// Physical device the sub-controller hangs off
    pub parent: PhysicalDeviceId,
    /// Register window of the sub-controller
    pub resource: ControllerResource,
    /// Controller configuration
    pub platform_data: ControllerPlatformData,
}

/// Sub-device instantiation mechanism
///
/// Creation is three steps so a failure part-way can be unwound:
/// `allocate` → `configure` → `register`. An allocated device that never
/// registered must be handed back with `release`; a registered one with
/// `unregister`.
pub trait PlatformBus: Debug + Send + Sync {
    /// Allocate a device named `<driver>.<instance>`
    ///
    /// # Errors
    ///
    /// Returns `SpiError::AllocationFailed` if no device can be allocated.
    fn allocate(&self, driver: &DriverName, instance: u32) -> Result<PlatformDeviceId>;

    /// Attach resources, platform data and parent to an allocated device
    ///
    /// # Errors
    ///
    /// Returns `SpiError::AllocationFailed` if the data cannot be copied.
    fn configure(&self, device: PlatformDeviceId, spec: &ControllerSpec) -> Result<()>;

    /// Make the device visible so its driver can bind
    ///
    /// # Errors
    ///
    /// Returns `SpiError::RegistrationFailed` if the bus rejects the device.
    fn register(&self, device: PlatformDeviceId) -> Result<()>;

    /// Free a device that was allocated but never registered
    fn release(&self, device: PlatformDeviceId);

    /// Unregister and free a registered device
    fn unregister(&self, device: PlatformDeviceId);
}

/// Handle of a published attribute group
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AttributeGroupHandle(u64);

impl AttributeGroupHandle {
    /// Create new group handle
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get raw handle value
    pub const fn id(&self) -> u64 {
        self.0
    }
}

/// Store/show callbacks bound to a published attribute group
pub trait AttributeOps: Debug + Send + Sync {
    /// Handle a write; returns the number of bytes consumed
    ///
    /// # Errors
    ///
    /// Returns the error to report to the writer.
    fn store(&self, device: &PhysicalDeviceId, attr: Attribute, buf: &str) -> Result<usize>;

    /// Handle a read
    ///
    /// # Errors
    ///
    /// Returns the error to report to the reader.
    fn show(&self, device: &PhysicalDeviceId, attr: Attribute) -> Result<String>;
}

/// Generic attribute exposure mechanism (a sysfs attribute group)
pub trait AttributeHost: Debug + Send + Sync {
    /// Publish `attributes` under `group` for `device`
    ///
    /// The host keeps only a weak reference to `ops`; reads and writes after
    /// the owner is gone fail with `DeviceNotFound`.
    ///
    /// # Errors
    ///
    /// Returns `SpiError::AllocationFailed` if the group cannot be created.
    fn create_group(
        &self,
        device: &PhysicalDeviceId,
        group: &str,
        attributes: &[Attribute],
        ops: Weak<dyn AttributeOps>,
    ) -> Result<AttributeGroupHandle>;

    /// Remove a previously published group
    fn remove_group(&self, handle: AttributeGroupHandle);
}

/// Lifecycle callbacks a protocol module hands to the multi-FPGA core
pub trait ProtocolOps: Debug + Send + Sync {
    /// A physical device appeared
    ///
    /// # Errors
    ///
    /// Returns error if per-device state cannot be set up.
    fn attach(&self, device: &PhysicalDeviceId) -> Result<()>;

    /// A physical device is going away
    fn detach(&self, device: &PhysicalDeviceId);

    /// The device's BAR was mapped at `base` for `len` bytes
    fn map_bar(&self, device: &PhysicalDeviceId, base: u64, len: u64);

    /// The device's BAR was unmapped
    fn unmap_bar(&self, device: &PhysicalDeviceId);
}

/// The multi-FPGA core protocols register with
pub trait ProtocolHost: Debug + Send + Sync {
    /// Register `ops` under `name`
    ///
    /// # Errors
    ///
    /// Returns `SpiError::AlreadyExists` if `name` is taken.
    fn register_protocol(&self, name: &str, ops: Arc<dyn ProtocolOps>) -> Result<()>;

    /// Remove the protocol registered under `name`
    fn unregister_protocol(&self, name: &str);
}
