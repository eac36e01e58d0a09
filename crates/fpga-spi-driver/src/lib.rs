//! Lifecycle manager for virtual SPI sub-controllers hosted in an FPGA BAR.
//!
//! An FPGA expansion card exposes one memory-mapped PCI BAR. Up to eight
//! SPI controller cores live at fixed-size slots inside it. This crate
//! stages their parameters through a per-device attribute group, then
//! instantiates each one as a platform device with its own MMIO resource
//! and a single attached peripheral.
//!
//! # Collaborators
//!
//! ```text
//! ProtocolHost  ── attach / detach / map_bar / unmap_bar ──▶ SpiControllerManager
//! AttributeHost ── store / show ──────────────────────────▶ SpiControllerManager
//! SpiControllerManager ── allocate / configure / register ─▶ PlatformBus
//! ```
//!
//! [`backends::software`] implements all three collaborator traits in
//! memory.
//!
//! # Quick start
//!
//! ```
//! use std::sync::Arc;
//! use fpga_spi_driver::prelude::*;
//!
//! # fn main() -> fpga_spi_driver::Result<()> {
//! let bus = Arc::new(SoftwareBus::new());
//! let host = Arc::new(SoftwareHost::new());
//! let manager = SpiControllerManager::new(bus.clone(), host.clone());
//! let _module = SpiProtocolModule::load(host.clone(), manager.clone())?;
//!
//! let dev = PhysicalDeviceId::new("0000:01:00.0");
//! host.attach(&dev)?;
//! host.map_bar(&dev, 0x2000, 0x1000);
//! host.write(&dev, "slot_size", "0x100\n")?;
//! host.write(&dev, "chip_select_count", "1\n")?;
//! host.write(&dev, "bus_driver_name", "xilinx_spi\n")?;
//! host.write(&dev, "device_driver_name", "spidev\n")?;
//! host.write(&dev, "create_controller", "1\n")?;
//!
//! assert_eq!(bus.registered_names(), ["xilinx_spi.1"]);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod attrs;
pub mod backend;
pub mod backends;
pub mod config;
mod device;
mod error;
mod lifecycle;
mod module;
pub mod options;
pub mod registry;
pub mod table;

pub use attrs::{Attribute, ATTRIBUTE_GROUP, ATTRIBUTE_MODE};
pub use backend::{
    AttributeGroupHandle, AttributeHost, AttributeOps, ControllerPlatformData, ControllerResource,
    ControllerSpec, PeripheralDescriptor, PlatformBus, PlatformDeviceId, ProtocolHost,
    ProtocolOps, ResourceKind,
};
pub use config::{parse_index, parse_u32, DriverName, StagedConfig};
pub use device::PhysicalDeviceId;
pub use error::{Result, SpiError};
pub use lifecycle::SpiControllerManager;
pub use module::SpiProtocolModule;
pub use options::ManagerOptions;
pub use registry::{ControllerRegistry, SubControllerHandle};

/// Address-space model re-exported from `fpga-spi-layout`.
pub mod layout {
    pub use fpga_spi_layout::{
        checked_slot_range, slot_range, AddressRange, MemoryWindow, SlotIndex, BITS_PER_WORD,
        MAX_CONTROLLERS, MAX_NAME_LEN, NAME_SIZE, PROTOCOL_NAME,
    };
}

/// Common imports
pub mod prelude {
    pub use crate::backends::software::{SoftwareBus, SoftwareHost};
    pub use crate::{
        Attribute, ManagerOptions, PhysicalDeviceId, SpiControllerManager, SpiError,
        SpiProtocolModule, SubControllerHandle,
    };
}
