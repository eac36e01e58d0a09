//! Per-device controller registry
//!
//! Eight slots, each empty or holding one registered sub-controller.
//! Indices arrive 1-based from attribute writes and are converted to
//! [`SlotIndex`] before anything else happens, so an out-of-range write
//! never touches a slot.

use fpga_spi_layout::{
    checked_slot_range, AddressRange, MemoryWindow, SlotIndex, BITS_PER_WORD, MAX_CONTROLLERS,
};
use tracing::{debug, error, info};

use crate::backend::{
    ControllerPlatformData, ControllerResource, ControllerSpec, PeripheralDescriptor,
    PlatformBus, PlatformDeviceId, ResourceKind,
};
use crate::config::{DriverName, StagedConfig};
use crate::device::PhysicalDeviceId;
use crate::error::{Result, SpiError};

/// One instantiated sub-controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubControllerHandle {
    /// Platform bus token
    pub device: PlatformDeviceId,
    /// Slot the controller occupies
    pub slot: SlotIndex,
    /// Register window handed to the controller
    pub range: AddressRange,
    /// Controller driver
    pub driver: DriverName,
    /// Select lines of the controller
    pub num_chipselect: u32,
    /// The single peripheral behind the controller
    pub peripheral: PeripheralDescriptor,
}

impl SubControllerHandle {
    /// Platform device name, `<driver>.<slot number>`
    #[must_use]
    pub fn name(&self) -> String {
        format!("{}.{}", self.driver, self.slot.external())
    }
}

/// Fixed table of sub-controllers for one physical device
#[derive(Debug, Default)]
pub struct ControllerRegistry {
    slots: [Option<SubControllerHandle>; MAX_CONTROLLERS],
}

impl ControllerRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Convert a 1-based controller number into a slot
    ///
    /// # Errors
    ///
    /// Returns `SpiError::OutOfRange` unless `1 <= index <= MAX_CONTROLLERS`.
    pub fn slot_for(index: i64) -> Result<SlotIndex> {
        SlotIndex::from_external(index).ok_or_else(|| {
            debug!("SPI controller {index} outside 1..={MAX_CONTROLLERS}");
            SpiError::out_of_range(index)
        })
    }

    /// Instantiate a controller at 1-based `index` from the staged values
    ///
    /// # Errors
    ///
    /// - `OutOfRange` for an invalid index
    /// - `AlreadyExists` if the slot is occupied
    /// - `InvalidInput` if the staged values are incomplete or the slot
    ///   window overflows or leaves the mapped BAR
    /// - `AllocationFailed` / `RegistrationFailed` from the platform bus; the
    ///   half-built device is released before returning
    pub fn create(
        &mut self,
        index: i64,
        window: &MemoryWindow,
        cfg: &StagedConfig,
        parent: &PhysicalDeviceId,
        bus: &dyn PlatformBus,
    ) -> Result<&SubControllerHandle> {
        let slot = Self::slot_for(index)?;

        if self.slots[slot.get()].is_some() {
            debug!("SPI controller {slot} already exists on {parent}");
            return Err(SpiError::already_exists(format!("SPI controller {slot}")));
        }

        cfg.validate_for_create()?;

        let range = checked_slot_range(window, cfg.window_base_offset, cfg.slot_size, slot.as_u32())
            .ok_or_else(|| {
                SpiError::invalid_input(format!(
                    "window of controller {slot} overflows the address space"
                ))
            })?;

        if window.mapped && !window.contains(&range) {
            return Err(SpiError::invalid_input(format!(
                "controller {slot} window {range} leaves BAR [{:#x}, +{:#x})",
                window.base, window.len
            )));
        }

        debug!(
            "bar_start: {:#010x} spi_start {:#010x} controller_start {:#010x}",
            window.base,
            window.base.wrapping_add(u64::from(cfg.window_base_offset)),
            range.start
        );

        let peripheral = PeripheralDescriptor {
            modalias: cfg.device_driver_name.clone(),
            chip_select: cfg.chip_select,
            bits_per_word: BITS_PER_WORD,
        };
        let spec = ControllerSpec {
            parent: parent.clone(),
            resource: ControllerResource {
                range,
                kind: ResourceKind::Memory,
            },
            platform_data: ControllerPlatformData {
                num_chipselect: cfg.chip_select_count,
                bits_per_word: BITS_PER_WORD,
                devices: vec![peripheral.clone()],
            },
        };

        let pending = PendingDevice::allocate(bus, &cfg.bus_driver_name, slot.external())?;
        bus.configure(pending.id, &spec)?;
        info!("Register platform dev {}.{slot}", cfg.bus_driver_name);
        let device = pending.register()?;

        let handle: &SubControllerHandle = self.slots[slot.get()].insert(SubControllerHandle {
            device,
            slot,
            range,
            driver: cfg.bus_driver_name.clone(),
            num_chipselect: cfg.chip_select_count,
            peripheral,
        });
        info!("platform dev {} registered at {range}", handle.name());
        Ok(handle)
    }

    /// Tear down the controller at 1-based `index`
    ///
    /// # Errors
    ///
    /// Returns `OutOfRange` for an invalid index and `NotFound` for an empty
    /// slot. Neither changes any state.
    pub fn destroy(&mut self, index: i64, bus: &dyn PlatformBus) -> Result<SubControllerHandle> {
        let slot = Self::slot_for(index)?;

        let Some(handle) = self.slots[slot.get()].take() else {
            debug!("SPI controller {slot} doesn't exist");
            return Err(SpiError::NotFound {
                index: slot.external(),
            });
        };

        info!("Unregister platform dev {}", handle.name());
        bus.unregister(handle.device);
        Ok(handle)
    }

    /// Tear down every controller; returns how many there were
    pub fn destroy_all(&mut self, bus: &dyn PlatformBus) -> usize {
        let mut destroyed = 0;
        for handle in self.slots.iter_mut().filter_map(Option::take) {
            info!("Unregister platform dev {}", handle.name());
            bus.unregister(handle.device);
            destroyed += 1;
        }
        destroyed
    }

    /// Controller in `slot`, if any
    #[must_use]
    pub fn get(&self, slot: SlotIndex) -> Option<&SubControllerHandle> {
        self.slots[slot.get()].as_ref()
    }

    /// Occupied slots in ascending order
    pub fn occupied(&self) -> impl Iterator<Item = &SubControllerHandle> {
        self.slots.iter().flatten()
    }

    /// Number of occupied slots
    #[must_use]
    pub fn occupancy(&self) -> usize {
        self.occupied().count()
    }

    /// Whether no slot is occupied
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }
}

/// Allocated device that is released on drop unless it registers
struct PendingDevice<'a> {
    bus: &'a dyn PlatformBus,
    id: PlatformDeviceId,
    committed: bool,
}

impl<'a> PendingDevice<'a> {
    fn allocate(bus: &'a dyn PlatformBus, driver: &DriverName, instance: u32) -> Result<Self> {
        let id = bus.allocate(driver, instance)?;
        Ok(Self {
            bus,
            id,
            committed: false,
        })
    }

    fn register(mut self) -> Result<PlatformDeviceId> {
        self.bus.register(self.id).inspect_err(|e| error!("{e}"))?;
        self.committed = true;
        Ok(self.id)
    }
}

impl Drop for PendingDevice<'_> {
    fn drop(&mut self) {
        if !self.committed {
            debug!("Releasing unregistered platform dev {}", self.id.id());
            self.bus.release(self.id);
        }
    }
}
