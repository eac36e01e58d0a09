//! Per-device attribute interface
//!
//! Every attached FPGA gets one attribute group named `spi`. Seven attributes
//! stage configuration, two trigger actions:
//!
//! ```text
//! spi/
//! ├── slot_count            u32   capacity hint
//! ├── slot_size             u32   bytes per controller window
//! ├── window_base_offset    u32   BAR offset of controller 1
//! ├── chip_select_count     u32   select lines per controller
//! ├── chip_select           u32   select line of the peripheral
//! ├── bus_driver_name       str   controller driver (≤ 31 bytes)
//! ├── device_driver_name    str   peripheral driver (≤ 31 bytes)
//! ├── create_controller     1..=8 instantiate from staged values
//! └── delete_controller     1..=8 tear one controller down
//! ```

use crate::error::{Result, SpiError};

/// Name of the attribute group published for every physical device
pub const ATTRIBUTE_GROUP: &str = "spi";

/// Permission bits of every attribute (`S_IWUSR | S_IRUGO`)
pub const ATTRIBUTE_MODE: u32 = 0o644;

/// One entry of the attribute group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attribute {
    /// Capacity hint
    SlotCount,
    /// Per-controller window length
    SlotSize,
    /// Offset from the BAR base to the first controller window
    WindowBaseOffset,
    /// Select lines per controller
    ChipSelectCount,
    /// Select line of the peripheral
    ChipSelect,
    /// Controller driver name
    BusDriverName,
    /// Peripheral driver name
    DeviceDriverName,
    /// Action: create the controller at the written 1-based index
    CreateController,
    /// Action: delete the controller at the written 1-based index
    DeleteController,
}

impl Attribute {
    /// Every attribute in publication order
    pub const ALL: [Self; 9] = [
        Self::CreateController,
        Self::DeleteController,
        Self::SlotCount,
        Self::SlotSize,
        Self::WindowBaseOffset,
        Self::ChipSelectCount,
        Self::ChipSelect,
        Self::BusDriverName,
        Self::DeviceDriverName,
    ];

    /// File name inside the attribute group
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::SlotCount => "slot_count",
            Self::SlotSize => "slot_size",
            Self::WindowBaseOffset => "window_base_offset",
            Self::ChipSelectCount => "chip_select_count",
            Self::ChipSelect => "chip_select",
            Self::BusDriverName => "bus_driver_name",
            Self::DeviceDriverName => "device_driver_name",
            Self::CreateController => "create_controller",
            Self::DeleteController => "delete_controller",
        }
    }

    /// Look an attribute up by file name
    ///
    /// # Errors
    ///
    /// Returns `SpiError::InvalidInput` for an unknown name.
    pub fn from_name(name: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|a| a.name() == name)
            .ok_or_else(|| SpiError::invalid_input(format!("unknown attribute {name:?}")))
    }

    /// Whether writing this attribute triggers an action instead of staging
    #[must_use]
    pub const fn is_action(self) -> bool {
        matches!(self, Self::CreateController | Self::DeleteController)
    }
}

impl std::fmt::Display for Attribute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Attribute {
    type Err = SpiError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_name(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for attr in Attribute::ALL {
            assert_eq!(Attribute::from_name(attr.name()).unwrap(), attr);
        }
        assert!(Attribute::from_name("spi_base_addr").is_err());
    }

    #[test]
    fn test_actions() {
        let actions: Vec<_> = Attribute::ALL.into_iter().filter(|a| a.is_action()).collect();
        assert_eq!(
            actions,
            vec![Attribute::CreateController, Attribute::DeleteController]
        );
    }
}
