//! Staged controller configuration
//!
//! Attribute writes land here first. Nothing is validated across fields
//! until a `create_controller` write commits the staged values, and the
//! values stay in place afterwards so several controllers can be created
//! from one staging pass.

use fpga_spi_layout::MAX_NAME_LEN;

use crate::attrs::Attribute;
use crate::error::{Result, SpiError};

/// Driver name that fits a `NAME_SIZE` buffer (at most 31 bytes).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct DriverName(String);

impl DriverName {
    /// Validate and wrap a driver name
    ///
    /// # Errors
    ///
    /// Returns `SpiError::InvalidInput` if the name is longer than 31 bytes
    /// or contains a NUL.
    pub fn new(name: &str) -> Result<Self> {
        if name.len() > MAX_NAME_LEN {
            return Err(SpiError::invalid_input(format!(
                "driver name is {} bytes, limit is {MAX_NAME_LEN}",
                name.len()
            )));
        }
        if name.contains('\0') {
            return Err(SpiError::invalid_input(format!(
                "driver name {name:?} contains NUL"
            )));
        }
        Ok(Self(name.to_string()))
    }

    /// Name as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether nothing has been staged
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for DriverName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Values written through the attribute interface but not yet committed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StagedConfig {
    /// Capacity hint; the hard limit stays `MAX_CONTROLLERS`
    pub slot_count: u32,
    /// Length of each controller window in bytes
    pub slot_size: u32,
    /// Offset from the BAR base to the first controller window
    pub window_base_offset: u32,
    /// Number of chip-select lines of each new controller
    pub chip_select_count: u32,
    /// Chip select of the peripheral behind the next controller
    pub chip_select: u32,
    /// Platform driver bound to the controller (e.g. `xilinx_spi`)
    pub bus_driver_name: DriverName,
    /// SPI driver bound to the peripheral (e.g. `spidev`)
    pub device_driver_name: DriverName,
}

impl StagedConfig {
    /// Store one attribute write
    ///
    /// `buf` is the raw text written by the caller; one trailing newline is
    /// ignored.
    ///
    /// # Errors
    ///
    /// Returns `SpiError::InvalidInput` if the value does not parse, or if
    /// `attr` is an action rather than a staged field.
    pub fn store(&mut self, attr: Attribute, buf: &str) -> Result<()> {
        let value = strip_newline(buf);
        match attr {
            Attribute::SlotCount => self.slot_count = parse_u32(value)?,
            Attribute::SlotSize => self.slot_size = parse_u32(value)?,
            Attribute::WindowBaseOffset => self.window_base_offset = parse_u32(value)?,
            Attribute::ChipSelectCount => self.chip_select_count = parse_u32(value)?,
            Attribute::ChipSelect => self.chip_select = parse_u32(value)?,
            Attribute::BusDriverName => self.bus_driver_name = DriverName::new(value)?,
            Attribute::DeviceDriverName => self.device_driver_name = DriverName::new(value)?,
            Attribute::CreateController | Attribute::DeleteController => {
                return Err(SpiError::invalid_input(format!(
                    "{} is an action, not a staged field",
                    attr.name()
                )));
            }
        }
        tracing::debug!("staged {} = {value:?}", attr.name());
        Ok(())
    }

    /// Render one attribute the way a read of it returns it
    #[must_use]
    pub fn show(&self, attr: Attribute) -> String {
        match attr {
            Attribute::SlotCount => format!("{}\n", self.slot_count),
            Attribute::SlotSize => format!("{}\n", self.slot_size),
            Attribute::WindowBaseOffset => format!("{}\n", self.window_base_offset),
            Attribute::ChipSelectCount => format!("{}\n", self.chip_select_count),
            Attribute::ChipSelect => format!("{}\n", self.chip_select),
            Attribute::BusDriverName => format!("{}\n", self.bus_driver_name),
            Attribute::DeviceDriverName => format!("{}\n", self.device_driver_name),
            Attribute::CreateController | Attribute::DeleteController => String::new(),
        }
    }

    /// Cross-field checks run when a controller is created
    ///
    /// # Errors
    ///
    /// Returns `SpiError::InvalidInput` if the slot size is zero or either
    /// driver name has not been staged.
    pub fn validate_for_create(&self) -> Result<()> {
        if self.slot_size == 0 {
            return Err(SpiError::invalid_input("slot_size must be staged before create"));
        }
        if self.bus_driver_name.is_empty() {
            return Err(SpiError::invalid_input(
                "bus_driver_name must be staged before create",
            ));
        }
        if self.device_driver_name.is_empty() {
            return Err(SpiError::invalid_input(
                "device_driver_name must be staged before create",
            ));
        }
        Ok(())
    }
}

/// Drop the single newline `echo` appends
pub(crate) fn strip_newline(buf: &str) -> &str {
    buf.strip_suffix('\n').unwrap_or(buf)
}

/// Parse an unsigned attribute value, decimal or `0x` hex
///
/// # Errors
///
/// Returns `SpiError::InvalidInput` for empty, signed or non-numeric text
/// and for values above `u32::MAX`.
pub fn parse_u32(text: &str) -> Result<u32> {
    let text = text.trim();
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => text.parse::<u32>(),
    };
    parsed.map_err(|e| SpiError::invalid_input(format!("cannot parse {text:?} as u32: {e}")))
}

/// Parse a controller index, keeping the sign so `0` and `-1` can be
/// reported as out of range rather than malformed
///
/// # Errors
///
/// Returns `SpiError::InvalidInput` for text that is not a decimal integer.
pub fn parse_index(text: &str) -> Result<i64> {
    let text = strip_newline(text).trim();
    text.parse::<i64>()
        .map_err(|e| SpiError::invalid_input(format!("cannot parse {text:?} as index: {e}")))
}
