//! Error types for SPI sub-controller management

use rustix::io::Errno;
use thiserror::Error;

/// Result type alias for SPI controller operations
pub type Result<T> = std::result::Result<T, SpiError>;

/// Errors that can occur while managing SPI sub-controllers
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpiError {
    /// Controller index outside `1..=MAX_CONTROLLERS`
    #[error("SPI controller {index} out of range (valid 1..={max})")]
    OutOfRange {
        /// Index as written by the caller (1-based)
        index: i64,
        /// Highest valid index
        max: usize,
    },

    /// Slot already holds a controller, or the device is already attached
    #[error("{what} already exists")]
    AlreadyExists {
        /// Description of the existing object
        what: String,
    },

    /// Slot is empty
    #[error("SPI controller {index} doesn't exist")]
    NotFound {
        /// Index as written by the caller (1-based)
        index: u32,
    },

    /// No state is recorded for the physical device
    #[error("unable to find spi module data for device {device}")]
    DeviceNotFound {
        /// Physical device identity
        device: String,
    },

    /// Malformed attribute write or unusable staged configuration
    #[error("Invalid input: {reason}")]
    InvalidInput {
        /// Reason for rejection
        reason: String,
    },

    /// Resources for the sub-controller could not be allocated
    #[error("Allocation failed: {reason}")]
    AllocationFailed {
        /// Reason for failure
        reason: String,
    },

    /// The platform bus rejected the new sub-controller
    #[error("Cannot register platform device: {reason}")]
    RegistrationFailed {
        /// Reason for failure
        reason: String,
    },
}

impl SpiError {
    /// Create an out-of-range error for a 1-based index
    pub fn out_of_range(index: i64) -> Self {
        Self::OutOfRange {
            index,
            max: fpga_spi_layout::MAX_CONTROLLERS,
        }
    }

    /// Create an already-exists error
    pub fn already_exists(what: impl Into<String>) -> Self {
        Self::AlreadyExists { what: what.into() }
    }

    /// Create a device not found error
    pub fn device_not_found(device: impl std::fmt::Display) -> Self {
        Self::DeviceNotFound {
            device: device.to_string(),
        }
    }

    /// Create an invalid input error
    pub fn invalid_input(reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            reason: reason.into(),
        }
    }

    /// Create an allocation failed error
    pub fn allocation_failed(reason: impl Into<String>) -> Self {
        Self::AllocationFailed {
            reason: reason.into(),
        }
    }

    /// Create a registration failed error
    pub fn registration_failed(reason: impl Into<String>) -> Self {
        Self::RegistrationFailed {
            reason: reason.into(),
        }
    }

    /// Kernel-style errno for this error
    ///
    /// Index and lookup failures report `ENODEV`, matching what attribute
    /// writers of the FPGA platform modules already expect.
    pub fn errno(&self) -> Errno {
        match self {
            Self::OutOfRange { .. } | Self::NotFound { .. } | Self::DeviceNotFound { .. } => {
                Errno::NODEV
            }
            Self::AlreadyExists { .. } => Errno::EXIST,
            Self::InvalidInput { .. } => Errno::INVAL,
            Self::AllocationFailed { .. } => Errno::NOMEM,
            Self::RegistrationFailed { .. } => Errno::IO,
        }
    }

    /// Negative result code as returned from an attribute store
    pub fn to_errno(&self) -> i32 {
        -self.errno().raw_os_error()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negative_codes() {
        assert_eq!(SpiError::out_of_range(0).to_errno(), -19);
        assert_eq!(SpiError::NotFound { index: 2 }.to_errno(), -19);
        assert_eq!(SpiError::device_not_found("0000:01:00.0").to_errno(), -19);
        assert_eq!(SpiError::already_exists("x").to_errno(), -17);
        assert_eq!(SpiError::invalid_input("x").to_errno(), -22);
        assert_eq!(SpiError::allocation_failed("x").to_errno(), -12);
        assert_eq!(SpiError::registration_failed("x").to_errno(), -5);
    }

    #[test]
    fn test_messages() {
        assert_eq!(
            SpiError::out_of_range(9).to_string(),
            "SPI controller 9 out of range (valid 1..=8)"
        );
        assert_eq!(
            SpiError::NotFound { index: 3 }.to_string(),
            "SPI controller 3 doesn't exist"
        );
    }
}
