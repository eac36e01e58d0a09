//! Physical device identity
//!
//! The multi-FPGA core hands every protocol module the PCI device it
//! enumerated. Only the device's identity matters here; all per-device state
//! lives in the [`DeviceTable`](crate::table::DeviceTable) under that identity.

use std::sync::Arc;

/// Identity of one attached FPGA card, normally its PCIe address
/// (`0000:a1:00.0`).
///
/// Cheap to clone and stable for as long as the device stays attached.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PhysicalDeviceId(Arc<str>);

impl PhysicalDeviceId {
    /// Wrap a device name
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    /// Device name as given by the host framework
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PhysicalDeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PhysicalDeviceId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for PhysicalDeviceId {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity() {
        let a = PhysicalDeviceId::from("0000:01:00.0");
        let b = PhysicalDeviceId::from(String::from("0000:01:00.0"));
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "0000:01:00.0");
    }
}
