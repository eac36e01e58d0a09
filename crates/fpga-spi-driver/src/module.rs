//! Protocol module load/unload
//!
//! Loading registers the manager with the multi-FPGA core under the
//! configured protocol name; from then on the core delivers attach, detach
//! and BAR events to it. Unloading withdraws the registration and detaches
//! every device still known to the manager.

use std::sync::Arc;

use tracing::info;

use crate::backend::{ProtocolHost, ProtocolOps};
use crate::error::Result;
use crate::lifecycle::SpiControllerManager;

/// A loaded SPI protocol module
#[derive(Debug)]
pub struct SpiProtocolModule {
    host: Arc<dyn ProtocolHost>,
    manager: Arc<SpiControllerManager>,
    loaded: bool,
}

impl SpiProtocolModule {
    /// Register `manager` with `host`
    ///
    /// # Errors
    ///
    /// Returns the host's error if the protocol name is already taken.
    pub fn load(host: Arc<dyn ProtocolHost>, manager: Arc<SpiControllerManager>) -> Result<Self> {
        info!("Loading SPI protocol module");
        let name = manager.options().protocol_name.clone();
        let ops: Arc<dyn ProtocolOps> = manager.clone();
        host.register_protocol(&name, ops)?;
        Ok(Self {
            host,
            manager,
            loaded: true,
        })
    }

    /// Manager driven by this module
    #[must_use]
    pub const fn manager(&self) -> &Arc<SpiControllerManager> {
        &self.manager
    }

    /// Whether the protocol is still registered
    #[must_use]
    pub const fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Withdraw the protocol and detach every remaining device
    pub fn unload(&mut self) {
        if !self.loaded {
            return;
        }
        info!("Unloading SPI protocol module");
        self.host
            .unregister_protocol(&self.manager.options().protocol_name);
        self.manager.shutdown();
        self.loaded = false;
    }
}

impl Drop for SpiProtocolModule {
    fn drop(&mut self) {
        self.unload();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::software::{SoftwareBus, SoftwareHost};
    use crate::device::PhysicalDeviceId;
    use crate::error::SpiError;

    #[test]
    fn test_load_routes_core_events() {
        let bus = Arc::new(SoftwareBus::new());
        let host = Arc::new(SoftwareHost::new());
        let manager = SpiControllerManager::new(bus, host.clone());
        let module = SpiProtocolModule::load(host.clone(), manager.clone()).unwrap();
        assert_eq!(host.protocol_names(), vec!["spi".to_string()]);

        let dev = PhysicalDeviceId::new("0000:01:00.0");
        host.attach(&dev).unwrap();
        host.map_bar(&dev, 0x2000, 0x1000);
        assert!(manager.window(&dev).unwrap().mapped);

        drop(module);
        assert!(host.protocol_names().is_empty());
        assert!(manager.devices().is_empty());
        assert_eq!(host.group_count(), 0);
    }

    #[test]
    fn test_double_load_rejected() {
        let bus = Arc::new(SoftwareBus::new());
        let host = Arc::new(SoftwareHost::new());
        let manager = SpiControllerManager::new(bus, host.clone());
        let mut first = SpiProtocolModule::load(host.clone(), manager.clone()).unwrap();
        let err = SpiProtocolModule::load(host.clone(), manager).unwrap_err();
        assert!(matches!(err, SpiError::AlreadyExists { .. }));

        first.unload();
        assert!(!first.is_loaded());
        first.unload();
    }
}
