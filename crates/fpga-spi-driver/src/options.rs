//! Manager policy knobs
//!
//! Two behaviours of the FPGA platform modules are policy rather than
//! fixed semantics: what happens to live controllers when the BAR is
//! unmapped, and whether a controller may be created before the BAR is
//! mapped. The defaults keep the established behaviour (controllers
//! survive unmap, unmapped creates compute against base 0).

use fpga_spi_layout::PROTOCOL_NAME;

/// Environment variable enabling [`ManagerOptions::revoke_on_unmap`]
pub const ENV_REVOKE_ON_UNMAP: &str = "FPGA_SPI_REVOKE_ON_UNMAP";

/// Environment variable enabling [`ManagerOptions::require_mapped_window`]
pub const ENV_REQUIRE_MAPPED: &str = "FPGA_SPI_REQUIRE_MAPPED";

/// Policy of a [`SpiControllerManager`](crate::SpiControllerManager)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerOptions {
    /// Destroy every controller of a device when its BAR is unmapped
    pub revoke_on_unmap: bool,
    /// Refuse `create_controller` while the BAR is unmapped
    pub require_mapped_window: bool,
    /// Protocol name registered with the multi-FPGA core
    pub protocol_name: String,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            revoke_on_unmap: false,
            require_mapped_window: false,
            protocol_name: PROTOCOL_NAME.to_string(),
        }
    }
}

impl ManagerOptions {
    /// Defaults overridden by `FPGA_SPI_REVOKE_ON_UNMAP` and
    /// `FPGA_SPI_REQUIRE_MAPPED`
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for the variables
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut options = Self::default();
        if let Some(value) = lookup(ENV_REVOKE_ON_UNMAP) {
            options.revoke_on_unmap = parse_flag(ENV_REVOKE_ON_UNMAP, &value);
        }
        if let Some(value) = lookup(ENV_REQUIRE_MAPPED) {
            options.require_mapped_window = parse_flag(ENV_REQUIRE_MAPPED, &value);
        }
        options
    }

    /// Set [`Self::revoke_on_unmap`]
    #[must_use]
    pub fn with_revoke_on_unmap(mut self, revoke: bool) -> Self {
        self.revoke_on_unmap = revoke;
        self
    }

    /// Set [`Self::require_mapped_window`]
    #[must_use]
    pub fn with_require_mapped_window(mut self, require: bool) -> Self {
        self.require_mapped_window = require;
        self
    }

    /// Set [`Self::protocol_name`]
    #[must_use]
    pub fn with_protocol_name(mut self, name: impl Into<String>) -> Self {
        self.protocol_name = name.into();
        self
    }
}

fn parse_flag(key: &str, value: &str) -> bool {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" | "" => false,
        other => {
            tracing::warn!("{key}={other:?} is not a boolean, treating as false");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = ManagerOptions::default();
        assert!(!options.revoke_on_unmap);
        assert!(!options.require_mapped_window);
        assert_eq!(options.protocol_name, "spi");
    }

    #[test]
    fn test_from_lookup() {
        let options = ManagerOptions::from_lookup(|key| match key {
            ENV_REVOKE_ON_UNMAP => Some("yes".into()),
            ENV_REQUIRE_MAPPED => Some("maybe".into()),
            _ => None,
        });
        assert!(options.revoke_on_unmap);
        assert!(!options.require_mapped_window);
    }

    #[test]
    fn test_builder() {
        let options = ManagerOptions::default()
            .with_require_mapped_window(true)
            .with_protocol_name("spi-test");
        assert!(options.require_mapped_window);
        assert_eq!(options.protocol_name, "spi-test");
    }
}
