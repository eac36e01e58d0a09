//! Fixed limits of the SPI protocol module.

/// Number of virtual SPI controllers one physical device can host.
pub const MAX_CONTROLLERS: usize = 8;

/// Storage size of a driver-name field, terminator included.
pub const NAME_SIZE: usize = 32;

/// Longest driver name that fits in [`NAME_SIZE`] bytes.
pub const MAX_NAME_LEN: usize = NAME_SIZE - 1;

/// Word width handed to every peripheral descriptor.
///
/// The FPGA SPI engines only shift 8-bit words.
pub const BITS_PER_WORD: u8 = 8;

/// Name the module registers its protocol under.
pub const PROTOCOL_NAME: &str = "spi";
