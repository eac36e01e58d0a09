//! Address-space model for SPI sub-controllers carved out of an FPGA BAR.
//!
//! This crate has **no dependencies** and **no hardware access**. It is a
//! pure model of how one PCI BAR on a multi-FPGA card is partitioned into
//! up to eight virtual SPI controller windows.
//!
//! # Crate organisation
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`limits`] | Slot capacity, driver-name size, SPI word width, protocol name |
//! | [`slot`] | [`SlotIndex`]: 0-based slot with 1-based external numbering |
//! | [`window`] | [`MemoryWindow`], [`AddressRange`], slot-window arithmetic |
//!
//! # Layout
//!
//! ```text
//! BAR base
//! │
//! ├── window_base_offset ──┐
//! │                        ▼
//! │                  ┌──────────┬──────────┬─────┬──────────┐
//! │                  │ slot 0   │ slot 1   │ ... │ slot 7   │
//! │                  │ spi1     │ spi2     │     │ spi8     │
//! │                  └──────────┴──────────┴─────┴──────────┘
//! │                    slot_size  slot_size        slot_size
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod limits;
pub mod slot;
pub mod window;

pub use limits::{BITS_PER_WORD, MAX_CONTROLLERS, MAX_NAME_LEN, NAME_SIZE, PROTOCOL_NAME};
pub use slot::SlotIndex;
pub use window::{checked_slot_range, slot_range, AddressRange, MemoryWindow};
