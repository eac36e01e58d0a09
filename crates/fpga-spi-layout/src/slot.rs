//! Slot numbering.
//!
//! Slots are numbered from 1 wherever a user sees them (attribute writes,
//! the `spiN` bus number) and from 0 everywhere inside the driver.

use crate::limits::MAX_CONTROLLERS;

/// A validated 0-based controller slot, always below [`MAX_CONTROLLERS`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotIndex(u8);

impl SlotIndex {
    /// Build a slot from a 0-based index.
    #[must_use]
    pub fn new(index: usize) -> Option<Self> {
        if index < MAX_CONTROLLERS {
            u8::try_from(index).ok().map(Self)
        } else {
            None
        }
    }

    /// Build a slot from the 1-based number a user wrote.
    ///
    /// Returns `None` for 0, negative numbers and anything above
    /// [`MAX_CONTROLLERS`].
    #[must_use]
    pub fn from_external(number: i64) -> Option<Self> {
        if number < 1 {
            return None;
        }
        usize::try_from(number - 1).ok().and_then(Self::new)
    }

    /// 0-based position in the registry.
    #[must_use]
    pub const fn get(self) -> usize {
        self.0 as usize
    }

    /// 0-based position as `u32`, the operand of the window arithmetic.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0 as u32
    }

    /// 1-based number, also used as the platform device instance id so the
    /// resulting bus is `spi<number>`.
    #[must_use]
    pub const fn external(self) -> u32 {
        self.0 as u32 + 1
    }
}

impl std::fmt::Display for SlotIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.external())
    }
}
