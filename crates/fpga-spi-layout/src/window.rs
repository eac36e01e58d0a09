//! BAR window state and per-slot address arithmetic.
//!
//! ```text
//! start = window.base + offset + slot * slot_size
//! end   = start + slot_size - 1
//! ```
//!
//! The physical device hands over its BAR when the host maps it and takes it
//! back on unmap. Until then the window is zeroed and slot ranges are
//! computed against base 0.

/// Full BAR region owned by one physical device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryWindow {
    /// Bus address of the BAR (0 while unmapped).
    pub base: u64,
    /// BAR length in bytes (0 while unmapped).
    pub len: u64,
    /// Whether the host currently has the BAR mapped.
    pub mapped: bool,
}

impl MemoryWindow {
    /// Window state before the first map and after every unmap.
    #[must_use]
    pub const fn unmapped() -> Self {
        Self {
            base: 0,
            len: 0,
            mapped: false,
        }
    }

    /// Window state after the host mapped `len` bytes at `base`.
    #[must_use]
    pub const fn mapped(base: u64, len: u64) -> Self {
        Self {
            base,
            len,
            mapped: true,
        }
    }

    /// Inclusive last address of the window, `None` for an empty window.
    #[must_use]
    pub const fn last(&self) -> Option<u64> {
        if self.len == 0 {
            return None;
        }
        self.base.checked_add(self.len - 1)
    }

    /// Whether `range` lies entirely inside this window.
    #[must_use]
    pub fn contains(&self, range: &AddressRange) -> bool {
        match self.last() {
            Some(last) => range.start >= self.base && range.end <= last,
            None => false,
        }
    }
}

/// Inclusive address range handed to a sub-controller as its memory resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AddressRange {
    /// First byte.
    pub start: u64,
    /// Last byte (inclusive).
    pub end: u64,
}

impl std::fmt::Display for AddressRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:#x}, {:#x}]", self.start, self.end)
    }
}

/// Address range of `slot` inside `window`.
///
/// Total function: arithmetic wraps instead of failing. Callers validate the
/// slot index and a non-zero `slot_size` first, or use
/// [`checked_slot_range`].
#[must_use]
pub const fn slot_range(
    window: &MemoryWindow,
    offset: u32,
    slot_size: u32,
    slot: u32,
) -> AddressRange {
    let start = window
        .base
        .wrapping_add(offset as u64)
        .wrapping_add(slot as u64 * slot_size as u64);
    let end = start.wrapping_add(slot_size as u64).wrapping_sub(1);
    AddressRange { start, end }
}

/// [`slot_range`] that rejects a zero `slot_size` and 64-bit overflow.
#[must_use]
pub fn checked_slot_range(
    window: &MemoryWindow,
    offset: u32,
    slot_size: u32,
    slot: u32,
) -> Option<AddressRange> {
    if slot_size == 0 {
        return None;
    }
    let start = window
        .base
        .checked_add(u64::from(offset))?
        .checked_add(u64::from(slot) * u64::from(slot_size))?;
    let end = start.checked_add(u64::from(slot_size) - 1)?;
    Some(AddressRange { start, end })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_range_reference_point() {
        // 0x1000 + 0x100 + 2 * 0x40
        let window = MemoryWindow::mapped(0x1000, 0x1000);
        let range = slot_range(&window, 0x100, 0x40, 2);
        assert_eq!(range.start, 0x1180);
        assert_eq!(range.end, 0x11BF);
        assert_eq!(range.end - range.start + 1, 0x40);
    }

    #[test]
    fn test_first_slot_starts_at_offset() {
        let window = MemoryWindow::mapped(0x2000, 0x1000);
        let range = slot_range(&window, 0, 0x100, 0);
        assert_eq!(range, AddressRange { start: 0x2000, end: 0x20FF });
    }

    #[test]
    fn test_unmapped_window_uses_zero_base() {
        let range = slot_range(&MemoryWindow::unmapped(), 0x80, 0x100, 0);
        assert_eq!(range, AddressRange { start: 0x80, end: 0x17F });
    }

    #[test]
    fn test_adjacent_slots_are_contiguous() {
        let window = MemoryWindow::mapped(0x2000, 0x1000);
        let ranges: Vec<_> = (0..8).map(|s| slot_range(&window, 0, 0x100, s)).collect();
        for pair in ranges.windows(2) {
            assert_eq!(pair[0].end + 1, pair[1].start, "{} / {}", pair[0], pair[1]);
        }
        assert_eq!(ranges[7].end, 0x27FF);
        assert!(ranges.iter().all(|r| window.contains(r)));
    }

    #[test]
    fn test_checked_slot_range() {
        let window = MemoryWindow::mapped(u64::MAX - 0xFF, 0x100);
        assert!(checked_slot_range(&window, 0, 0x100, 0).is_some());
        assert!(checked_slot_range(&window, 0, 0x100, 1).is_none());
        assert!(checked_slot_range(&window, 0, 0, 0).is_none());
    }

    #[test]
    fn test_window_contains() {
        let window = MemoryWindow::mapped(0x2000, 0x1000);
        assert!(window.contains(&AddressRange { start: 0x2000, end: 0x2FFF }));
        assert!(!window.contains(&AddressRange { start: 0x2F00, end: 0x3000 }));
        assert!(!window.contains(&AddressRange { start: 0x1FFF, end: 0x2000 }));
        assert!(!MemoryWindow::unmapped().contains(&AddressRange { start: 0, end: 0 }));
    }
}
