use core::fmt;

/// Principal raw memory address ([virtual](super::VirtualAddress) or [physical](super::PhysicalAddress)).
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct MemoryAddress(u64);

impl MemoryAddress {
    #[inline]
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Align down to a runtime power-of-two `size`.
    #[inline]
    #[must_use]
    pub const fn align_down_to(self, size: u64) -> Self {
        Self(self.0 & !(size - 1))
    }

    #[inline]
    #[must_use]
    pub const fn is_aligned_to(self, size: u64) -> bool {
        self.0 & (size - 1) == 0
    }

    /// Index of the page of runtime `size` containing this address.
    #[inline]
    #[must_use]
    pub const fn page_index(self, size: u64) -> u64 {
        self.0 / size
    }

    /// Offset of this address within its page of runtime `size`.
    #[inline]
    #[must_use]
    pub const fn page_offset(self, size: u64) -> u64 {
        self.0 % size
    }

    #[inline]
    #[must_use]
    pub const fn checked_add(self, rhs: u64) -> Option<Self> {
        match self.0.checked_add(rhs) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }
}

impl fmt::Debug for MemoryAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // 0xHHHH_HHHH_HHHH_HHHH style
        write!(f, "MemoryAddress(0x{:016X})", self.0)
    }
}

impl fmt::Display for MemoryAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016X}", self.as_u64())
    }
}
