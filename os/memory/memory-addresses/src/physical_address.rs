use crate::MemoryAddress;
use core::fmt;

/// Physical memory address as seen by a DMA-capable device.
///
/// A thin wrapper around [`MemoryAddress`] that denotes **physical** addresses.
/// Like [`VirtualAddress`](super::VirtualAddress), this type carries intent and
/// prevents accidental VA↔PA mix-ups at call sites that fill descriptor rings.
///
/// ### Notes
/// - Translation tables report a **frame number** for each base page; use
///   [`PhysicalAddress::from_frame`] to rebuild the byte address.
///
/// ### Examples
/// ```rust
/// # use memory_addresses::*;
/// let pa = PhysicalAddress::from_frame(0x1_2345, 4096, 0x10).unwrap();
/// assert_eq!(pa.as_u64(), 0x1_2345_010);
/// assert_eq!(pa.checked_add(0x10), Some(PhysicalAddress::new(0x1_2345_020)));
/// ```
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PhysicalAddress(MemoryAddress);

impl PhysicalAddress {
    #[inline]
    #[must_use]
    pub const fn new(v: u64) -> Self {
        Self(MemoryAddress::new(v))
    }

    /// Rebuild a byte address from a frame number and in-page offset.
    ///
    /// Returns `None` if `frame * page_size + offset` overflows.
    #[inline]
    #[must_use]
    pub const fn from_frame(frame: u64, page_size: u64, offset: u64) -> Option<Self> {
        match frame.checked_mul(page_size) {
            Some(base) => match base.checked_add(offset) {
                Some(v) => Some(Self::new(v)),
                None => None,
            },
            None => None,
        }
    }

    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0.as_u64()
    }

    #[inline]
    #[must_use]
    pub const fn checked_add(self, rhs: u64) -> Option<Self> {
        match self.0.checked_add(rhs) {
            Some(a) => Some(Self(a)),
            None => None,
        }
    }
}

impl fmt::Debug for PhysicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PA(0x{:016X})", self.as_u64())
    }
}

impl fmt::Display for PhysicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016X}", self.as_u64())
    }
}
