use crate::MemoryAddress;
use core::fmt;
use core::ptr::NonNull;

/// Virtual memory address in the calling process.
///
/// A thin wrapper around [`MemoryAddress`] that denotes **virtual** addresses.
/// It carries the *kind* of address at the type level so a CPU-side pointer is
/// never programmed into a device by accident.
///
/// ### Invariants
/// - No invariant beyond “this is intended to be a virtual address”.
/// - The type never owns or dereferences memory; keep the pointer you got it
///   from if you need to access the bytes.
///
/// ### Examples
/// ```rust
/// # use memory_addresses::*;
/// let va = VirtualAddress::new(0x7F00_0020_1234);
/// assert_eq!(va.page_index(4096), 0x7F00_0020_1234 / 4096);
/// assert_eq!(va.page_offset(4096), 0x234);
/// assert!(!va.is_aligned_to(Size2M::SIZE));
/// ```
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct VirtualAddress(MemoryAddress);

impl VirtualAddress {
    #[inline]
    #[must_use]
    pub fn from_nonnull<T>(ptr: NonNull<T>) -> Self {
        Self::from_ptr(ptr.as_ptr())
    }

    #[inline]
    #[must_use]
    pub fn from_ptr<T>(ptr: *const T) -> Self {
        const _: () = assert!(
            size_of::<*const ()>() == size_of::<u64>(),
            "pointer size mismatch"
        );

        Self::new(ptr.addr() as u64)
    }

    #[inline]
    #[must_use]
    pub const fn new(v: u64) -> Self {
        Self(MemoryAddress::new(v))
    }

    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0.as_u64()
    }

    #[inline]
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.as_u64() == 0
    }

    #[inline]
    #[must_use]
    pub const fn is_aligned_to(self, size: u64) -> bool {
        self.0.is_aligned_to(size)
    }

    /// Base of the page of runtime `size` that contains this address.
    #[inline]
    #[must_use]
    pub const fn align_down_to(self, size: u64) -> Self {
        Self(self.0.align_down_to(size))
    }

    /// Index of the page of runtime `size` containing this address.
    ///
    /// For `/proc/self/pagemap` lookups `size` is the platform base page size.
    #[inline]
    #[must_use]
    pub const fn page_index(self, size: u64) -> u64 {
        self.0.page_index(size)
    }

    #[inline]
    #[must_use]
    pub const fn page_offset(self, size: u64) -> u64 {
        self.0.page_offset(size)
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

impl fmt::Debug for VirtualAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VA(0x{:016X})", self.as_u64())
    }
}

impl fmt::Display for VirtualAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016X}", self.as_u64())
    }
}
