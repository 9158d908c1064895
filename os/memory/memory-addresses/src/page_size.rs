use core::fmt;
use core::hash::Hash;

/// Sealed trait pattern to restrict `PageSize` impls to our markers.
mod sealed {
    pub trait Sealed {}
}

/// Marker trait for supported page sizes.
pub trait PageSize:
    sealed::Sealed + Clone + Copy + Eq + PartialEq + Ord + PartialOrd + Hash + fmt::Display + fmt::Debug
{
    /// Page size in bytes (power of two).
    const SIZE: u64;
    /// log2(SIZE), i.e., number of low bits used for the offset.
    const SHIFT: u32;

    fn as_str() -> &'static str;
}

/// Round `len` up to a multiple of the power-of-two `size`.
///
/// Exact multiples are returned unchanged; `None` on overflow. The size is a
/// runtime value, e.g. a hugetlbfs `pagesize=` or the `sysconf` base page size.
#[inline]
#[must_use]
pub const fn round_up_to(len: u64, size: u64) -> Option<u64> {
    debug_assert!(size.is_power_of_two());
    match len.checked_add(size - 1) {
        Some(v) => Some(v & !(size - 1)),
        None => None,
    }
}

/// 4 KiB page (4096 bytes).
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Size4K;
impl sealed::Sealed for Size4K {}
impl PageSize for Size4K {
    const SIZE: u64 = 4096;
    const SHIFT: u32 = 12;

    fn as_str() -> &'static str {
        "4K"
    }
}

/// 2 MiB huge page (`2_097_152` bytes), the default hugetlbfs page size on x86-64.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Size2M;
impl sealed::Sealed for Size2M {}
impl PageSize for Size2M {
    const SIZE: u64 = 2 * 1024 * 1024;
    const SHIFT: u32 = 21;

    fn as_str() -> &'static str {
        "2M"
    }
}

macro_rules! impl_page_size_fmt {
    ($($ty:ty),*) => {
        $(
            impl fmt::Display for $ty {
                fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                    f.write_str(Self::as_str())
                }
            }

            impl fmt::Debug for $ty {
                fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                    fmt::Display::fmt(&self, f)
                }
            }
        )*
    };
}

impl_page_size_fmt!(Size4K, Size2M);

const _: () = {
    assert!(Size4K::SIZE == 1 << Size4K::SHIFT);
    assert!(Size2M::SIZE == 1 << Size2M::SHIFT);
};
