use crate::TranslationError;
use bitfield_struct::bitfield;
use memory_addresses::VirtualAddress;

/// Mask of the frame-number field (bits 0..=54).
pub const FRAME_MASK: u64 = (1 << 55) - 1;

/// One 64-bit record of `/proc/<pid>/pagemap`.
///
/// The kernel exposes one entry per **base page** of the virtual address
/// space, regardless of whether the page is backed by a huge page.
///
/// ### Bit layout
///
/// | Bits   | Name            | Meaning |
/// |--------|-----------------|---------|
/// | 0–54   | `frame`         | Page frame number if present (swap type/offset if swapped) |
/// | 55     | `soft_dirty`    | PTE is soft-dirty |
/// | 56     | `exclusive`     | Page is exclusively mapped |
/// | 57     | `uffd_wp`       | PTE is write-protected through userfaultfd |
/// | 58–60  | -               | Zero |
/// | 61     | `file_shared`   | File-page or shared-anon |
/// | 62     | `swapped`       | Page is swapped |
/// | 63     | `present`       | Page is present in RAM |
///
/// ### Notes
/// - Since Linux 4.2 the frame field reads as zero unless the reader holds
///   `CAP_SYS_ADMIN`. A present entry with a zero frame is therefore treated
///   as untranslatable, never as physical address `0`.
///
/// ### Example
/// ```rust
/// # use memory_pagemap::PagemapEntry;
/// let e = PagemapEntry::from_bits((1 << 63) | 0x1234);
/// assert!(e.present());
/// assert_eq!(e.frame(), 0x1234);
/// ```
#[bitfield(u64)]
#[derive(PartialEq, Eq)]
pub struct PagemapEntry {
    /// Physical frame number (bits 0..=54), valid when `present` is set.
    #[bits(55)]
    pub frame: u64,

    /// Soft-dirty (bit 55).
    pub soft_dirty: bool,

    /// Exclusively mapped (bit 56).
    pub exclusive: bool,

    /// Write-protected via userfaultfd (bit 57).
    pub uffd_wp: bool,

    /// Bits 58..=60, always zero.
    #[bits(3)]
    __zero: u8,

    /// File-page or shared anonymous (bit 61).
    pub file_shared: bool,

    /// Swapped (bit 62).
    pub swapped: bool,

    /// Present in RAM (bit 63).
    pub present: bool,
}

impl PagemapEntry {
    /// The frame number of a resident page, or the reason there is none.
    ///
    /// `address` only annotates the error.
    ///
    /// # Errors
    /// - [`TranslationError::PageSwapped`] if the page lives in swap.
    /// - [`TranslationError::PageNotResident`] if the page is not present or
    ///   its frame number is hidden from this reader.
    pub fn resident_frame(self, address: VirtualAddress) -> Result<u64, TranslationError> {
        if self.swapped() {
            return Err(TranslationError::PageSwapped { address });
        }

        if !self.present() || self.frame() == 0 {
            return Err(TranslationError::PageNotResident { address });
        }

        Ok(self.frame())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_matches_kernel_abi() {
        let e = PagemapEntry::new()
            .with_frame(FRAME_MASK)
            .with_present(true);
        assert_eq!(e.into_bits(), (1 << 63) | FRAME_MASK);

        let e = PagemapEntry::from_bits(1 << 62);
        assert!(e.swapped());
        assert!(!e.present());

        let e = PagemapEntry::from_bits((1 << 61) | (1 << 55));
        assert!(e.file_shared());
        assert!(e.soft_dirty());
        assert_eq!(e.frame(), 0);
    }

    #[test]
    fn resident_frame_classification() {
        let va = VirtualAddress::new(0x1000);

        let ok = PagemapEntry::new().with_present(true).with_frame(7);
        assert_eq!(ok.resident_frame(va).unwrap(), 7);

        let absent = PagemapEntry::new();
        assert!(matches!(
            absent.resident_frame(va),
            Err(TranslationError::PageNotResident { .. })
        ));

        let hidden = PagemapEntry::new().with_present(true);
        assert!(matches!(
            hidden.resident_frame(va),
            Err(TranslationError::PageNotResident { .. })
        ));

        let swapped = PagemapEntry::new().with_swapped(true).with_frame(3);
        assert!(matches!(
            swapped.resident_frame(va),
            Err(TranslationError::PageSwapped { .. })
        ));
    }
}
