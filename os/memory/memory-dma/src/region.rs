use crate::AllocationError;
use crate::mapping::{LinuxMapping, MappingOps};
use log::{debug, error};
use memory_addresses::{PhysicalAddress, VirtualAddress};
use memory_pagemap::PageTranslator;
use std::fmt;
use std::ptr::NonNull;

/// A pinned, huge-page backed memory region usable for DMA.
///
/// The backing file has no directory entry any more; the mapping held here is
/// the only reference to the memory. [`release`](Self::release) (or dropping
/// the region) unpins and unmaps it.
///
/// ### Invariants
/// - `size()` is a positive multiple of the allocation unit.
/// - `virtual_base()` is non-null and aligned to the allocation unit.
/// - `physical_base()` is `Some` only for regions whose physical contiguity
///   is known: contiguous requests, and regions of exactly one unit.
pub struct DmaRegion<M: MappingOps = LinuxMapping> {
    base: NonNull<u8>,
    len: usize,
    physical_base: Option<PhysicalAddress>,
    contiguous: bool,
    released: bool,
    ops: M,
}

// SAFETY: the region exclusively owns its mapping; the raw pointer is never
// shared with other owners. Concurrent access goes through `&self`/`&mut self`.
unsafe impl<M: MappingOps + Send> Send for DmaRegion<M> {}
// SAFETY: `&DmaRegion` only permits reads of the mapped bytes.
unsafe impl<M: MappingOps + Sync> Sync for DmaRegion<M> {}

impl<M: MappingOps> DmaRegion<M> {
    /// Take ownership of a pinned mapping.
    ///
    /// # Safety
    /// `base`/`len` must be a live, pinned mapping created through `ops` and
    /// owned by nobody else.
    pub(crate) const unsafe fn from_raw(
        base: NonNull<u8>,
        len: usize,
        physical_base: Option<PhysicalAddress>,
        contiguous: bool,
        ops: M,
    ) -> Self {
        Self {
            base,
            len,
            physical_base,
            contiguous,
            released: false,
            ops,
        }
    }

    #[must_use]
    pub fn virtual_base(&self) -> VirtualAddress {
        VirtualAddress::from_nonnull(self.base)
    }

    /// The device-usable base address, if known. See the type-level docs.
    #[must_use]
    pub const fn physical_base(&self) -> Option<PhysicalAddress> {
        self.physical_base
    }

    /// Length in bytes, a multiple of the allocation unit.
    #[must_use]
    pub const fn size(&self) -> u64 {
        self.len as u64
    }

    /// Whether physical contiguity was requested and confirmed.
    #[must_use]
    pub const fn is_contiguous(&self) -> bool {
        self.contiguous
    }

    #[must_use]
    pub const fn is_released(&self) -> bool {
        self.released
    }

    #[must_use]
    pub const fn as_ptr(&self) -> *const u8 {
        self.base.as_ptr().cast_const()
    }

    #[must_use]
    pub const fn as_mut_ptr(&mut self) -> *mut u8 {
        self.base.as_ptr()
    }

    /// The mapped bytes; empty once released.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        if self.released {
            return &[];
        }

        // SAFETY: the mapping is live, `len` bytes long and owned by `self`.
        unsafe { std::slice::from_raw_parts(self.base.as_ptr(), self.len) }
    }

    /// The mapped bytes; empty once released.
    #[must_use]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        if self.released {
            return &mut [];
        }

        // SAFETY: as above, and `&mut self` guarantees exclusive access.
        unsafe { std::slice::from_raw_parts_mut(self.base.as_ptr(), self.len) }
    }

    /// Virtual address of the byte at `offset`, if inside the live region.
    #[must_use]
    pub fn virtual_at(&self, offset: u64) -> Option<VirtualAddress> {
        if self.released || offset >= self.size() {
            return None;
        }
        self.virtual_base().checked_add(offset)
    }

    /// Physical address of the byte at `offset` for regions with a known
    /// physical base.
    #[must_use]
    pub fn physical_at(&self, offset: u64) -> Option<PhysicalAddress> {
        if self.released || offset >= self.size() {
            return None;
        }
        self.physical_base?.checked_add(offset)
    }

    /// Resolve the byte at `offset` through `translator`.
    ///
    /// Works for every region, including multi-unit regions without a known
    /// physical base; each allocation unit is contiguous on its own.
    ///
    /// # Errors
    /// [`AllocationError::OutOfBounds`] for offsets outside the live region,
    /// [`AllocationError::Translation`] if the lookup fails.
    pub fn resolve<T: PageTranslator>(
        &self,
        offset: u64,
        translator: &T,
    ) -> Result<PhysicalAddress, AllocationError> {
        let address = self.virtual_at(offset).ok_or(AllocationError::OutOfBounds {
            offset,
            size: self.size(),
        })?;

        translator
            .translate(address)
            .map_err(|source| AllocationError::Translation {
                size: self.size(),
                source,
            })
    }

    /// Unpin and unmap the region.
    ///
    /// Releasing an already released region does nothing and succeeds. Both
    /// steps are always attempted; the region counts as released afterwards
    /// even if one of them failed.
    ///
    /// # Errors
    /// [`AllocationError::ReleaseFailed`] naming the first step that failed.
    pub fn release(&mut self) -> Result<(), AllocationError> {
        if self.released {
            return Ok(());
        }
        self.released = true;

        debug!("releasing {} bytes at {}", self.len, self.virtual_base());
        let unpinned = self.ops.unpin(self.base, self.len);

        // SAFETY: the mapping came from `ops`, is owned by `self`, and every
        // accessor returns nothing once `released` is set.
        let unmapped = unsafe { self.ops.unmap(self.base, self.len) };

        match (unpinned, unmapped) {
            (Ok(()), Ok(())) => Ok(()),
            (Err(source), _) => Err(AllocationError::ReleaseFailed {
                step: "munlock",
                source,
            }),
            (Ok(()), Err(source)) => Err(AllocationError::ReleaseFailed {
                step: "munmap",
                source,
            }),
        }
    }
}

impl<M: MappingOps> Drop for DmaRegion<M> {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            error!("failed to release DMA region: {e}");
        }
    }
}

impl<M: MappingOps> fmt::Debug for DmaRegion<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DmaRegion")
            .field("virtual_base", &self.virtual_base())
            .field("physical_base", &self.physical_base)
            .field("size", &self.len)
            .field("contiguous", &self.contiguous)
            .field("released", &self.released)
            .finish_non_exhaustive()
    }
}
