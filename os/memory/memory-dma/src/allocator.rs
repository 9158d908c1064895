//! # DMA Allocator
//!
//! Builds a [`DmaRegion`] in the following stages, each backed by a guard
//! that undoes it if a later stage fails:
//!
//! ```text
//! Sizing → NameGenerated → Created → Sized → Mapped → Pinned → NameUnlinked → Ready
//!                              └────────┴────────┴────────┴──────────┴──────→ TornDown
//! ```

use crate::config::DmaConfig;
use crate::error::{AllocationError, AllocationStage};
use crate::guard::{BackingFile, MappedRegion, PinnedRegion};
use crate::id::{BackingIdGenerator, RandomIdGenerator};
use crate::mapping::{LinuxMapping, MappingOps};
use crate::region::DmaRegion;
use log::{debug, info, warn};
use memory_addresses::{PhysicalAddress, VirtualAddress, round_up_to};
use memory_pagemap::{PageTranslator, ProcPagemap};
use std::io;

/// Allocator for pinned, huge-page backed DMA regions.
///
/// Holds no state between calls besides its collaborators; a shared
/// `&DmaAllocator` may be used from several threads when they allow it.
#[derive(Debug)]
pub struct DmaAllocator<G = RandomIdGenerator, M = LinuxMapping, T = ProcPagemap> {
    config: DmaConfig,
    ids: G,
    ops: M,
    translator: T,
}

impl DmaAllocator {
    /// An allocator using random backing names, `libc` mappings and
    /// `/proc/self/pagemap`.
    #[must_use]
    pub fn new(config: DmaConfig) -> Self {
        Self::with_parts(config, RandomIdGenerator, LinuxMapping, ProcPagemap::new())
    }
}

impl<G, M, T> DmaAllocator<G, M, T>
where
    G: BackingIdGenerator,
    M: MappingOps + Clone,
    T: PageTranslator,
{
    #[must_use]
    pub fn with_parts(config: DmaConfig, ids: G, ops: M, translator: T) -> Self {
        Self {
            config,
            ids,
            ops,
            translator,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &DmaConfig {
        &self.config
    }

    #[must_use]
    pub const fn translator(&self) -> &T {
        &self.translator
    }

    /// Allocate a pinned region of at least `requested_size` bytes.
    ///
    /// The size is rounded up to whole allocation units. With
    /// `require_contiguous`, the rounded size may not exceed one unit, and the
    /// region's physical base is resolved and returned.
    ///
    /// # Errors
    /// See [`AllocationError`]. Requests that are invalid or violate the
    /// contiguity limit fail before any resource is touched; every later
    /// failure releases everything acquired so far before returning.
    pub fn allocate(
        &self,
        requested_size: u64,
        require_contiguous: bool,
    ) -> Result<DmaRegion<M>, AllocationError> {
        self.acquire(requested_size, require_contiguous)
            .inspect_err(|e| {
                if !e.is_pre_acquisition() {
                    debug!("{}: {e}", AllocationStage::TornDown);
                }
            })
    }

    /// All guards of a failed attempt are dropped before this returns.
    fn acquire(
        &self,
        requested_size: u64,
        require_contiguous: bool,
    ) -> Result<DmaRegion<M>, AllocationError> {
        let unit = self.config.huge_page_size();

        debug!(
            "{}: {requested_size} bytes, contiguous={require_contiguous}",
            AllocationStage::Sizing
        );
        let size = round_up_to(requested_size, unit)
            .filter(|&size| size > 0)
            .ok_or(AllocationError::InvalidSize {
                requested: requested_size,
            })?;

        if require_contiguous && size > unit {
            return Err(AllocationError::ContiguityViolation {
                requested: requested_size,
                size,
                limit: unit,
            });
        }

        let len = usize::try_from(size).map_err(|_| AllocationError::InvalidSize {
            requested: requested_size,
        })?;

        let mut backing = self.create_backing()?;

        backing
            .set_len(size)
            .map_err(|source| AllocationError::SizingFailed {
                path: backing.path().to_path_buf(),
                size,
                source,
            })?;
        debug!("{}: {} is {size} bytes", AllocationStage::Sized, backing.path().display());

        let hugetlb = self.config.map_hugetlb();
        let mapping = MappedRegion::map(&self.ops, backing.file(), len, hugetlb).map_err(
            |source| AllocationError::MappingFailed {
                path: backing.path().to_path_buf(),
                size,
                source,
            },
        )?;

        let virtual_base = VirtualAddress::from_nonnull(mapping.base());
        if !virtual_base.is_aligned_to(unit) {
            return Err(AllocationError::MappingFailed {
                path: backing.path().to_path_buf(),
                size,
                source: io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("mapping at {virtual_base} is not aligned to {unit:#x} bytes"),
                ),
            });
        }
        debug!("{}: {size} bytes at {virtual_base}", AllocationStage::Mapped);

        let pinned = PinnedRegion::pin(mapping)
            .map_err(|source| AllocationError::PinningFailed { size, source })?;
        debug!("{}: {size} bytes at {virtual_base}", AllocationStage::Pinned);

        backing
            .unlink()
            .map_err(|source| AllocationError::UnlinkFailed {
                path: backing.path().to_path_buf(),
                source,
            })?;
        debug!("{}: {}", AllocationStage::NameUnlinked, backing.path().display());
        drop(backing);

        let physical_base = if require_contiguous {
            Some(self.resolve_base(virtual_base, size)?)
        } else if size == unit {
            match self.resolve_base(virtual_base, size) {
                Ok(base) => Some(base),
                Err(e) => {
                    warn!("physical base of {virtual_base} unavailable: {e}");
                    None
                }
            }
        } else {
            None
        };

        let (base, len) = pinned.into_raw();

        let ready = AllocationStage::Ready;
        match physical_base {
            Some(pa) => info!("{ready}: {size} bytes at {virtual_base} (physical {pa})"),
            None => info!("{ready}: {size} bytes at {virtual_base}"),
        }

        // SAFETY: `into_raw` disarmed the guards; the region is the sole owner now.
        Ok(unsafe {
            DmaRegion::from_raw(base, len, physical_base, require_contiguous, self.ops.clone())
        })
    }

    /// Create a backing file under a fresh name, retrying on collisions.
    ///
    /// Names carry the pid of the calling process at the time of the call.
    fn create_backing(&self) -> Result<BackingFile, AllocationError> {
        let pid = std::process::id();
        let attempts = self.config.max_name_attempts();
        let mut last = self.config.backing_path(pid, self.ids.next_id());

        for attempt in 1..=attempts {
            debug!("{}: {}", AllocationStage::NameGenerated, last.display());
            match BackingFile::create_exclusive(last.clone()) {
                Ok(backing) => {
                    debug!("{}: {}", AllocationStage::Created, backing.path().display());
                    return Ok(backing);
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    warn!(
                        "backing name {} taken (attempt {attempt}/{attempts})",
                        last.display()
                    );
                    if attempt < attempts {
                        last = self.config.backing_path(pid, self.ids.next_id());
                    }
                }
                Err(source) => {
                    return Err(AllocationError::BackingStoreUnavailable { path: last, source });
                }
            }
        }

        Err(AllocationError::NameCollisionExhausted { attempts, last })
    }

    fn resolve_base(
        &self,
        virtual_base: VirtualAddress,
        size: u64,
    ) -> Result<PhysicalAddress, AllocationError> {
        let resolved = if self.config.verify_contiguity() {
            self.translator.translate_range(virtual_base, size)
        } else {
            self.translator.translate(virtual_base)
        };

        resolved.map_err(|source| AllocationError::Translation { size, source })
    }
}
