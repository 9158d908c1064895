//! # Pinned Huge-Page DMA Memory
//!
//! Allocates memory a PCIe device can read and write directly: backed by huge
//! pages from a hugetlbfs mount, locked in RAM, and, where requested,
//! physically contiguous with a known physical base address.
//!
//! ## Allocation
//!
//! 1. The requested size is rounded up to whole huge pages.
//! 2. A uniquely named file is created exclusively on the hugetlbfs mount
//!    (`<mount>/<prefix>-<pid>-<id>`) and sized.
//! 3. The file is mapped shared and locked with `mlock(2)`.
//! 4. The file name is unlinked; the mapping alone keeps the pages alive.
//! 5. For contiguous requests the physical base is resolved through
//!    [`memory_pagemap`].
//!
//! A failure at any step releases everything acquired before it. A contiguous
//! request may not exceed one huge page, since only memory inside a single
//! huge page is guaranteed to be physically contiguous.
//!
//! ## Example
//! ```rust,no_run
//! use memory_dma::{DmaAllocator, DmaConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let allocator = DmaAllocator::new(DmaConfig::discover()?);
//! let mut ring = allocator.allocate(4096, true)?;
//! let physical = ring.physical_base().ok_or("no physical base")?;
//! println!("descriptor ring at {} (device sees {physical})", ring.virtual_base());
//! ring.as_mut_slice().fill(0);
//! ring.release()?;
//! # Ok(())
//! # }
//! ```

mod allocator;
mod config;
mod error;
mod guard;
mod id;
mod mapping;
mod region;

pub use allocator::DmaAllocator;
pub use config::{
    DEFAULT_MAX_NAME_ATTEMPTS, DEFAULT_MOUNT, DEFAULT_PREFIX, DmaConfig, HugetlbfsMount,
    hugetlbfs_mounts, parse_mounts, parse_size,
};
pub use error::{AllocationError, AllocationStage};
pub use id::{BackingIdGenerator, CounterIdGenerator, RandomIdGenerator};
pub use mapping::{LinuxMapping, MappingOps};
pub use region::DmaRegion;

pub use memory_addresses::{PhysicalAddress, VirtualAddress};
pub use memory_pagemap::{PageTranslator, TranslationError};
