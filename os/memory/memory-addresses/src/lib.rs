//! # Virtual and Physical Memory Address Types
//!
//! Strongly typed wrappers for the addresses a userspace DMA driver juggles.
//!
//! ## Overview
//!
//! A driver holds two kinds of address for every DMA buffer: the **virtual**
//! address it reads and writes through, and the **physical** address it writes
//! into a device's descriptor ring. Mixing them up corrupts memory or hangs the
//! device, so they get distinct types that stay zero-cost wrappers around
//! `u64` values:
//!
//! | Type | Meaning |
//! |----------|----------|
//! | [`MemoryAddress`] | A raw 64-bit address, either physical or virtual. |
//! | [`VirtualAddress`] | An address in the calling process (CPU side). |
//! | [`PhysicalAddress`] | A bus/physical address (device side). |
//!
//! ## Page Sizes
//!
//! Marker types implementing [`PageSize`] name the well-known sizes:
//!
//! - [`Size4K`]: 4 KiB pages (base granularity)
//! - [`Size2M`]: 2 MiB huge pages, the default hugetlbfs page size
//!
//! The platform base page size is a runtime property (`sysconf`), so the
//! `*_to` / `page_index` / `page_offset` helpers take a runtime size as well.
//!
//! ## Typical Usage
//!
//! ```rust
//! # use memory_addresses::*;
//! // Round a buffer request to whole huge pages
//! assert_eq!(round_up_to(1, Size2M::SIZE), Some(Size2M::SIZE));
//! assert_eq!(round_up_to(3 * Size2M::SIZE, Size2M::SIZE), Some(3 * Size2M::SIZE));
//!
//! // Rebuild a physical address from a frame number
//! let va = VirtualAddress::new(0x7F12_3456_7ABC);
//! let pa = PhysicalAddress::from_frame(0x42, 4096, va.page_offset(4096)).unwrap();
//! assert_eq!(pa.as_u64(), 0x42_ABC);
//! ```

mod memory_address;
mod page_size;
mod physical_address;
mod virtual_address;

pub use memory_address::MemoryAddress;
pub use page_size::{PageSize, Size2M, Size4K, round_up_to};
pub use physical_address::PhysicalAddress;
pub use virtual_address::VirtualAddress;
