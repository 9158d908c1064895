//! # Virtual-to-Physical Address Resolution
//!
//! Resolves virtual addresses of the calling process to physical addresses by
//! reading the kernel's per-process translation table, `/proc/self/pagemap`.
//!
//! ## How it works
//!
//! The pagemap file holds one little-endian 64-bit [`PagemapEntry`] per
//! **base page** of the virtual address space. For an address `va`:
//!
//! ```text
//! index    = va / base_page_size
//! entry    = pagemap[index * 8 .. index * 8 + 8]
//! physical = entry.frame * base_page_size + va % base_page_size
//! ```
//!
//! The base page size is used even for addresses inside huge-page mappings;
//! the kernel reports huge pages as runs of consecutive base-page frames.
//!
//! ## Failure reporting
//!
//! Every miss is an explicit [`TranslationError`]:
//!
//! | Condition | Error |
//! |-----------|-------|
//! | pagemap cannot be opened | [`TranslationError::TranslationInterfaceUnavailable`] |
//! | page not present, or frame hidden (no `CAP_SYS_ADMIN`) | [`TranslationError::PageNotResident`] |
//! | page swapped out | [`TranslationError::PageSwapped`] |
//!
//! ## Example
//! ```rust,no_run
//! use memory_addresses::VirtualAddress;
//! use memory_pagemap::{PageTranslator, ProcPagemap};
//!
//! let buffer = vec![0_u8; 4096];
//! let va = VirtualAddress::from_ptr(buffer.as_ptr());
//! match ProcPagemap::new().translate(va) {
//!     Ok(pa) => println!("{va} -> {pa}"),
//!     Err(e) => eprintln!("cannot translate {va}: {e}"),
//! }
//! ```

mod entry;
mod error;
mod translator;

pub use entry::{FRAME_MASK, PagemapEntry};
pub use error::TranslationError;
pub use translator::{ENTRY_SIZE, PageTranslator, Pagemap, ProcPagemap};

use memory_addresses::{PageSize, PhysicalAddress, Size4K, VirtualAddress};

/// The calling process's translation table.
pub const PROC_SELF_PAGEMAP: &str = "/proc/self/pagemap";

/// The platform base page size as reported by `sysconf(_SC_PAGESIZE)`.
///
/// Falls back to 4 KiB if the value is unavailable or not a power of two.
#[must_use]
pub fn base_page_size() -> u64 {
    // SAFETY: sysconf has no preconditions.
    let raw = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    u64::try_from(raw)
        .ok()
        .filter(|size| size.is_power_of_two())
        .unwrap_or(Size4K::SIZE)
}

/// Translate `address` through `/proc/self/pagemap`.
///
/// # Errors
/// See [`TranslationError`].
pub fn translate(address: VirtualAddress) -> Result<PhysicalAddress, TranslationError> {
    ProcPagemap::new().translate(address)
}
