//! # Mapping Primitives
//!
//! The syscalls behind a DMA region: map a backing file shared, lock it in
//! memory, and undo both. [`LinuxMapping`] issues them through `libc`;
//! [`MappingOps`] lets tests substitute their own.

use std::fs::File;
use std::io;
use std::os::fd::AsRawFd;
use std::ptr::{self, NonNull};

/// Map/unmap and pin/unpin operations used by the allocator.
pub trait MappingOps {
    /// Map `len` bytes of `file` shared and read/write.
    ///
    /// `hugetlb` requests `MAP_HUGETLB`.
    ///
    /// # Errors
    /// The OS error of the failed mapping call.
    fn map_shared(&self, file: &File, len: usize, hugetlb: bool) -> io::Result<NonNull<u8>>;

    /// Remove a mapping created by [`map_shared`](Self::map_shared).
    ///
    /// # Errors
    /// The OS error of the failed unmapping call.
    ///
    /// # Safety
    /// `base`/`len` must describe exactly one live mapping from this
    /// implementation, and no references into it may outlive the call.
    unsafe fn unmap(&self, base: NonNull<u8>, len: usize) -> io::Result<()>;

    /// Lock `[base, base + len)` into RAM so it is never paged out.
    ///
    /// # Errors
    /// The OS error of the failed locking call (commonly `EPERM` or `ENOMEM`
    /// from `RLIMIT_MEMLOCK`).
    fn pin(&self, base: NonNull<u8>, len: usize) -> io::Result<()>;

    /// Undo [`pin`](Self::pin).
    ///
    /// # Errors
    /// The OS error of the failed unlocking call.
    fn unpin(&self, base: NonNull<u8>, len: usize) -> io::Result<()>;
}

/// [`MappingOps`] via `mmap(2)`, `munmap(2)`, `mlock(2)` and `munlock(2)`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LinuxMapping;

impl MappingOps for LinuxMapping {
    fn map_shared(&self, file: &File, len: usize, hugetlb: bool) -> io::Result<NonNull<u8>> {
        let mut flags = libc::MAP_SHARED;
        if hugetlb {
            flags |= libc::MAP_HUGETLB;
        }

        // SAFETY: a fresh mapping at a kernel-chosen address; nothing existing is replaced.
        let addr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                flags,
                file.as_raw_fd(),
                0,
            )
        };

        if addr == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }

        NonNull::new(addr.cast::<u8>())
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "mmap returned null"))
    }

    unsafe fn unmap(&self, base: NonNull<u8>, len: usize) -> io::Result<()> {
        // SAFETY: the caller guarantees `base`/`len` is one of our mappings.
        let rc = unsafe { libc::munmap(base.as_ptr().cast(), len) };
        check(rc)
    }

    fn pin(&self, base: NonNull<u8>, len: usize) -> io::Result<()> {
        // SAFETY: mlock only changes residency; invalid ranges yield ENOMEM.
        let rc = unsafe { libc::mlock(base.as_ptr().cast_const().cast(), len) };
        check(rc)
    }

    fn unpin(&self, base: NonNull<u8>, len: usize) -> io::Result<()> {
        // SAFETY: as for `pin`.
        let rc = unsafe { libc::munlock(base.as_ptr().cast_const().cast(), len) };
        check(rc)
    }
}

fn check(rc: libc::c_int) -> io::Result<()> {
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}
