//! Per-resource guards for an in-flight allocation.
//!
//! Each guard owns exactly one acquired resource and releases it on drop
//! unless construction disarms it. Dropping the guards of a failed attempt in
//! reverse acquisition order is the whole teardown path.

use crate::mapping::MappingOps;
use log::{debug, warn};
use std::fs::{self, File, OpenOptions};
use std::io;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;

/// An exclusively created backing file and its directory entry.
///
/// Drop closes the file and removes the entry if it is still linked.
#[derive(Debug)]
pub struct BackingFile {
    file: File,
    path: PathBuf,
    linked: bool,
}

impl BackingFile {
    /// Create `path` with `O_CREAT | O_EXCL`, owner-only permissions.
    ///
    /// # Errors
    /// [`io::ErrorKind::AlreadyExists`] on a name collision, otherwise the
    /// error of the failed `open(2)`.
    pub fn create_exclusive(path: PathBuf) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .mode(0o700)
            .open(&path)?;
        Ok(Self {
            file,
            path,
            linked: true,
        })
    }

    #[must_use]
    pub const fn file(&self) -> &File {
        &self.file
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Set the file length (`ftruncate(2)`).
    ///
    /// # Errors
    /// The error of the failed call, e.g. when the huge page pool is empty.
    pub fn set_len(&self, size: u64) -> io::Result<()> {
        self.file.set_len(size)
    }

    /// Remove the directory entry; the open file and any mapping stay valid.
    ///
    /// # Errors
    /// The error of the failed `unlink(2)`.
    pub fn unlink(&mut self) -> io::Result<()> {
        fs::remove_file(&self.path)?;
        self.linked = false;
        Ok(())
    }
}

impl Drop for BackingFile {
    fn drop(&mut self) {
        if !self.linked {
            return;
        }

        debug!("removing backing file {}", self.path.display());
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("failed to remove backing file {}: {e}", self.path.display());
        }
    }
}

/// A live shared mapping; unmapped on drop while armed.
pub struct MappedRegion<'a, M: MappingOps> {
    ops: &'a M,
    base: NonNull<u8>,
    len: usize,
    armed: bool,
}

impl<'a, M: MappingOps> MappedRegion<'a, M> {
    /// # Errors
    /// The error reported by [`MappingOps::map_shared`].
    pub fn map(ops: &'a M, file: &File, len: usize, hugetlb: bool) -> io::Result<Self> {
        let base = ops.map_shared(file, len, hugetlb)?;
        Ok(Self {
            ops,
            base,
            len,
            armed: true,
        })
    }

    #[must_use]
    pub const fn base(&self) -> NonNull<u8> {
        self.base
    }
}

impl<M: MappingOps> Drop for MappedRegion<'_, M> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        debug!("unmapping {} bytes at {:p}", self.len, self.base);
        // SAFETY: `base`/`len` came from `map_shared` and were never handed out.
        if let Err(e) = unsafe { self.ops.unmap(self.base, self.len) } {
            warn!("failed to unmap {} bytes at {:p}: {e}", self.len, self.base);
        }
    }
}

/// A mapping that is also locked in memory; unpinned, then unmapped, on drop
/// while armed.
pub struct PinnedRegion<'a, M: MappingOps> {
    mapping: MappedRegion<'a, M>,
    armed: bool,
}

impl<'a, M: MappingOps> PinnedRegion<'a, M> {
    /// Pin `mapping`. On failure the mapping is dropped, and thereby unmapped,
    /// before the error is returned.
    ///
    /// # Errors
    /// The error reported by [`MappingOps::pin`].
    pub fn pin(mapping: MappedRegion<'a, M>) -> io::Result<Self> {
        mapping.ops.pin(mapping.base, mapping.len)?;
        Ok(Self {
            mapping,
            armed: true,
        })
    }

    /// Disarm all guards and hand out the raw mapping.
    #[must_use]
    pub fn into_raw(mut self) -> (NonNull<u8>, usize) {
        self.armed = false;
        self.mapping.armed = false;
        (self.mapping.base, self.mapping.len)
    }
}

impl<M: MappingOps> Drop for PinnedRegion<'_, M> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        let MappedRegion { ops, base, len, .. } = &self.mapping;
        debug!("unpinning {len} bytes at {base:p}");
        if let Err(e) = ops.unpin(*base, *len) {
            warn!("failed to unpin {len} bytes at {base:p}: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};

    /// Records calls without touching memory.
    #[derive(Default)]
    struct Recorder {
        calls: RefCell<Vec<&'static str>>,
        fail_pin: Cell<bool>,
    }

    impl MappingOps for Recorder {
        fn map_shared(&self, _file: &File, _len: usize, _hugetlb: bool) -> io::Result<NonNull<u8>> {
            self.calls.borrow_mut().push("map");
            Ok(NonNull::dangling())
        }

        unsafe fn unmap(&self, _base: NonNull<u8>, _len: usize) -> io::Result<()> {
            self.calls.borrow_mut().push("unmap");
            Ok(())
        }

        fn pin(&self, _base: NonNull<u8>, _len: usize) -> io::Result<()> {
            self.calls.borrow_mut().push("pin");
            if self.fail_pin.get() {
                return Err(io::Error::from_raw_os_error(libc::EPERM));
            }
            Ok(())
        }

        fn unpin(&self, _base: NonNull<u8>, _len: usize) -> io::Result<()> {
            self.calls.borrow_mut().push("unpin");
            Ok(())
        }
    }

    fn backing(dir: &tempfile::TempDir) -> BackingFile {
        BackingFile::create_exclusive(dir.path().join("region")).unwrap()
    }

    #[test]
    fn backing_file_is_exclusive() {
        let dir = tempfile::tempdir().unwrap();
        let _first = backing(&dir);
        let err = BackingFile::create_exclusive(dir.path().join("region")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
    }

    #[test]
    fn linked_backing_file_is_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let file = backing(&dir);
        let path = file.path().to_path_buf();
        assert!(path.exists());
        drop(file);
        assert!(!path.exists());
    }

    #[test]
    fn unlinked_backing_file_keeps_its_handle() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = backing(&dir);
        file.set_len(8192).unwrap();
        file.unlink().unwrap();
        assert!(!file.path().exists());
        assert_eq!(file.file().metadata().unwrap().len(), 8192);
    }

    #[test]
    fn dropped_pin_unpins_then_unmaps() {
        let dir = tempfile::tempdir().unwrap();
        let file = backing(&dir);
        let ops = Recorder::default();

        let mapping = MappedRegion::map(&ops, file.file(), 4096, false).unwrap();
        let pinned = PinnedRegion::pin(mapping).unwrap();
        drop(pinned);

        assert_eq!(*ops.calls.borrow(), ["map", "pin", "unpin", "unmap"]);
    }

    #[test]
    fn failed_pin_unmaps() {
        let dir = tempfile::tempdir().unwrap();
        let file = backing(&dir);
        let ops = Recorder::default();
        ops.fail_pin.set(true);

        let mapping = MappedRegion::map(&ops, file.file(), 4096, false).unwrap();
        assert!(PinnedRegion::pin(mapping).is_err());

        assert_eq!(*ops.calls.borrow(), ["map", "pin", "unmap"]);
    }

    #[test]
    fn into_raw_disarms_everything() {
        let dir = tempfile::tempdir().unwrap();
        let file = backing(&dir);
        let ops = Recorder::default();

        let mapping = MappedRegion::map(&ops, file.file(), 4096, false).unwrap();
        let (base, len) = PinnedRegion::pin(mapping).unwrap().into_raw();

        assert_eq!(base, NonNull::dangling());
        assert_eq!(len, 4096);
        assert_eq!(*ops.calls.borrow(), ["map", "pin"]);
    }
}
