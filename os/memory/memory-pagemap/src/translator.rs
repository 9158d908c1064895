//! Reading `/proc/<pid>/pagemap`.

use crate::entry::PagemapEntry;
use crate::{PROC_SELF_PAGEMAP, TranslationError, base_page_size};
use log::trace;
use memory_addresses::{PhysicalAddress, VirtualAddress};
use std::fs::File;
use std::io;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

/// Width of one pagemap record in bytes.
pub const ENTRY_SIZE: u64 = size_of::<u64>() as u64;

/// Virtual-to-physical translation for the calling process.
///
/// This is the seam consumed by the DMA allocator; tests substitute their own
/// implementation.
pub trait PageTranslator {
    /// Granularity of the translation table (the platform **base** page size).
    fn page_size(&self) -> u64;

    /// Translate a single virtual address.
    ///
    /// # Errors
    /// See [`TranslationError`]; a miss is never reported as address `0`.
    fn translate(&self, address: VirtualAddress) -> Result<PhysicalAddress, TranslationError>;

    /// Translate `base` and check that `[base, base + len)` is backed by
    /// consecutive physical frames.
    ///
    /// # Errors
    /// [`TranslationError::NotContiguous`] at the first base page that breaks
    /// the run, or any error [`translate`](Self::translate) produces.
    fn translate_range(
        &self,
        base: VirtualAddress,
        len: u64,
    ) -> Result<PhysicalAddress, TranslationError> {
        let page_size = self.page_size();
        let first = self.translate(base)?;
        let first_offset = base.page_offset(page_size);

        let mut offset = page_size - first_offset;
        while offset < len {
            let address = checked_offset(base, offset)?;
            let expected = first
                .checked_add(offset)
                .ok_or(TranslationError::NotContiguous { address: base, offset })?;
            if self.translate(address)? != expected {
                return Err(TranslationError::NotContiguous { address: base, offset });
            }
            offset += page_size;
        }

        Ok(first)
    }
}

fn checked_offset(base: VirtualAddress, offset: u64) -> Result<VirtualAddress, TranslationError> {
    base.checked_add(offset)
        .ok_or(TranslationError::PageNotResident { address: base })
}

/// An open pagemap file.
///
/// Entries are read with positional reads, so a shared `&Pagemap` can be used
/// from several threads. The file is closed when the value is dropped.
#[derive(Debug)]
pub struct Pagemap {
    file: File,
    path: PathBuf,
    page_size: u64,
}

impl Pagemap {
    /// Open the calling process's own pagemap.
    ///
    /// # Errors
    /// [`TranslationError::TranslationInterfaceUnavailable`] if the file cannot
    /// be opened (not Linux, `/proc` not mounted, or access denied).
    pub fn open_self() -> Result<Self, TranslationError> {
        Self::open(PROC_SELF_PAGEMAP, base_page_size())
    }

    /// Open a pagemap-formatted file at `path` with entries of `page_size` granularity.
    ///
    /// # Errors
    /// [`TranslationError::TranslationInterfaceUnavailable`] if the file cannot be opened.
    pub fn open(path: impl AsRef<Path>, page_size: u64) -> Result<Self, TranslationError> {
        let path = path.as_ref().to_path_buf();
        match File::open(&path) {
            Ok(file) => Ok(Self::from_file(file, path, page_size)),
            Err(source) => Err(TranslationError::TranslationInterfaceUnavailable { path, source }),
        }
    }

    /// Wrap an already open pagemap-formatted file.
    #[must_use]
    pub fn from_file(file: File, path: impl Into<PathBuf>, page_size: u64) -> Self {
        debug_assert!(page_size.is_power_of_two(), "page size must be a power of two");
        Self {
            file,
            path: path.into(),
            page_size,
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the raw record covering `address`.
    ///
    /// # Errors
    /// [`TranslationError::PageNotResident`] if the table has no record for the
    /// page, [`TranslationError::EntryUnreadable`] on any other read failure.
    pub fn entry(&self, address: VirtualAddress) -> Result<PagemapEntry, TranslationError> {
        let mut raw = [0_u64; 1];
        self.read_entries(address, &mut raw)?;
        Ok(PagemapEntry::from_bits(raw[0]))
    }

    fn read_entries(
        &self,
        address: VirtualAddress,
        out: &mut [u64],
    ) -> Result<(), TranslationError> {
        let position = address
            .page_index(self.page_size)
            .checked_mul(ENTRY_SIZE)
            .ok_or(TranslationError::PageNotResident { address })?;

        let mut bytes = vec![0_u8; out.len() * size_of::<u64>()];
        match self.file.read_exact_at(&mut bytes, position) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                return Err(TranslationError::PageNotResident { address });
            }
            Err(source) => return Err(TranslationError::EntryUnreadable { address, source }),
        }

        for (slot, chunk) in out.iter_mut().zip(bytes.chunks_exact(size_of::<u64>())) {
            let mut raw = [0_u8; 8];
            raw.copy_from_slice(chunk);
            *slot = u64::from_le_bytes(raw);
        }

        Ok(())
    }

    fn physical(
        &self,
        address: VirtualAddress,
        frame: u64,
    ) -> Result<PhysicalAddress, TranslationError> {
        PhysicalAddress::from_frame(frame, self.page_size, address.page_offset(self.page_size))
            .ok_or(TranslationError::PageNotResident { address })
    }
}

impl PageTranslator for Pagemap {
    fn page_size(&self) -> u64 {
        self.page_size
    }

    fn translate(&self, address: VirtualAddress) -> Result<PhysicalAddress, TranslationError> {
        let entry = self.entry(address)?;
        let frame = entry.resident_frame(address)?;
        let physical = self.physical(address, frame)?;
        trace!("{address} -> {physical} (frame {frame:#x})");
        Ok(physical)
    }

    /// Reads all records for the range with a single positional read.
    fn translate_range(
        &self,
        base: VirtualAddress,
        len: u64,
    ) -> Result<PhysicalAddress, TranslationError> {
        let span = base.page_offset(self.page_size).saturating_add(len.max(1));
        let count = usize::try_from(span.div_ceil(self.page_size))
            .map_err(|_| TranslationError::PageNotResident { address: base })?;

        let mut raw = vec![0_u64; count];
        self.read_entries(base, &mut raw)?;

        let page = base.align_down_to(self.page_size);
        let mut first_frame = None;
        for (index, bits) in (0_u64..).zip(raw) {
            let address = checked_offset(page, index * self.page_size)?;
            let frame = PagemapEntry::from_bits(bits).resident_frame(address)?;
            match first_frame {
                None => first_frame = Some(frame),
                Some(first) if frame == first + index => {}
                Some(_) => {
                    let offset = index * self.page_size - base.page_offset(self.page_size);
                    return Err(TranslationError::NotContiguous { address: base, offset });
                }
            }
        }

        let frame = first_frame.ok_or(TranslationError::PageNotResident { address: base })?;
        self.physical(base, frame)
    }
}

/// Translator that opens `/proc/self/pagemap` for every lookup.
///
/// Keeps no file descriptor between calls; the file is closed on every exit
/// path, including errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcPagemap {
    page_size: u64,
}

impl ProcPagemap {
    #[must_use]
    pub fn new() -> Self {
        Self {
            page_size: base_page_size(),
        }
    }
}

impl Default for ProcPagemap {
    fn default() -> Self {
        Self::new()
    }
}

impl PageTranslator for ProcPagemap {
    fn page_size(&self) -> u64 {
        self.page_size
    }

    fn translate(&self, address: VirtualAddress) -> Result<PhysicalAddress, TranslationError> {
        Pagemap::open(PROC_SELF_PAGEMAP, self.page_size)?.translate(address)
    }

    fn translate_range(
        &self,
        base: VirtualAddress,
        len: u64,
    ) -> Result<PhysicalAddress, TranslationError> {
        Pagemap::open(PROC_SELF_PAGEMAP, self.page_size)?.translate_range(base, len)
    }
}

impl<T: PageTranslator + ?Sized> PageTranslator for &T {
    fn page_size(&self) -> u64 {
        (**self).page_size()
    }

    fn translate(&self, address: VirtualAddress) -> Result<PhysicalAddress, TranslationError> {
        (**self).translate(address)
    }

    fn translate_range(
        &self,
        base: VirtualAddress,
        len: u64,
    ) -> Result<PhysicalAddress, TranslationError> {
        (**self).translate_range(base, len)
    }
}
