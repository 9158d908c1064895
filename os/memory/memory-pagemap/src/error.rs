use memory_addresses::VirtualAddress;
use std::io;
use std::path::PathBuf;

/// Why a virtual address could not be turned into a physical one.
///
/// A failed translation is always reported here and never as a sentinel
/// physical address.
#[derive(Debug, thiserror::Error)]
pub enum TranslationError {
    #[error("page translation interface {} is unavailable", path.display())]
    TranslationInterfaceUnavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("page containing {address} is not resident")]
    PageNotResident { address: VirtualAddress },
    #[error("page containing {address} is swapped out")]
    PageSwapped { address: VirtualAddress },
    #[error("failed to read the translation entry for {address}")]
    EntryUnreadable {
        address: VirtualAddress,
        #[source]
        source: io::Error,
    },
    #[error("physical frames behind {address} break contiguity at offset {offset:#x}")]
    NotContiguous { address: VirtualAddress, offset: u64 },
}

impl TranslationError {
    /// The virtual address the failure refers to, if any.
    #[must_use]
    pub const fn address(&self) -> Option<VirtualAddress> {
        match self {
            Self::TranslationInterfaceUnavailable { .. } => None,
            Self::PageNotResident { address }
            | Self::PageSwapped { address }
            | Self::EntryUnreadable { address, .. }
            | Self::NotContiguous { address, .. } => Some(*address),
        }
    }
}
