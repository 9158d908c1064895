use memory_pagemap::TranslationError;
use std::fmt;
use std::io;
use std::path::PathBuf;

/// How far an allocation got.
///
/// Every attempt walks these stages in order and ends in either
/// [`Ready`](Self::Ready) or [`TornDown`](Self::TornDown).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum AllocationStage {
    /// Rounding and validating the requested size.
    Sizing,
    /// A candidate backing name exists.
    NameGenerated,
    /// The backing file was created exclusively.
    Created,
    /// The backing file has its final length.
    Sized,
    /// The backing file is mapped.
    Mapped,
    /// The mapping is locked in memory.
    Pinned,
    /// The backing file's directory entry is gone.
    NameUnlinked,
    /// The region was handed to the caller.
    Ready,
    /// Everything acquired so far was released again.
    TornDown,
}

impl fmt::Display for AllocationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Sizing => "sizing",
            Self::NameGenerated => "name generated",
            Self::Created => "created",
            Self::Sized => "sized",
            Self::Mapped => "mapped",
            Self::Pinned => "pinned",
            Self::NameUnlinked => "name unlinked",
            Self::Ready => "ready",
            Self::TornDown => "torn down",
        })
    }
}

/// Why [`DmaAllocator::allocate`](crate::DmaAllocator::allocate) failed.
///
/// Variants raised after a resource was acquired are only returned once all
/// of those resources have been released again.
#[derive(Debug, thiserror::Error)]
pub enum AllocationError {
    #[error("invalid allocation size {requested}")]
    InvalidSize { requested: u64 },
    #[error("{size} bytes (requested {requested}) exceed the contiguous limit of {limit} bytes")]
    ContiguityViolation { requested: u64, size: u64, limit: u64 },
    #[error("no unique backing name after {attempts} attempts (last tried {})", last.display())]
    NameCollisionExhausted { attempts: u32, last: PathBuf },
    #[error("huge page backing store unavailable at {}", path.display())]
    BackingStoreUnavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to size {} to {size} bytes", path.display())]
    SizingFailed {
        path: PathBuf,
        size: u64,
        #[source]
        source: io::Error,
    },
    #[error("failed to map {size} bytes of {}", path.display())]
    MappingFailed {
        path: PathBuf,
        size: u64,
        #[source]
        source: io::Error,
    },
    #[error("failed to pin {size} bytes")]
    PinningFailed {
        size: u64,
        #[source]
        source: io::Error,
    },
    #[error("failed to unlink {}", path.display())]
    UnlinkFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to resolve the physical base of {size} bytes")]
    Translation {
        size: u64,
        #[source]
        source: TranslationError,
    },
    #[error("offset {offset:#x} is outside of a {size} byte region")]
    OutOfBounds { offset: u64, size: u64 },
    #[error("failed to release region: {step}")]
    ReleaseFailed {
        step: &'static str,
        #[source]
        source: io::Error,
    },
}

impl AllocationError {
    /// The last stage reached before the failure.
    ///
    /// Failures after [`AllocationStage::Created`] imply the attempt ended in
    /// [`AllocationStage::TornDown`].
    #[must_use]
    pub const fn stage(&self) -> AllocationStage {
        match self {
            Self::InvalidSize { .. } | Self::ContiguityViolation { .. } => AllocationStage::Sizing,
            Self::NameCollisionExhausted { .. } | Self::BackingStoreUnavailable { .. } => {
                AllocationStage::NameGenerated
            }
            Self::SizingFailed { .. } => AllocationStage::Created,
            Self::MappingFailed { .. } => AllocationStage::Sized,
            Self::PinningFailed { .. } => AllocationStage::Mapped,
            Self::UnlinkFailed { .. } => AllocationStage::Pinned,
            Self::Translation { .. } => AllocationStage::NameUnlinked,
            Self::OutOfBounds { .. } | Self::ReleaseFailed { .. } => AllocationStage::Ready,
        }
    }

    /// Whether the failure happened before any resource was touched.
    #[must_use]
    pub const fn is_pre_acquisition(&self) -> bool {
        matches!(self.stage(), AllocationStage::Sizing | AllocationStage::NameGenerated)
    }
}
