//! # Allocator Configuration
//!
//! Where backing objects live and how they are named and mapped.

use memory_addresses::{PageSize, Size2M, Size4K};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Conventional hugetlbfs mount point.
pub const DEFAULT_MOUNT: &str = "/mnt/huge";

/// Backing file name prefix.
pub const DEFAULT_PREFIX: &str = "ixy";

/// Bounded retries when a generated backing name already exists.
pub const DEFAULT_MAX_NAME_ATTEMPTS: u32 = 16;

/// Settings for a [`DmaAllocator`](crate::DmaAllocator).
///
/// ### Example
/// ```rust
/// # use memory_dma::DmaConfig;
/// let config = DmaConfig::default()
///     .with_mount("/dev/hugepages")
///     .with_prefix("nic0");
/// assert_eq!(
///     config.backing_path(42, 0xAB).to_str(),
///     Some("/dev/hugepages/nic0-42-00000000000000ab")
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DmaConfig {
    mount: PathBuf,
    prefix: String,
    huge_page_size: u64,
    max_name_attempts: u32,
    map_hugetlb: bool,
    verify_contiguity: bool,
}

impl Default for DmaConfig {
    fn default() -> Self {
        Self {
            mount: PathBuf::from(DEFAULT_MOUNT),
            prefix: String::from(DEFAULT_PREFIX),
            huge_page_size: Size2M::SIZE,
            max_name_attempts: DEFAULT_MAX_NAME_ATTEMPTS,
            map_hugetlb: true,
            verify_contiguity: true,
        }
    }
}

impl DmaConfig {
    /// Default settings pointed at the first hugetlbfs mount in `/proc/mounts`.
    ///
    /// The mount's `pagesize=` option, if present, becomes the allocation unit.
    ///
    /// # Errors
    /// Fails if `/proc/mounts` cannot be read, or with
    /// [`io::ErrorKind::NotFound`] if no hugetlbfs is mounted.
    pub fn discover() -> io::Result<Self> {
        let mount = hugetlbfs_mounts()?.into_iter().next().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, "no hugetlbfs mount in /proc/mounts")
        })?;
        Ok(Self::from_mount(&mount))
    }

    /// Default settings for a specific hugetlbfs mount.
    #[must_use]
    pub fn from_mount(mount: &HugetlbfsMount) -> Self {
        let config = Self::default().with_mount(&mount.path);
        match mount.page_size {
            Some(size) if size.is_power_of_two() && size >= Size4K::SIZE => {
                config.with_huge_page_size(size)
            }
            _ => config,
        }
    }

    #[must_use]
    pub fn with_mount(mut self, mount: impl Into<PathBuf>) -> Self {
        self.mount = mount.into();
        self
    }

    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Set the allocation unit.
    ///
    /// # Panics
    /// If `size` is not a power of two of at least 4 KiB.
    #[must_use]
    pub fn with_huge_page_size(mut self, size: u64) -> Self {
        assert!(
            size.is_power_of_two() && size >= Size4K::SIZE,
            "huge page size must be a power of two of at least 4 KiB"
        );
        self.huge_page_size = size;
        self
    }

    /// Set the number of names tried before giving up; at least one.
    #[must_use]
    pub fn with_max_name_attempts(mut self, attempts: u32) -> Self {
        self.max_name_attempts = attempts.max(1);
        self
    }

    /// Whether `MAP_HUGETLB` is passed to `mmap`.
    ///
    /// Files on hugetlbfs are huge-page backed either way; disable this to map
    /// from an ordinary filesystem (testing, diagnostics).
    #[must_use]
    pub const fn with_map_hugetlb(mut self, enabled: bool) -> Self {
        self.map_hugetlb = enabled;
        self
    }

    /// Whether every base page of a region is checked when resolving its
    /// physical base, rather than only the first one.
    #[must_use]
    pub const fn with_verify_contiguity(mut self, enabled: bool) -> Self {
        self.verify_contiguity = enabled;
        self
    }

    #[must_use]
    pub fn mount(&self) -> &Path {
        &self.mount
    }

    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    #[must_use]
    pub const fn huge_page_size(&self) -> u64 {
        self.huge_page_size
    }

    #[must_use]
    pub const fn max_name_attempts(&self) -> u32 {
        self.max_name_attempts
    }

    #[must_use]
    pub const fn map_hugetlb(&self) -> bool {
        self.map_hugetlb
    }

    #[must_use]
    pub const fn verify_contiguity(&self) -> bool {
        self.verify_contiguity
    }

    /// `<mount>/<prefix>-<pid>-<id>` with the id as 16 hex digits.
    #[must_use]
    pub fn backing_path(&self, pid: u32, id: u64) -> PathBuf {
        self.mount.join(format!("{}-{pid}-{id:016x}", self.prefix))
    }
}

/// A hugetlbfs mount as listed in `/proc/mounts`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HugetlbfsMount {
    pub path: PathBuf,
    /// Value of the `pagesize=` mount option in bytes.
    pub page_size: Option<u64>,
}

/// All hugetlbfs mounts of the calling process's mount namespace.
///
/// # Errors
/// Fails if `/proc/mounts` cannot be read.
pub fn hugetlbfs_mounts() -> io::Result<Vec<HugetlbfsMount>> {
    Ok(parse_mounts(&fs::read_to_string("/proc/mounts")?))
}

/// Extract hugetlbfs entries from `/proc/mounts`-formatted text.
#[must_use]
pub fn parse_mounts(mounts: &str) -> Vec<HugetlbfsMount> {
    mounts
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let _source = fields.next()?;
            let path = fields.next()?;
            let fstype = fields.next()?;
            let options = fields.next().unwrap_or_default();
            (fstype == "hugetlbfs").then(|| HugetlbfsMount {
                path: PathBuf::from(unescape_mount_path(path)),
                page_size: options
                    .split(',')
                    .find_map(|opt| opt.strip_prefix("pagesize="))
                    .and_then(parse_size),
            })
        })
        .collect()
}

/// `/proc/mounts` escapes whitespace and backslashes as three-digit octal.
fn unescape_mount_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut rest = path;
    while let Some(pos) = rest.find('\\') {
        out.push_str(&rest[..pos]);
        let code = rest.get(pos + 1..pos + 4).and_then(|oct| u8::from_str_radix(oct, 8).ok());
        if let Some(byte) = code {
            out.push(char::from(byte));
            rest = &rest[pos + 4..];
        } else {
            out.push('\\');
            rest = &rest[pos + 1..];
        }
    }
    out.push_str(rest);
    out
}

/// Parse sizes such as `2M`, `1G`, `2048k` or `4096`.
#[must_use]
pub fn parse_size(value: &str) -> Option<u64> {
    let (digits, shift) = match value.as_bytes().last()? {
        b'k' | b'K' => (&value[..value.len() - 1], 10),
        b'm' | b'M' => (&value[..value.len() - 1], 20),
        b'g' | b'G' => (&value[..value.len() - 1], 30),
        _ => (value, 0),
    };
    digits.parse::<u64>().ok()?.checked_mul(1 << shift)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = DmaConfig::default();
        assert_eq!(config.mount(), Path::new("/mnt/huge"));
        assert_eq!(config.prefix(), "ixy");
        assert_eq!(config.huge_page_size(), 2 * 1024 * 1024);
        assert_eq!(config.max_name_attempts(), 16);
        assert!(config.map_hugetlb());
        assert!(config.verify_contiguity());
    }

    #[test]
    fn backing_path_format() {
        let config = DmaConfig::default();
        assert_eq!(
            config.backing_path(1234, 1),
            PathBuf::from("/mnt/huge/ixy-1234-0000000000000001")
        );
    }

    #[test]
    fn attempts_never_zero() {
        assert_eq!(DmaConfig::default().with_max_name_attempts(0).max_name_attempts(), 1);
    }

    #[test]
    #[should_panic(expected = "power of two")]
    fn rejects_odd_page_size() {
        let _ = DmaConfig::default().with_huge_page_size(3 * 1024 * 1024);
    }

    #[test]
    fn parses_proc_mounts() {
        let text = "\
sysfs /sys sysfs rw,nosuid,nodev,noexec,relatime 0 0
hugetlbfs /dev/hugepages hugetlbfs rw,relatime,pagesize=2M 0 0
none /mnt/huge\\040pages hugetlbfs rw,relatime,pagesize=1024M 0 0
nodev /mnt/plain hugetlbfs rw 0 0
";
        let mounts = parse_mounts(text);
        assert_eq!(
            mounts,
            vec![
                HugetlbfsMount {
                    path: PathBuf::from("/dev/hugepages"),
                    page_size: Some(2 * 1024 * 1024),
                },
                HugetlbfsMount {
                    path: PathBuf::from("/mnt/huge pages"),
                    page_size: Some(1024 * 1024 * 1024),
                },
                HugetlbfsMount {
                    path: PathBuf::from("/mnt/plain"),
                    page_size: None,
                },
            ]
        );

        let config = DmaConfig::from_mount(&mounts[1]);
        assert_eq!(config.mount(), Path::new("/mnt/huge pages"));
        assert_eq!(config.huge_page_size(), 1 << 30);
    }

    #[test]
    fn size_suffixes() {
        assert_eq!(parse_size("2048k"), Some(2 * 1024 * 1024));
        assert_eq!(parse_size("4096"), Some(4096));
        assert_eq!(parse_size("1G"), Some(1 << 30));
        assert_eq!(parse_size("M"), None);
        assert_eq!(parse_size(""), None);
    }
}
