//! Backing name suffixes.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Source of the unique suffix in `<prefix>-<pid>-<suffix>` backing names.
///
/// Exclusive creation already prevents two allocations from sharing a file;
/// a good generator just keeps collisions, and thus retries, rare.
pub trait BackingIdGenerator: Send + Sync {
    fn next_id(&self) -> u64;
}

/// Random 64-bit suffixes from the thread-local RNG.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RandomIdGenerator;

impl BackingIdGenerator for RandomIdGenerator {
    fn next_id(&self) -> u64 {
        rand::random()
    }
}

/// Monotonically increasing suffixes.
#[derive(Debug, Default)]
pub struct CounterIdGenerator {
    next: AtomicU64,
}

impl CounterIdGenerator {
    #[must_use]
    pub const fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first),
        }
    }
}

impl BackingIdGenerator for CounterIdGenerator {
    fn next_id(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

impl<T: BackingIdGenerator + ?Sized> BackingIdGenerator for &T {
    fn next_id(&self) -> u64 {
        (**self).next_id()
    }
}

impl<T: BackingIdGenerator + ?Sized> BackingIdGenerator for Arc<T> {
    fn next_id(&self) -> u64 {
        (**self).next_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn counter_is_monotonic() {
        let ids = CounterIdGenerator::starting_at(10);
        assert_eq!(ids.next_id(), 10);
        assert_eq!(ids.next_id(), 11);
        assert_eq!((&ids).next_id(), 12);
    }

    #[test]
    fn random_ids_do_not_repeat_in_practice() {
        let ids = RandomIdGenerator;
        let seen: HashSet<u64> = (0..1000).map(|_| ids.next_id()).collect();
        assert_eq!(seen.len(), 1000);
    }
}
