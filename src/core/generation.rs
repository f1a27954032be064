//! Flag generation counter.

use parking_lot::MutexGuard;
use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic counter of committed flag states.
///
/// Reads are lock-free. Bumping requires the merge lock's guard, so the
/// counter can only move together with a committed merge.
#[derive(Debug, Default)]
pub struct GenerationTracker {
    value: AtomicU64,
}

impl GenerationTracker {
    /// Create a tracker at generation 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// The current generation.
    pub fn current(&self) -> u64 {
        self.value.load(Ordering::Acquire)
    }

    /// Advance by one and return the new generation.
    pub(crate) fn bump(&self, _merge_lock: &MutexGuard<'_, ()>) -> u64 {
        self.value.fetch_add(1, Ordering::AcqRel) + 1
    }
}
