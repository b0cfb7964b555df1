//! Striped per-key record locks.
//!
//! Every mutating sorted-set operation serializes on the lock for its user
//! key; readers never take one. The manager hashes keys onto a fixed
//! power-of-two array of mutexes, so two distinct keys may share a stripe —
//! that only costs throughput, never correctness. The guard releases on all
//! exit paths, including panics.

use std::sync::{Mutex, MutexGuard, PoisonError};

use xxhash_rust::xxh3::xxh3_64;

/// Default number of stripes. Power of two so the hash maps with a mask.
const DEFAULT_STRIPES: usize = 1024;

/// Lock manager keyed by user key.
pub struct LockMgr {
    stripes: Box<[Mutex<()>]>,
}

impl LockMgr {
    /// Create a manager with the default stripe count.
    pub fn new() -> Self {
        Self::with_stripes(DEFAULT_STRIPES)
    }

    /// Create a manager with `stripes` rounded up to a power of two.
    pub fn with_stripes(stripes: usize) -> Self {
        let n = stripes.max(1).next_power_of_two();
        let stripes = (0..n).map(|_| Mutex::new(())).collect::<Vec<_>>();
        Self {
            stripes: stripes.into_boxed_slice(),
        }
    }

    /// Acquire the exclusive lock for `key`, blocking until available.
    ///
    /// A poisoned stripe (a writer panicked while holding it) is recovered:
    /// the batch it was building was never committed, so the stripe state
    /// is clean.
    pub fn lock(&self, key: &[u8]) -> RecordLock<'_> {
        let idx = (xxh3_64(key) as usize) & (self.stripes.len() - 1);
        let guard = self.stripes[idx]
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        RecordLock { _guard: guard }
    }
}

impl Default for LockMgr {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard for a single key's write lock.
pub struct RecordLock<'a> {
    _guard: MutexGuard<'a, ()>,
}
