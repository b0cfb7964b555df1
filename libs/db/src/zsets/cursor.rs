//! Resume-point cache for ZScan cursors.
//!
//! ZScan hands clients an opaque integer cursor, but the member index
//! needs a byte position to resume from. This cache maps
//! `(user key, pattern, cursor)` to the member the next page starts at.
//! It is bounded LRU: losing an entry is harmless — an unknown cursor
//! restarts the scan from the first member.

use std::num::NonZeroUsize;
use std::sync::{Mutex, PoisonError};

use lru::LruCache;

/// `(user key, pattern, cursor)` lookup key.
type CursorKey = (Vec<u8>, Vec<u8>, i64);

/// Bounded LRU of scan resume points, guarded by its own mutex,
/// independent of the per-key record locks.
pub(crate) struct ZScanCursorCache {
    inner: Mutex<LruCache<CursorKey, Vec<u8>>>,
}

impl ZScanCursorCache {
    pub(crate) fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Member to resume from for a previously issued cursor, if still
    /// cached.
    pub(crate) fn start_member(&self, key: &[u8], pattern: &[u8], cursor: i64) -> Option<Vec<u8>> {
        let mut cache = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        cache
            .get(&(key.to_vec(), pattern.to_vec(), cursor))
            .cloned()
    }

    /// Record where the page issued as `cursor` resumes.
    pub(crate) fn store_next_member(
        &self,
        key: &[u8],
        pattern: &[u8],
        cursor: i64,
        next_member: Vec<u8>,
    ) {
        let mut cache = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        cache.put((key.to_vec(), pattern.to_vec(), cursor), next_member);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_and_lookup() {
        let cache = ZScanCursorCache::new(8);
        cache.store_next_member(b"k", b"*", 10, b"resume-here".to_vec());
        assert_eq!(
            cache.start_member(b"k", b"*", 10),
            Some(b"resume-here".to_vec())
        );
        // Different pattern or cursor misses.
        assert_eq!(cache.start_member(b"k", b"a*", 10), None);
        assert_eq!(cache.start_member(b"k", b"*", 20), None);
    }

    #[test]
    fn test_lru_eviction() {
        let cache = ZScanCursorCache::new(2);
        cache.store_next_member(b"a", b"*", 1, b"ma".to_vec());
        cache.store_next_member(b"b", b"*", 1, b"mb".to_vec());
        // Touch "a" so "b" is the eviction candidate.
        assert!(cache.start_member(b"a", b"*", 1).is_some());
        cache.store_next_member(b"c", b"*", 1, b"mc".to_vec());
        assert!(cache.start_member(b"b", b"*", 1).is_none());
        assert!(cache.start_member(b"a", b"*", 1).is_some());
        assert!(cache.start_member(b"c", b"*", 1).is_some());
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let cache = ZScanCursorCache::new(0);
        cache.store_next_member(b"k", b"*", 1, b"m".to_vec());
        assert_eq!(cache.start_member(b"k", b"*", 1), Some(b"m".to_vec()));
    }
}
