//! Compaction filters: the only mechanism that physically reclaims rows.
//!
//! Foreground deletion and expiry rewrite nothing but the 12-byte meta;
//! member and score rows keyed to superseded versions linger until
//! background compaction runs these filters over them. Each filter decides
//! per row:
//!
//! - meta family: drop a row only when it is stale, counts zero members,
//!   and its version epoch is already in the past — a live writer bumping
//!   the same key would have produced a version at or after the current
//!   second.
//! - member / score families: parse the `(user key, version)` prefix,
//!   fetch the *current* meta through a live database handle (never a
//!   snapshot), and drop the row when the meta is absent, stale, or
//!   carries a different version.
//!
//! The live handle arrives through a shared slot that the engine fills
//! right after open; while it is empty (or the engine is shutting down)
//! every row is kept, which is always safe.

use std::ffi::CStr;
use std::sync::{Arc, PoisonError, RwLock, Weak};

use rocksdb::compaction_filter::{CompactionFilter, Decision};
use rocksdb::compaction_filter_factory::{CompactionFilterContext, CompactionFilterFactory};
use rocksdb::DB;

use crate::encoding::decode_fixed32;
use crate::storage::ColumnFamily;
use crate::zsets::schema::{unix_seconds, MetaValue, Metas, Version};

/// Shared slot through which compaction filters reach the live database.
pub(crate) type DbHandle = Arc<RwLock<Weak<DB>>>;

pub(crate) fn empty_db_handle() -> DbHandle {
    Arc::new(RwLock::new(Weak::new()))
}

/// Split the `len(key) | key | version` prefix common to member and score
/// keys. The tail (member, or score + member) is irrelevant here.
fn parse_prefix(raw: &[u8]) -> Option<(&[u8], Version)> {
    let key_len = decode_fixed32(raw).ok()? as usize;
    if raw.len() < 4 + key_len + 4 {
        return None;
    }
    let version = decode_fixed32(&raw[4 + key_len..]).ok()? as i32;
    Some((&raw[4..4 + key_len], version))
}

// ============================================================================
// Meta filter
// ============================================================================

pub(crate) struct MetaFilter;

impl CompactionFilter for MetaFilter {
    fn filter(&mut self, _level: u32, key: &[u8], value: &[u8]) -> Decision {
        let Ok(meta) = MetaValue::decode(value) else {
            return Decision::Keep;
        };
        if meta.is_stale()
            && meta.count() == 0
            && i64::from(meta.version()) < unix_seconds()
        {
            tracing::trace!(key = ?String::from_utf8_lossy(key), "compaction drops stale meta row");
            return Decision::Remove;
        }
        Decision::Keep
    }

    fn name(&self) -> &CStr {
        c"zsets-meta-filter"
    }
}

pub(crate) struct MetaFilterFactory;

impl CompactionFilterFactory for MetaFilterFactory {
    type Filter = MetaFilter;

    fn create(&mut self, _context: CompactionFilterContext) -> Self::Filter {
        MetaFilter
    }

    fn name(&self) -> &CStr {
        c"zsets-meta-filter-factory"
    }
}

// ============================================================================
// Member / score filters
// ============================================================================

/// Drops member and score rows whose version no longer matches the current
/// meta. One instance filters a single compaction run, so caching the meta
/// of the most recently seen user key removes the per-row lookup for runs
/// of adjacent rows, which is the common case.
pub(crate) struct StaleEntryFilter {
    db: Weak<DB>,
    filter_name: &'static CStr,
    cached: Option<(Vec<u8>, Option<MetaValue>)>,
}

impl StaleEntryFilter {
    /// Current meta for `user_key`. Outer `None` means the engine is not
    /// reachable and nothing may be dropped; inner `None` means the meta
    /// row does not exist.
    fn current_meta(&mut self, user_key: &[u8]) -> Option<Option<MetaValue>> {
        if let Some((cached_key, meta)) = &self.cached {
            if cached_key == user_key {
                return Some(*meta);
            }
        }
        let db = self.db.upgrade()?;
        let cf = db.cf_handle(Metas::CF_NAME)?;
        let meta = match db.get_cf(cf, user_key) {
            Ok(Some(raw)) => match MetaValue::decode(&raw) {
                Ok(meta) => Some(meta),
                Err(_) => return None,
            },
            Ok(None) => None,
            Err(_) => return None,
        };
        self.cached = Some((user_key.to_vec(), meta));
        Some(meta)
    }
}

impl CompactionFilter for StaleEntryFilter {
    fn filter(&mut self, _level: u32, key: &[u8], _value: &[u8]) -> Decision {
        let Some((user_key, version)) = parse_prefix(key) else {
            return Decision::Keep;
        };
        match self.current_meta(user_key) {
            // Engine unreachable: keep everything, a later compaction
            // retries.
            None => Decision::Keep,
            // Meta row gone: the whole set is garbage.
            Some(None) => Decision::Remove,
            Some(Some(meta)) => {
                if meta.is_stale() || meta.version() != version {
                    Decision::Remove
                } else {
                    Decision::Keep
                }
            }
        }
    }

    fn name(&self) -> &CStr {
        self.filter_name
    }
}

pub(crate) struct MemberFilterFactory {
    db: DbHandle,
}

impl MemberFilterFactory {
    pub(crate) fn new(db: DbHandle) -> Self {
        Self { db }
    }
}

impl CompactionFilterFactory for MemberFilterFactory {
    type Filter = StaleEntryFilter;

    fn create(&mut self, _context: CompactionFilterContext) -> Self::Filter {
        StaleEntryFilter {
            db: self
                .db
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
            filter_name: c"zsets-data-filter",
            cached: None,
        }
    }

    fn name(&self) -> &CStr {
        c"zsets-data-filter-factory"
    }
}

pub(crate) struct ScoreFilterFactory {
    db: DbHandle,
}

impl ScoreFilterFactory {
    pub(crate) fn new(db: DbHandle) -> Self {
        Self { db }
    }
}

impl CompactionFilterFactory for ScoreFilterFactory {
    type Filter = StaleEntryFilter;

    fn create(&mut self, _context: CompactionFilterContext) -> Self::Filter {
        StaleEntryFilter {
            db: self
                .db
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
            filter_name: c"zsets-score-filter",
            cached: None,
        }
    }

    fn name(&self) -> &CStr {
        c"zsets-score-filter-factory"
    }
}
