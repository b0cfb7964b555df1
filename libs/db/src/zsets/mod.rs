//! Sorted-set storage engine on RocksDB.
//!
//! A sorted set is a named collection of `(member, score)` pairs ordered by
//! `(score ascending, member ascending)`. The engine maps that shape onto
//! three column families (see `schema.rs`), serializes writers per key
//! through a striped lock manager, and gives readers snapshot consistency
//! across all three families without any lock.
//!
//! ## Module Structure
//!
//! - `mod.rs` - `ZSets` handle: open, compaction, property access
//! - `schema.rs` - column families, key codecs, meta value
//! - `comparator.rs` - score-index total order
//! - `filter.rs` - compaction filters (physical reclamation)
//! - `cursor.rs` - ZScan resume-point cache
//! - `ops/` - the command surface (read, write, store, scan)
//!
//! ## Write and read templates
//!
//! ```text
//! writer:  lock(key) → read meta → build WriteBatch over all three
//!          families → commit atomically
//! reader:  snapshot → read meta under it → iterate member or score
//!          family under the same snapshot
//! ```
//!
//! Deletion and expiry rewrite only the meta row; orphaned member/score
//! rows are dropped later by the compaction filters.

use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError};

use rocksdb::{Cache, ColumnFamilyDescriptor, DB};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::lock::LockMgr;
use crate::storage::{cf_handle, ColumnFamily, ColumnFamilyConfig, Config, StorageOptions};

pub mod comparator;
pub mod schema;

mod cursor;
mod filter;
mod ops;

#[cfg(test)]
mod tests;

pub use ops::ScanResult;
pub use schema::{MetaValue, Version};

use cursor::ZScanCursorCache;
use filter::DbHandle;
use schema::{Members, Metas, Scores};

// ============================================================================
// Public value types
// ============================================================================

/// A member together with its score, in canonical `(score, member)` order
/// when returned from range scans.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreMember {
    pub score: f64,
    pub member: Vec<u8>,
}

impl ScoreMember {
    pub fn new(score: f64, member: impl Into<Vec<u8>>) -> Self {
        Self {
            score,
            member: member.into(),
        }
    }
}

/// Aggregation applied by `zunionstore` / `zinterstore` when a member
/// occurs in several source sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Aggregate {
    Sum,
    Min,
    Max,
}

impl Aggregate {
    pub(crate) fn combine(self, acc: f64, weighted: f64) -> f64 {
        match self {
            Aggregate::Sum => acc + weighted,
            Aggregate::Min => acc.min(weighted),
            Aggregate::Max => acc.max(weighted),
        }
    }
}

// ============================================================================
// ZSets
// ============================================================================

/// Handle to the sorted-set storage engine.
///
/// Thread-safe for arbitrary concurrent callers; clone-free sharing via
/// `Arc<ZSets>` if needed. All operations run to completion — there is no
/// cancellation at this layer.
pub struct ZSets {
    db: Arc<DB>,
    /// Slot the compaction filters read the live handle from.
    filter_db: DbHandle,
    lock_mgr: LockMgr,
    cursors: ZScanCursorCache,
    config: Config,
    path: PathBuf,
}

impl ZSets {
    /// Open (creating if missing) the engine at `path`.
    ///
    /// Wires per-family options: bloom filters everywhere, the score-key
    /// comparator plus score filter on `score_cf`, the member filter on
    /// `data_cf`, the meta filter on `default`. The compaction filters see
    /// the database through a shared slot populated here, right after the
    /// database exists.
    pub fn open(path: impl AsRef<Path>, config: Config) -> Result<Self> {
        let path = path.as_ref();
        let db_opts = StorageOptions::default_db_options(&config);
        let block_cache = Cache::new_lru_cache(config.block_cache_bytes);
        let filter_db = filter::empty_db_handle();

        let mut meta_opts = Metas::cf_options(&block_cache, &config);
        meta_opts.set_compaction_filter_factory(filter::MetaFilterFactory);

        let mut member_opts = Members::cf_options(&block_cache, &config);
        member_opts
            .set_compaction_filter_factory(filter::MemberFilterFactory::new(filter_db.clone()));

        let mut score_opts = Scores::cf_options(&block_cache, &config);
        score_opts.set_comparator(
            "zedis.zsets.score-key",
            Box::new(comparator::compare_score_keys),
        );
        score_opts.set_compaction_filter_factory(filter::ScoreFilterFactory::new(filter_db.clone()));

        let descriptors = vec![
            ColumnFamilyDescriptor::new(Metas::CF_NAME, meta_opts),
            ColumnFamilyDescriptor::new(Members::CF_NAME, member_opts),
            ColumnFamilyDescriptor::new(Scores::CF_NAME, score_opts),
        ];

        let db = Arc::new(DB::open_cf_descriptors(&db_opts, path, descriptors)?);
        *filter_db
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Arc::downgrade(&db);

        tracing::info!(path = %path.display(), "sorted-set storage ready");

        Ok(Self {
            db,
            filter_db,
            lock_mgr: LockMgr::with_stripes(config.lock_stripes),
            cursors: ZScanCursorCache::new(config.zscan_cursor_cache_size),
            config,
            path: PathBuf::from(path),
        })
    }

    /// Database path this engine was opened at.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Engine tunables this instance was opened with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Trigger compaction over all three families, optionally restricted to
    /// a key range. This is what makes logically deleted data physically
    /// disappear.
    pub fn compact_range(&self, begin: Option<&[u8]>, end: Option<&[u8]>) -> Result<()> {
        tracing::debug!("compacting all sorted-set column families");
        self.db.compact_range_cf(self.meta_cf()?, begin, end);
        self.db.compact_range_cf(self.member_cf()?, begin, end);
        self.db.compact_range_cf(self.score_cf()?, begin, end);
        Ok(())
    }

    /// RocksDB property passthrough (e.g. `rocksdb.stats`).
    pub fn get_property(&self, property: &str) -> Result<Option<String>> {
        Ok(self.db.property_value(property)?)
    }

    pub(crate) fn meta_cf(&self) -> Result<&rocksdb::ColumnFamily> {
        cf_handle::<Metas>(&self.db)
    }

    pub(crate) fn member_cf(&self) -> Result<&rocksdb::ColumnFamily> {
        cf_handle::<Members>(&self.db)
    }

    pub(crate) fn score_cf(&self) -> Result<&rocksdb::ColumnFamily> {
        cf_handle::<Scores>(&self.db)
    }
}

impl Drop for ZSets {
    fn drop(&mut self) {
        // Invalidate the filter slot before the DB goes away so an
        // in-flight compaction stops consulting it immediately.
        *self
            .filter_db
            .write()
            .unwrap_or_else(PoisonError::into_inner) = std::sync::Weak::new();
    }
}
