//! Common RocksDB storage infrastructure.
//!
//! The engine keeps three column families with independent tuning; this
//! module holds the pieces they share: the `ColumnFamily` marker trait
//! (single source of truth for CF names), handle lookup, block-based table
//! configuration, and the database-wide option defaults.

use rocksdb::{BlockBasedOptions, Cache, Options, DB};

use crate::error::{Error, Result};

// ============================================================================
// ColumnFamily Trait
// ============================================================================

/// Base marker trait for column family types.
///
/// # Example
///
/// ```rust,ignore
/// impl ColumnFamily for Members {
///     const CF_NAME: &'static str = "data_cf";
/// }
/// ```
pub trait ColumnFamily {
    /// Column family name as stored on disk.
    const CF_NAME: &'static str;
}

/// RocksDB configuration trait: each column family builds its own options
/// against the shared block cache and engine config.
pub trait ColumnFamilyConfig: ColumnFamily {
    /// Create column family options with shared block cache and config.
    fn cf_options(cache: &Cache, config: &Config) -> Options;
}

/// Look up a column family handle by marker type.
pub(crate) fn cf_handle<CF: ColumnFamily>(db: &DB) -> Result<&rocksdb::ColumnFamily> {
    db.cf_handle(CF::CF_NAME)
        .ok_or_else(|| Error::Corruption(format!("column family not found: {}", CF::CF_NAME)))
}

// ============================================================================
// Config
// ============================================================================

/// Engine tunables.
///
/// Defaults follow the reference deployment: 10-bit block-based bloom
/// filters on every family, a shared block cache, and a bounded ZScan
/// cursor cache.
#[derive(Debug, Clone)]
pub struct Config {
    /// Bloom filter bits per key (block-based builder).
    pub bloom_filter_bits_per_key: f64,

    /// Shared block cache capacity in bytes.
    pub block_cache_bytes: usize,

    /// Per-memtable write buffer size in bytes.
    pub write_buffer_size: usize,

    /// Capacity of the ZScan cursor cache (entries).
    pub zscan_cursor_cache_size: usize,

    /// Stripe count for the per-key lock manager.
    pub lock_stripes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bloom_filter_bits_per_key: 10.0,
            block_cache_bytes: 64 * 1024 * 1024,
            write_buffer_size: 64 * 1024 * 1024,
            zscan_cursor_cache_size: 1024,
            lock_stripes: 1024,
        }
    }
}

impl Config {
    /// Override the bloom filter density.
    pub fn with_bloom_filter_bits_per_key(mut self, bits: f64) -> Self {
        self.bloom_filter_bits_per_key = bits;
        self
    }

    /// Override the shared block cache capacity.
    pub fn with_block_cache_bytes(mut self, bytes: usize) -> Self {
        self.block_cache_bytes = bytes;
        self
    }

    /// Override the ZScan cursor cache capacity.
    pub fn with_zscan_cursor_cache_size(mut self, entries: usize) -> Self {
        self.zscan_cursor_cache_size = entries;
        self
    }
}

// ============================================================================
// StorageOptions
// ============================================================================

/// Default RocksDB options factory.
pub struct StorageOptions;

impl StorageOptions {
    /// Database-wide options.
    ///
    /// Settings:
    /// - `create_if_missing` / `create_missing_column_families`: true
    /// - Parallelism: uses available CPU cores for background jobs
    pub fn default_db_options(config: &Config) -> Options {
        let mut options = Options::default();
        options.set_error_if_exists(false);
        options.create_if_missing(true);
        options.create_missing_column_families(true);

        let num_cpus = std::thread::available_parallelism()
            .map(|p| p.get() as i32)
            .unwrap_or(4);
        options.increase_parallelism(num_cpus);
        options.set_max_background_jobs(num_cpus.min(8));

        options.set_write_buffer_size(config.write_buffer_size);

        options
    }

    /// Block-based table options shared by all three families: the block
    /// cache plus a bloom filter to cut disk reads on point lookups.
    pub fn block_based_options(cache: &Cache, config: &Config) -> BlockBasedOptions {
        let mut block_opts = BlockBasedOptions::default();
        block_opts.set_block_cache(cache);
        block_opts.set_bloom_filter(config.bloom_filter_bits_per_key, true);
        block_opts.set_cache_index_and_filter_blocks(true);
        block_opts
    }
}
