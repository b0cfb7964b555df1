//! Sorted-set storage engine for the zedis Redis-compatible data layer.
//!
//! Maps the sorted-set abstract data type onto RocksDB using three column
//! families: per-key metadata (`default`), a member→score index
//! (`data_cf`), and a score-ordered index (`score_cf`). Deletion and
//! expiry are O(1) logical-version tombstones; physical reclamation
//! happens in background compaction. See the [`zsets`] module for the
//! full design.
//!
//! ```ignore
//! use zedis_db::{Config, ScoreMember, ZSets};
//!
//! let zs = ZSets::open("/var/lib/zedis/zsets", Config::default())?;
//! zs.zadd(b"board", &[ScoreMember::new(42.0, "alice")])?;
//! let top = zs.zrevrange(b"board", 0, 9)?;
//! ```

pub mod encoding;
pub mod error;
pub mod lock;
pub mod matcher;
pub mod storage;
pub mod zsets;

pub use error::{Error, Result};
pub use storage::{ColumnFamily, Config};
pub use zsets::{Aggregate, MetaValue, ScanResult, ScoreMember, Version, ZSets};
