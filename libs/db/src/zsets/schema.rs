//! On-disk schema for the sorted-set engine.
//!
//! Three column families back every sorted set:
//!
//! - `default` (meta): one row per live set. Key is the raw user key, value
//!   is the 12-byte record `count | version | timestamp`.
//! - `data_cf` (member index): one row per `(key, member)`. Key is
//!   `len(key) | key | version | member`, value is the 8-byte bit pattern
//!   of the score.
//! - `score_cf` (score index): one row per `(key, member)`. Key is
//!   `len(key) | key | version | score | member` with an order-preserving
//!   score transform, value is empty.
//!
//! The `version` inside every data key ties it to the meta row that created
//! it. Deleting or expiring a set only rewrites the meta with a fresh
//! version; rows carrying older versions become garbage for the compaction
//! filters.
//!
//! ## Naming Convention
//!
//! For each family `Foo` there is a unit struct `Foos` marking the CF, a
//! builder for its key, and a `ParsedFooKey` that borrows the raw slice and
//! exposes accessors without copying.

use rocksdb::{Cache, Options};

use crate::encoding::{decode_fixed32, decode_fixed64, put_fixed32, put_fixed64};
use crate::error::{Error, Result};
use crate::storage::{ColumnFamily, ColumnFamilyConfig, Config, StorageOptions};

// ============================================================================
// Version and time
// ============================================================================

/// Per-key epoch identifier distinguishing live rows from stale ones.
///
/// Assigned from the unix clock and bumped monotonically, so two
/// generations of the same key never collide.
pub type Version = i32;

/// Current unix time in seconds.
pub(crate) fn unix_seconds() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

// ============================================================================
// Score encoding
// ============================================================================

const SIGN_BIT: u64 = 1 << 63;

/// Order-preserving 8-byte encoding of a score, big-endian so that raw
/// bytewise comparison follows numeric order: flip the sign bit for
/// non-negative doubles, flip every bit for negative ones.
pub fn encode_score(score: f64) -> [u8; 8] {
    let bits = score.to_bits();
    let transformed = if bits & SIGN_BIT == 0 {
        bits ^ SIGN_BIT
    } else {
        !bits
    };
    transformed.to_be_bytes()
}

/// Inverse of [`encode_score`].
pub fn decode_score(bytes: &[u8]) -> Result<f64> {
    if bytes.len() < 8 {
        return Err(Error::Corruption(format!(
            "score needs 8 bytes, got {}",
            bytes.len()
        )));
    }
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[..8]);
    let transformed = u64::from_be_bytes(buf);
    let bits = if transformed & SIGN_BIT != 0 {
        transformed ^ SIGN_BIT
    } else {
        !transformed
    };
    Ok(f64::from_bits(bits))
}

/// Member-index value: the plain IEEE-754 bit pattern, fixed-width encoded.
/// Reads are a straight `from_bits` reinterpretation, no transform.
pub fn encode_score_bits(score: f64) -> Vec<u8> {
    let mut buf = Vec::with_capacity(8);
    put_fixed64(&mut buf, score.to_bits());
    buf
}

/// Inverse of [`encode_score_bits`].
pub fn decode_score_bits(bytes: &[u8]) -> Result<f64> {
    Ok(f64::from_bits(decode_fixed64(bytes)?))
}

// ============================================================================
// Meta value
// ============================================================================

/// Per-key metadata: member count, version epoch, absolute expiry.
///
/// `timestamp == 0` means the key never expires. A set whose timestamp has
/// passed is *stale*: logically deleted until a write reincarnates it with
/// a fresh version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetaValue {
    count: u32,
    version: Version,
    timestamp: i32,
}

impl MetaValue {
    /// Encoded length: `count (4) | version (4) | timestamp (4)`.
    pub const ENCODED_LEN: usize = 12;

    /// Fresh meta for a set that is about to receive `count` members.
    /// The caller assigns the version via [`MetaValue::update_version`].
    pub fn new(count: u32) -> Self {
        Self {
            count,
            version: 0,
            timestamp: 0,
        }
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != Self::ENCODED_LEN {
            return Err(Error::Corruption(format!(
                "meta value needs {} bytes, got {}",
                Self::ENCODED_LEN,
                bytes.len()
            )));
        }
        Ok(Self {
            count: decode_fixed32(&bytes[0..4])?,
            version: decode_fixed32(&bytes[4..8])? as i32,
            timestamp: decode_fixed32(&bytes[8..12])? as i32,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::ENCODED_LEN);
        put_fixed32(&mut buf, self.count);
        put_fixed32(&mut buf, self.version as u32);
        put_fixed32(&mut buf, self.timestamp as u32);
        buf
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn timestamp(&self) -> i32 {
        self.timestamp
    }

    /// True when the expiry has passed.
    pub fn is_stale(&self) -> bool {
        self.timestamp != 0 && i64::from(self.timestamp) <= unix_seconds()
    }

    /// Reset to a logically-empty set with a fresh version and no expiry.
    /// Used by deletion, expiry collapse, and reincarnation of a stale key.
    /// Returns the new version so callers can key their data rows to it.
    pub fn initial_meta_value(&mut self) -> Version {
        self.count = 0;
        self.timestamp = 0;
        self.update_version()
    }

    /// Bump the version: the current unix time, or `version + 1` when the
    /// clock has not advanced past the previous epoch.
    pub fn update_version(&mut self) -> Version {
        let now = unix_seconds() as i32;
        self.version = if now > self.version {
            now
        } else {
            self.version + 1
        };
        self.version
    }

    /// Adjust the member count by a signed delta, saturating at zero.
    pub fn modify_count(&mut self, delta: i64) {
        self.count = (i64::from(self.count) + delta).max(0) as u32;
    }

    pub fn set_count(&mut self, count: u32) {
        self.count = count;
    }

    pub fn set_timestamp(&mut self, timestamp: i32) {
        self.timestamp = timestamp;
    }

    /// Set the expiry `ttl` seconds from now.
    pub fn set_relative_timestamp(&mut self, ttl: i32) {
        self.timestamp = unix_seconds() as i32 + ttl;
    }
}

// ============================================================================
// Column family markers
// ============================================================================

/// Meta column family: one row per sorted set.
pub(crate) struct Metas;

/// Member index column family, ordered by `(key, version, member)`.
pub(crate) struct Members;

/// Score index column family, ordered by `(key, version, score, member)`
/// under the custom comparator.
pub(crate) struct Scores;

impl ColumnFamily for Metas {
    const CF_NAME: &'static str = "default";
}

impl ColumnFamily for Members {
    const CF_NAME: &'static str = "data_cf";
}

impl ColumnFamily for Scores {
    const CF_NAME: &'static str = "score_cf";
}

impl ColumnFamilyConfig for Metas {
    /// Meta rows are small and read on every operation: bloom filter plus
    /// pinned index blocks keep point lookups off disk.
    fn cf_options(cache: &Cache, config: &Config) -> Options {
        let mut opts = Options::default();
        let block_opts = StorageOptions::block_based_options(cache, config);
        opts.set_block_based_table_factory(&block_opts);
        opts
    }
}

impl ColumnFamilyConfig for Members {
    /// Member index serves point lookups (`zscore`, set-algebra probes) and
    /// member-ordered scans (`zrangebylex`, `zscan`).
    fn cf_options(cache: &Cache, config: &Config) -> Options {
        let mut opts = Options::default();
        let block_opts = StorageOptions::block_based_options(cache, config);
        opts.set_block_based_table_factory(&block_opts);
        opts
    }
}

impl ColumnFamilyConfig for Scores {
    /// Score index is scan-only. The custom comparator and the compaction
    /// filter factory are wired at open time because they carry state.
    fn cf_options(cache: &Cache, config: &Config) -> Options {
        let mut opts = Options::default();
        let block_opts = StorageOptions::block_based_options(cache, config);
        opts.set_block_based_table_factory(&block_opts);
        opts
    }
}

// ============================================================================
// Member index key
// ============================================================================

/// Builder for member-index keys: `len(key) | key | version | member`.
pub struct MemberKey<'a> {
    key: &'a [u8],
    version: Version,
    member: &'a [u8],
}

impl<'a> MemberKey<'a> {
    pub fn new(key: &'a [u8], version: Version, member: &'a [u8]) -> Self {
        Self {
            key,
            version,
            member,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(8 + self.key.len() + self.member.len());
        put_fixed32(&mut buf, self.key.len() as u32);
        buf.extend_from_slice(self.key);
        put_fixed32(&mut buf, self.version as u32);
        buf.extend_from_slice(self.member);
        buf
    }

    /// The `len(key) | key | version` prefix shared by every member of one
    /// set generation; used to bound member-ordered scans.
    pub fn prefix(key: &[u8], version: Version) -> Vec<u8> {
        MemberKey::new(key, version, b"").encode()
    }
}

/// Zero-copy view of a member-index key.
pub struct ParsedMemberKey<'a> {
    user_key: &'a [u8],
    version: Version,
    member: &'a [u8],
}

impl<'a> ParsedMemberKey<'a> {
    pub fn parse(raw: &'a [u8]) -> Result<Self> {
        let key_len = decode_fixed32(raw)? as usize;
        let version_end = 4 + key_len + 4;
        if raw.len() < version_end {
            return Err(Error::Corruption(format!(
                "member key needs at least {} bytes, got {}",
                version_end,
                raw.len()
            )));
        }
        Ok(Self {
            user_key: &raw[4..4 + key_len],
            version: decode_fixed32(&raw[4 + key_len..])? as i32,
            member: &raw[version_end..],
        })
    }

    pub fn user_key(&self) -> &'a [u8] {
        self.user_key
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn member(&self) -> &'a [u8] {
        self.member
    }
}

// ============================================================================
// Score index key
// ============================================================================

/// Builder for score-index keys:
/// `len(key) | key | version | score | member`.
pub struct ScoreKey<'a> {
    key: &'a [u8],
    version: Version,
    score: f64,
    member: &'a [u8],
}

impl<'a> ScoreKey<'a> {
    pub fn new(key: &'a [u8], version: Version, score: f64, member: &'a [u8]) -> Self {
        Self {
            key,
            version,
            score,
            member,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(16 + self.key.len() + self.member.len());
        put_fixed32(&mut buf, self.key.len() as u32);
        buf.extend_from_slice(self.key);
        put_fixed32(&mut buf, self.version as u32);
        buf.extend_from_slice(&encode_score(self.score));
        buf.extend_from_slice(self.member);
        buf
    }

    /// Seek target at the low end of one set generation: `-inf` score,
    /// empty member. Every live row of `(key, version)` sorts at or after
    /// this key.
    pub fn seek_min(key: &[u8], version: Version) -> Vec<u8> {
        ScoreKey::new(key, version, f64::NEG_INFINITY, b"").encode()
    }

    /// Exclusive upper sentinel for reverse scans: the bare
    /// `len(key) | key | version + 1` prefix. No stored row carries the
    /// successor version, so `seek_for_prev` on this lands on the last row
    /// of `(key, version)` — including members with score `+inf`.
    pub fn upper_sentinel(key: &[u8], version: Version) -> Vec<u8> {
        let mut buf = Vec::with_capacity(8 + key.len());
        put_fixed32(&mut buf, key.len() as u32);
        buf.extend_from_slice(key);
        put_fixed32(&mut buf, version.wrapping_add(1) as u32);
        buf
    }
}

/// Zero-copy view of a score-index key.
pub struct ParsedScoreKey<'a> {
    user_key: &'a [u8],
    version: Version,
    score: f64,
    member: &'a [u8],
}

impl<'a> ParsedScoreKey<'a> {
    pub fn parse(raw: &'a [u8]) -> Result<Self> {
        let key_len = decode_fixed32(raw)? as usize;
        let score_end = 4 + key_len + 4 + 8;
        if raw.len() < score_end {
            return Err(Error::Corruption(format!(
                "score key needs at least {} bytes, got {}",
                score_end,
                raw.len()
            )));
        }
        Ok(Self {
            user_key: &raw[4..4 + key_len],
            version: decode_fixed32(&raw[4 + key_len..])? as i32,
            score: decode_score(&raw[4 + key_len + 4..])?,
            member: &raw[score_end..],
        })
    }

    pub fn user_key(&self) -> &'a [u8] {
        self.user_key
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn score(&self) -> f64 {
        self.score
    }

    pub fn member(&self) -> &'a [u8] {
        self.member
    }

    /// True when this row belongs to the given set generation.
    pub fn belongs_to(&self, key: &[u8], version: Version) -> bool {
        self.user_key == key && self.version == version
    }
}

impl<'a> ParsedMemberKey<'a> {
    /// True when this row belongs to the given set generation.
    pub fn belongs_to(&self, key: &[u8], version: Version) -> bool {
        self.user_key == key && self.version == version
    }
}
