//! Keyspace scans and resumable per-key member iteration.

use rocksdb::ReadOptions;

use crate::error::Result;
use crate::matcher::string_match;
use crate::zsets::ops::require_live;
use crate::zsets::schema::{
    decode_score_bits, unix_seconds, MemberKey, MetaValue, ParsedMemberKey, ParsedScoreKey,
};
use crate::zsets::{ScoreMember, ZSets};

/// One page of a keyspace scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanResult {
    /// Keys matching the pattern, in key order.
    pub keys: Vec<Vec<u8>>,
    /// Position to resume from; empty when the scan finished.
    pub next_key: Vec<u8>,
    /// True when the iterator ran off the end of the meta family.
    pub finished: bool,
}

impl ZSets {
    /// Scan the meta family from `start_key`, skipping stale rows (they do
    /// not consume budget), collecting up to `limit` keys that match
    /// `pattern`.
    pub fn scan(&self, start_key: &[u8], pattern: &[u8], limit: u64) -> Result<ScanResult> {
        let snapshot = self.db.snapshot();
        let mut read_opts = ReadOptions::default();
        read_opts.fill_cache(false);

        let mut keys = Vec::new();
        let mut rest = limit;
        let mut iter = snapshot.raw_iterator_cf_opt(self.meta_cf()?, read_opts);
        iter.seek(start_key);
        while iter.valid() && rest > 0 {
            let mut consumed_budget = false;
            {
                let Some(value) = iter.value() else { break };
                let meta = MetaValue::decode(value)?;
                if !meta.is_stale() {
                    consumed_budget = true;
                    let raw_key = iter.key().unwrap_or_default();
                    if string_match(pattern, raw_key) {
                        keys.push(raw_key.to_vec());
                    }
                }
            }
            if consumed_budget {
                rest -= 1;
            }
            iter.next();
        }
        iter.status()?;

        if iter.valid() {
            Ok(ScanResult {
                keys,
                next_key: iter.key().unwrap_or_default().to_vec(),
                finished: false,
            })
        } else {
            Ok(ScanResult {
                keys,
                next_key: Vec::new(),
                finished: true,
            })
        }
    }

    /// Number of non-stale, non-empty sorted sets.
    pub fn scan_key_num(&self) -> Result<u64> {
        let snapshot = self.db.snapshot();
        let mut read_opts = ReadOptions::default();
        read_opts.fill_cache(false);

        let mut count = 0;
        let mut iter = snapshot.raw_iterator_cf_opt(self.meta_cf()?, read_opts);
        iter.seek_to_first();
        while iter.valid() {
            {
                let Some(value) = iter.value() else { break };
                let meta = MetaValue::decode(value)?;
                if !meta.is_stale() && meta.count() != 0 {
                    count += 1;
                }
            }
            iter.next();
        }
        iter.status()?;
        Ok(count)
    }

    /// Keys of all non-stale, non-empty sorted sets matching `pattern`.
    pub fn scan_keys(&self, pattern: &[u8]) -> Result<Vec<Vec<u8>>> {
        let snapshot = self.db.snapshot();
        let mut read_opts = ReadOptions::default();
        read_opts.fill_cache(false);

        let mut keys = Vec::new();
        let mut iter = snapshot.raw_iterator_cf_opt(self.meta_cf()?, read_opts);
        iter.seek_to_first();
        while iter.valid() {
            {
                let Some(value) = iter.value() else { break };
                let meta = MetaValue::decode(value)?;
                if !meta.is_stale() && meta.count() != 0 {
                    let raw_key = iter.key().unwrap_or_default();
                    if string_match(pattern, raw_key) {
                        keys.push(raw_key.to_vec());
                    }
                }
            }
            iter.next();
        }
        iter.status()?;
        Ok(keys)
    }

    /// Resumable iteration over one set's members, filtered by `pattern`.
    ///
    /// `cursor == 0` starts from the first member; a non-zero cursor is
    /// resolved through the cursor cache, and an evicted (unknown) cursor
    /// simply restarts the scan. Returns the page and the next cursor
    /// (zero when the set is exhausted).
    pub fn zscan(
        &self,
        key: &[u8],
        cursor: i64,
        pattern: &[u8],
        count: i64,
    ) -> Result<(Vec<ScoreMember>, i64)> {
        if cursor < 0 {
            return Ok((Vec::new(), 0));
        }
        let step_length = count.max(1);

        let snapshot = self.db.snapshot();
        let meta = require_live(self.meta_at(&snapshot, key)?)?;
        let version = meta.version();

        let (cursor, start_member) = if cursor == 0 {
            (0, Vec::new())
        } else {
            match self.cursors.start_member(key, pattern, cursor) {
                Some(member) => (cursor, member),
                // Evicted cursor: restart from the beginning.
                None => (0, Vec::new()),
            }
        };

        let prefix = MemberKey::prefix(key, version);
        let mut out = Vec::new();
        let mut rest = step_length;
        let mut iter = snapshot.raw_iterator_cf(self.member_cf()?);
        iter.seek(MemberKey::new(key, version, &start_member).encode());
        while iter.valid() && rest > 0 {
            {
                let Some(raw) = iter.key() else { break };
                if !raw.starts_with(&prefix) {
                    break;
                }
                let parsed = ParsedMemberKey::parse(raw)?;
                let member = parsed.member();
                if string_match(pattern, member) {
                    let score = decode_score_bits(iter.value().unwrap_or_default())?;
                    out.push(ScoreMember::new(score, member));
                }
            }
            rest -= 1;
            iter.next();
        }
        iter.status()?;

        let more_remaining = iter.valid() && iter.key().is_some_and(|k| k.starts_with(&prefix));
        let next_cursor = if more_remaining {
            let next_cursor = cursor + step_length;
            let parsed = ParsedMemberKey::parse(iter.key().unwrap_or_default())?;
            self.cursors
                .store_next_member(key, pattern, next_cursor, parsed.member().to_vec());
            next_cursor
        } else {
            0
        };
        Ok((out, next_cursor))
    }

    /// Debug dump of all three families through `tracing`, one event per
    /// row. Expensive; intended for inspection tooling only.
    pub fn scan_database(&self) -> Result<()> {
        let snapshot = self.db.snapshot();
        let now = unix_seconds();

        let mut read_opts = ReadOptions::default();
        read_opts.fill_cache(false);
        let mut iter = snapshot.raw_iterator_cf_opt(self.meta_cf()?, read_opts);
        iter.seek_to_first();
        while iter.valid() {
            {
                let (Some(raw_key), Some(value)) = (iter.key(), iter.value()) else {
                    break;
                };
                let meta = MetaValue::decode(value)?;
                let survival = if meta.timestamp() != 0 {
                    (i64::from(meta.timestamp()) - now).max(-1)
                } else {
                    0
                };
                tracing::debug!(
                    key = %String::from_utf8_lossy(raw_key),
                    count = meta.count(),
                    version = meta.version(),
                    timestamp = meta.timestamp(),
                    survival_seconds = survival,
                    "meta row"
                );
            }
            iter.next();
        }
        iter.status()?;

        let mut read_opts = ReadOptions::default();
        read_opts.fill_cache(false);
        let mut iter = snapshot.raw_iterator_cf_opt(self.member_cf()?, read_opts);
        iter.seek_to_first();
        while iter.valid() {
            {
                let (Some(raw_key), Some(value)) = (iter.key(), iter.value()) else {
                    break;
                };
                let parsed = ParsedMemberKey::parse(raw_key)?;
                tracing::debug!(
                    key = %String::from_utf8_lossy(parsed.user_key()),
                    member = %String::from_utf8_lossy(parsed.member()),
                    score = decode_score_bits(value)?,
                    version = parsed.version(),
                    "member row"
                );
            }
            iter.next();
        }
        iter.status()?;

        let mut read_opts = ReadOptions::default();
        read_opts.fill_cache(false);
        let mut iter = snapshot.raw_iterator_cf_opt(self.score_cf()?, read_opts);
        iter.seek_to_first();
        while iter.valid() {
            {
                let Some(raw_key) = iter.key() else { break };
                let parsed = ParsedScoreKey::parse(raw_key)?;
                tracing::debug!(
                    key = %String::from_utf8_lossy(parsed.user_key()),
                    score = parsed.score(),
                    member = %String::from_utf8_lossy(parsed.member()),
                    version = parsed.version(),
                    "score row"
                );
            }
            iter.next();
        }
        iter.status()?;
        Ok(())
    }
}
