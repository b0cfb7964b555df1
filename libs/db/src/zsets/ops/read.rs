//! Point and range reads.
//!
//! Every reader takes a snapshot before touching the meta row and carries
//! it through all subsequent iteration, so the meta, member, and score
//! families are seen at one consistent point in time. Readers never take
//! the per-key lock.
//!
//! Scans are bounded by iterator validity plus a parsed
//! `(user key, version)` check on every row — never by the meta's member
//! count, which can disagree with the physical row set while compaction
//! has not caught up.

use crate::error::{Error, Result};
use crate::zsets::ops::{normalize_rank_range, require_live, LexInterval, ScoreInterval};
use crate::zsets::schema::{
    decode_score_bits, unix_seconds, MemberKey, ParsedMemberKey, ParsedScoreKey, ScoreKey,
};
use crate::zsets::{ScoreMember, ZSets};

impl ZSets {
    /// Member count of the set, or `NotFound` when absent, empty, or stale.
    pub fn zcard(&self, key: &[u8]) -> Result<u32> {
        let meta = require_live(self.meta(key)?)?;
        Ok(meta.count())
    }

    /// Score associated with `member`.
    pub fn zscore(&self, key: &[u8], member: &[u8]) -> Result<f64> {
        let snapshot = self.db.snapshot();
        let meta = require_live(self.meta_at(&snapshot, key)?)?;
        let member_key = MemberKey::new(key, meta.version(), member).encode();
        match snapshot.get_cf(self.member_cf()?, &member_key)? {
            Some(raw) => decode_score_bits(&raw),
            None => Err(Error::not_found()),
        }
    }

    /// Number of members whose score lies within the interval.
    pub fn zcount(
        &self,
        key: &[u8],
        min: f64,
        max: f64,
        left_close: bool,
        right_close: bool,
    ) -> Result<usize> {
        let interval = ScoreInterval::new(min, max, left_close, right_close);
        let snapshot = self.db.snapshot();
        let meta = require_live(self.meta_at(&snapshot, key)?)?;
        let version = meta.version();

        let mut count = 0;
        let mut iter = snapshot.raw_iterator_cf(self.score_cf()?);
        iter.seek(ScoreKey::seek_min(key, version));
        while iter.valid() {
            {
                let Some(raw) = iter.key() else { break };
                let parsed = ParsedScoreKey::parse(raw)?;
                if !parsed.belongs_to(key, version) {
                    break;
                }
                let score = parsed.score();
                if interval.left_pass(score) && interval.right_pass(score) {
                    count += 1;
                } else if !interval.right_pass(score) {
                    break;
                }
            }
            iter.next();
        }
        iter.status()?;
        Ok(count)
    }

    /// Inclusive rank slice in `(score asc, member asc)` order. Negative
    /// indices count from the end; an empty normalized range yields an
    /// empty list.
    pub fn zrange(&self, key: &[u8], start: i64, stop: i64) -> Result<Vec<ScoreMember>> {
        let snapshot = self.db.snapshot();
        let meta = require_live(self.meta_at(&snapshot, key)?)?;
        let version = meta.version();
        let Some((start_index, stop_index)) = normalize_rank_range(start, stop, meta.count())
        else {
            return Ok(Vec::new());
        };

        let mut out = Vec::with_capacity((stop_index - start_index + 1) as usize);
        let mut cur_index = 0i64;
        let mut iter = snapshot.raw_iterator_cf(self.score_cf()?);
        iter.seek(ScoreKey::seek_min(key, version));
        while iter.valid() && cur_index <= stop_index {
            {
                let Some(raw) = iter.key() else { break };
                let parsed = ParsedScoreKey::parse(raw)?;
                if !parsed.belongs_to(key, version) {
                    break;
                }
                if cur_index >= start_index {
                    out.push(ScoreMember::new(parsed.score(), parsed.member()));
                }
            }
            iter.next();
            cur_index += 1;
        }
        iter.status()?;
        Ok(out)
    }

    /// The same rank slice as [`ZSets::zrange`], read back in reverse:
    /// `zrevrange(a, b)` is pointwise `reverse(zrange(a, b))`.
    pub fn zrevrange(&self, key: &[u8], start: i64, stop: i64) -> Result<Vec<ScoreMember>> {
        let mut out = self.zrange(key, start, stop)?;
        out.reverse();
        Ok(out)
    }

    /// Members whose score lies within the interval, ascending.
    pub fn zrangebyscore(
        &self,
        key: &[u8],
        min: f64,
        max: f64,
        left_close: bool,
        right_close: bool,
    ) -> Result<Vec<ScoreMember>> {
        let interval = ScoreInterval::new(min, max, left_close, right_close);
        let snapshot = self.db.snapshot();
        let meta = require_live(self.meta_at(&snapshot, key)?)?;
        let version = meta.version();

        let mut out = Vec::new();
        let mut iter = snapshot.raw_iterator_cf(self.score_cf()?);
        iter.seek(ScoreKey::seek_min(key, version));
        while iter.valid() {
            {
                let Some(raw) = iter.key() else { break };
                let parsed = ParsedScoreKey::parse(raw)?;
                if !parsed.belongs_to(key, version) {
                    break;
                }
                let score = parsed.score();
                if interval.left_pass(score) && interval.right_pass(score) {
                    out.push(ScoreMember::new(score, parsed.member()));
                }
                if !interval.right_pass(score) {
                    break;
                }
            }
            iter.next();
        }
        iter.status()?;
        Ok(out)
    }

    /// Members whose score lies within the interval, descending.
    pub fn zrevrangebyscore(
        &self,
        key: &[u8],
        min: f64,
        max: f64,
        left_close: bool,
        right_close: bool,
    ) -> Result<Vec<ScoreMember>> {
        let interval = ScoreInterval::new(min, max, left_close, right_close);
        let snapshot = self.db.snapshot();
        let meta = require_live(self.meta_at(&snapshot, key)?)?;
        let version = meta.version();

        let mut out = Vec::new();
        let mut iter = snapshot.raw_iterator_cf(self.score_cf()?);
        iter.seek_for_prev(ScoreKey::upper_sentinel(key, version));
        while iter.valid() {
            {
                let Some(raw) = iter.key() else { break };
                let parsed = ParsedScoreKey::parse(raw)?;
                if !parsed.belongs_to(key, version) {
                    break;
                }
                let score = parsed.score();
                if interval.left_pass(score) && interval.right_pass(score) {
                    out.push(ScoreMember::new(score, parsed.member()));
                }
                if !interval.left_pass(score) {
                    break;
                }
            }
            iter.prev();
        }
        iter.status()?;
        Ok(out)
    }

    /// 0-based rank of `member` in ascending order.
    pub fn zrank(&self, key: &[u8], member: &[u8]) -> Result<usize> {
        let snapshot = self.db.snapshot();
        let meta = require_live(self.meta_at(&snapshot, key)?)?;
        let version = meta.version();

        let mut index = 0usize;
        let mut iter = snapshot.raw_iterator_cf(self.score_cf()?);
        iter.seek(ScoreKey::seek_min(key, version));
        while iter.valid() {
            {
                let Some(raw) = iter.key() else { break };
                let parsed = ParsedScoreKey::parse(raw)?;
                if !parsed.belongs_to(key, version) {
                    break;
                }
                if parsed.member() == member {
                    iter.status()?;
                    return Ok(index);
                }
            }
            iter.next();
            index += 1;
        }
        iter.status()?;
        Err(Error::not_found())
    }

    /// 0-based rank of `member` in descending order.
    pub fn zrevrank(&self, key: &[u8], member: &[u8]) -> Result<usize> {
        let snapshot = self.db.snapshot();
        let meta = require_live(self.meta_at(&snapshot, key)?)?;
        let version = meta.version();

        let mut rev_index = 0usize;
        let mut left = meta.count();
        let mut iter = snapshot.raw_iterator_cf(self.score_cf()?);
        iter.seek_for_prev(ScoreKey::upper_sentinel(key, version));
        while iter.valid() && left > 0 {
            {
                let Some(raw) = iter.key() else { break };
                let parsed = ParsedScoreKey::parse(raw)?;
                if !parsed.belongs_to(key, version) {
                    break;
                }
                if parsed.member() == member {
                    iter.status()?;
                    return Ok(rev_index);
                }
            }
            iter.prev();
            rev_index += 1;
            left -= 1;
        }
        iter.status()?;
        Err(Error::not_found())
    }

    /// Members within the lexicographic interval, ascending. The bounds
    /// `-` and `+` denote the unbounded ends of the member axis.
    pub fn zrangebylex(
        &self,
        key: &[u8],
        min: &[u8],
        max: &[u8],
        left_close: bool,
        right_close: bool,
    ) -> Result<Vec<Vec<u8>>> {
        let interval = LexInterval::new(min, max, left_close, right_close);
        let snapshot = self.db.snapshot();
        let meta = require_live(self.meta_at(&snapshot, key)?)?;
        let version = meta.version();

        let mut out = Vec::new();
        let mut iter = snapshot.raw_iterator_cf(self.member_cf()?);
        iter.seek(MemberKey::prefix(key, version));
        while iter.valid() {
            {
                let Some(raw) = iter.key() else { break };
                let parsed = ParsedMemberKey::parse(raw)?;
                if !parsed.belongs_to(key, version) {
                    break;
                }
                let member = parsed.member();
                if interval.left_pass(member) && interval.right_pass(member) {
                    out.push(member.to_vec());
                }
                if !interval.right_pass(member) {
                    break;
                }
            }
            iter.next();
        }
        iter.status()?;
        Ok(out)
    }

    /// Cardinality of [`ZSets::zrangebylex`] over the same interval.
    pub fn zlexcount(
        &self,
        key: &[u8],
        min: &[u8],
        max: &[u8],
        left_close: bool,
        right_close: bool,
    ) -> Result<usize> {
        Ok(self.zrangebylex(key, min, max, left_close, right_close)?.len())
    }

    /// Remaining time to live in seconds: `-2` when absent or stale, `-1`
    /// when no expiry is set (or it is already past), else the remainder.
    pub fn ttl(&self, key: &[u8]) -> Result<i64> {
        match self.meta(key)? {
            None => Ok(-2),
            Some(meta) if meta.is_stale() => Ok(-2),
            Some(meta) if meta.timestamp() == 0 => Ok(-1),
            Some(meta) => {
                let remaining = i64::from(meta.timestamp()) - unix_seconds();
                Ok(if remaining > 0 { remaining } else { -1 })
            }
        }
    }
}
