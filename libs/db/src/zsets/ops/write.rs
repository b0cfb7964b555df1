//! Single-key mutations.
//!
//! Every operation here follows one template: take the per-key record
//! lock, read the current meta, branch on liveness, stage updates to all
//! three families in one `WriteBatch`, commit. Readers observe either none
//! or all of a batch.
//!
//! A stale meta is an opportunity for `zadd`/`zincrby` to reincarnate the
//! key: the slot is reset to an empty set with a fresh version, and the
//! previous generation's rows are left behind for the compaction filters.

use std::collections::HashSet;

use rocksdb::WriteBatch;

use crate::error::{Error, Result};
use crate::zsets::ops::{normalize_rank_range, reject_nan, require_live, LexInterval, ScoreInterval};
use crate::zsets::schema::{
    decode_score_bits, encode_score_bits, MemberKey, MetaValue, ParsedMemberKey, ParsedScoreKey,
    ScoreKey,
};
use crate::zsets::{ScoreMember, ZSets};

impl ZSets {
    /// Insert or update the given `(score, member)` pairs. Returns the
    /// number of members that did not exist before. Duplicate members in
    /// the input are deduplicated keeping the first occurrence.
    pub fn zadd(&self, key: &[u8], score_members: &[ScoreMember]) -> Result<usize> {
        let mut seen = HashSet::new();
        let mut filtered = Vec::with_capacity(score_members.len());
        for sm in score_members {
            reject_nan(sm.score)?;
            if seen.insert(sm.member.as_slice()) {
                filtered.push(sm);
            }
        }

        let meta_cf = self.meta_cf()?;
        let member_cf = self.member_cf()?;
        let score_cf = self.score_cf()?;

        let mut batch = WriteBatch::default();
        let _lock = self.lock_mgr.lock(key);
        match self.meta(key)? {
            Some(mut meta) => {
                // A stale meta reincarnates: fresh version, logically empty
                // set, so no member existence checks are needed.
                let (version, is_stale) = if meta.is_stale() {
                    (meta.initial_meta_value(), true)
                } else {
                    (meta.version(), false)
                };

                let mut inserted = 0i64;
                for sm in &filtered {
                    let member_key = MemberKey::new(key, version, &sm.member).encode();
                    let mut not_found = true;
                    if !is_stale {
                        if let Some(raw) = self.db.get_cf(member_cf, &member_key)? {
                            not_found = false;
                            let old_score = decode_score_bits(&raw)?;
                            if old_score == sm.score {
                                continue;
                            }
                            batch.delete_cf(
                                score_cf,
                                ScoreKey::new(key, version, old_score, &sm.member).encode(),
                            );
                        }
                    }
                    batch.put_cf(member_cf, &member_key, encode_score_bits(sm.score));
                    batch.put_cf(
                        score_cf,
                        ScoreKey::new(key, version, sm.score, &sm.member).encode(),
                        b"",
                    );
                    if not_found {
                        inserted += 1;
                    }
                }
                meta.modify_count(inserted);
                batch.put_cf(meta_cf, key, meta.encode());
                self.db.write(batch)?;
                Ok(inserted as usize)
            }
            None => {
                let mut meta = MetaValue::new(filtered.len() as u32);
                let version = meta.update_version();
                batch.put_cf(meta_cf, key, meta.encode());
                for sm in &filtered {
                    batch.put_cf(
                        member_cf,
                        MemberKey::new(key, version, &sm.member).encode(),
                        encode_score_bits(sm.score),
                    );
                    batch.put_cf(
                        score_cf,
                        ScoreKey::new(key, version, sm.score, &sm.member).encode(),
                        b"",
                    );
                }
                tracing::debug!(
                    key = %String::from_utf8_lossy(key),
                    members = filtered.len(),
                    "created sorted set"
                );
                self.db.write(batch)?;
                Ok(filtered.len())
            }
        }
    }

    /// Add `delta` to `member`'s score, creating the member (and the set)
    /// when absent. Returns the resulting score.
    pub fn zincrby(&self, key: &[u8], member: &[u8], delta: f64) -> Result<f64> {
        reject_nan(delta)?;

        let meta_cf = self.meta_cf()?;
        let member_cf = self.member_cf()?;
        let score_cf = self.score_cf()?;

        let mut batch = WriteBatch::default();
        let _lock = self.lock_mgr.lock(key);
        let score;
        let version;
        match self.meta(key)? {
            Some(mut meta) => {
                version = if meta.is_stale() {
                    meta.initial_meta_value()
                } else {
                    meta.version()
                };
                let member_key = MemberKey::new(key, version, member).encode();
                match self.db.get_cf(member_cf, &member_key)? {
                    Some(raw) => {
                        let old_score = decode_score_bits(&raw)?;
                        score = old_score + delta;
                        reject_nan(score)?;
                        batch.delete_cf(
                            score_cf,
                            ScoreKey::new(key, version, old_score, member).encode(),
                        );
                    }
                    None => {
                        score = delta;
                        meta.modify_count(1);
                        batch.put_cf(meta_cf, key, meta.encode());
                    }
                }
            }
            None => {
                let mut meta = MetaValue::new(1);
                version = meta.update_version();
                batch.put_cf(meta_cf, key, meta.encode());
                score = delta;
            }
        }

        batch.put_cf(
            member_cf,
            MemberKey::new(key, version, member).encode(),
            encode_score_bits(score),
        );
        batch.put_cf(
            score_cf,
            ScoreKey::new(key, version, score, member).encode(),
            b"",
        );
        self.db.write(batch)?;
        Ok(score)
    }

    /// Remove the given members. Returns how many were actually present.
    /// Duplicates in the input are deduplicated.
    pub fn zrem(&self, key: &[u8], members: &[&[u8]]) -> Result<usize> {
        let mut seen = HashSet::new();
        let mut filtered = Vec::with_capacity(members.len());
        for &member in members {
            if seen.insert(member) {
                filtered.push(member);
            }
        }

        let meta_cf = self.meta_cf()?;
        let member_cf = self.member_cf()?;
        let score_cf = self.score_cf()?;

        let mut batch = WriteBatch::default();
        let _lock = self.lock_mgr.lock(key);
        let mut meta = require_live(self.meta(key)?)?;
        let version = meta.version();

        let mut removed = 0i64;
        for member in filtered {
            let member_key = MemberKey::new(key, version, member).encode();
            if let Some(raw) = self.db.get_cf(member_cf, &member_key)? {
                let score = decode_score_bits(&raw)?;
                batch.delete_cf(member_cf, &member_key);
                batch.delete_cf(score_cf, ScoreKey::new(key, version, score, member).encode());
                removed += 1;
            }
        }
        meta.modify_count(-removed);
        batch.put_cf(meta_cf, key, meta.encode());
        self.db.write(batch)?;
        Ok(removed as usize)
    }

    /// Remove the inclusive rank slice `[start, stop]` (negative indices
    /// count from the end). Returns the number of members removed.
    pub fn zremrangebyrank(&self, key: &[u8], start: i64, stop: i64) -> Result<usize> {
        let meta_cf = self.meta_cf()?;
        let member_cf = self.member_cf()?;
        let score_cf = self.score_cf()?;

        let mut batch = WriteBatch::default();
        let _lock = self.lock_mgr.lock(key);
        let mut meta = require_live(self.meta(key)?)?;
        let version = meta.version();
        let Some((start_index, stop_index)) = normalize_rank_range(start, stop, meta.count())
        else {
            return Ok(0);
        };

        let mut removed = 0i64;
        let mut cur_index = 0i64;
        let mut iter = self.db.raw_iterator_cf(score_cf);
        iter.seek(ScoreKey::seek_min(key, version));
        while iter.valid() && cur_index <= stop_index {
            {
                let Some(raw) = iter.key() else { break };
                let parsed = ParsedScoreKey::parse(raw)?;
                if !parsed.belongs_to(key, version) {
                    break;
                }
                if cur_index >= start_index {
                    batch.delete_cf(
                        member_cf,
                        MemberKey::new(key, version, parsed.member()).encode(),
                    );
                    batch.delete_cf(score_cf, raw);
                    removed += 1;
                }
            }
            iter.next();
            cur_index += 1;
        }
        iter.status()?;

        meta.modify_count(-removed);
        batch.put_cf(meta_cf, key, meta.encode());
        self.db.write(batch)?;
        Ok(removed as usize)
    }

    /// Remove every member whose score lies within the interval.
    pub fn zremrangebyscore(
        &self,
        key: &[u8],
        min: f64,
        max: f64,
        left_close: bool,
        right_close: bool,
    ) -> Result<usize> {
        let interval = ScoreInterval::new(min, max, left_close, right_close);

        let meta_cf = self.meta_cf()?;
        let member_cf = self.member_cf()?;
        let score_cf = self.score_cf()?;

        let mut batch = WriteBatch::default();
        let _lock = self.lock_mgr.lock(key);
        let mut meta = require_live(self.meta(key)?)?;
        let version = meta.version();

        let mut removed = 0i64;
        let mut iter = self.db.raw_iterator_cf(score_cf);
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
                    batch.delete_cf(
                        member_cf,
                        MemberKey::new(key, version, parsed.member()).encode(),
                    );
                    batch.delete_cf(score_cf, raw);
                    removed += 1;
                }
                if !interval.right_pass(score) {
                    break;
                }
            }
            iter.next();
        }
        iter.status()?;

        meta.modify_count(-removed);
        batch.put_cf(meta_cf, key, meta.encode());
        self.db.write(batch)?;
        Ok(removed as usize)
    }

    /// Remove every member within the lexicographic interval (`-` / `+`
    /// bounds denote the unbounded ends).
    pub fn zremrangebylex(
        &self,
        key: &[u8],
        min: &[u8],
        max: &[u8],
        left_close: bool,
        right_close: bool,
    ) -> Result<usize> {
        let interval = LexInterval::new(min, max, left_close, right_close);

        let meta_cf = self.meta_cf()?;
        let member_cf = self.member_cf()?;
        let score_cf = self.score_cf()?;

        let mut batch = WriteBatch::default();
        let _lock = self.lock_mgr.lock(key);
        let mut meta = require_live(self.meta(key)?)?;
        let version = meta.version();

        let mut removed = 0i64;
        let mut iter = self.db.raw_iterator_cf(member_cf);
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
                    // The member row's value carries the score; rebuild the
                    // score key from it.
                    let score = decode_score_bits(iter.value().unwrap_or_default())?;
                    batch.delete_cf(member_cf, raw);
                    batch.delete_cf(score_cf, ScoreKey::new(key, version, score, member).encode());
                    removed += 1;
                }
                if !interval.right_pass(member) {
                    break;
                }
            }
            iter.next();
        }
        iter.status()?;

        if removed > 0 {
            meta.modify_count(-removed);
            batch.put_cf(meta_cf, key, meta.encode());
        }
        self.db.write(batch)?;
        Ok(removed as usize)
    }

    /// Set the expiry `ttl` seconds from now. A non-positive `ttl`
    /// collapses the set immediately (fresh version, zero members).
    pub fn expire(&self, key: &[u8], ttl: i32) -> Result<()> {
        let meta_cf = self.meta_cf()?;
        let _lock = self.lock_mgr.lock(key);
        let mut meta = self.meta(key)?.ok_or_else(Error::not_found)?;
        if meta.is_stale() {
            return Err(Error::not_found());
        }
        if ttl > 0 {
            meta.set_relative_timestamp(ttl);
        } else {
            meta.initial_meta_value();
        }
        self.db.put_cf(meta_cf, key, meta.encode())?;
        Ok(())
    }

    /// Set an absolute unix-seconds expiry.
    pub fn expireat(&self, key: &[u8], timestamp: i32) -> Result<()> {
        let meta_cf = self.meta_cf()?;
        let _lock = self.lock_mgr.lock(key);
        let mut meta = self.meta(key)?.ok_or_else(Error::not_found)?;
        if meta.is_stale() {
            return Err(Error::stale());
        }
        meta.set_timestamp(timestamp);
        self.db.put_cf(meta_cf, key, meta.encode())?;
        Ok(())
    }

    /// Clear the expiry, if one is set.
    pub fn persist(&self, key: &[u8]) -> Result<()> {
        let meta_cf = self.meta_cf()?;
        let _lock = self.lock_mgr.lock(key);
        let mut meta = self.meta(key)?.ok_or_else(Error::not_found)?;
        if meta.is_stale() {
            return Err(Error::stale());
        }
        if meta.timestamp() == 0 {
            return Err(Error::NotFound {
                reason: Some("no associated timeout"),
            });
        }
        meta.set_timestamp(0);
        self.db.put_cf(meta_cf, key, meta.encode())?;
        Ok(())
    }

    /// Logically drop the set: reset the meta to an empty record with a
    /// fresh version. The data rows stay behind for compaction to reclaim.
    pub fn del(&self, key: &[u8]) -> Result<()> {
        let meta_cf = self.meta_cf()?;
        let _lock = self.lock_mgr.lock(key);
        let mut meta = require_live(self.meta(key)?)?;
        meta.initial_meta_value();
        tracing::debug!(key = %String::from_utf8_lossy(key), "logically deleted sorted set");
        self.db.put_cf(meta_cf, key, meta.encode())?;
        Ok(())
    }
}
