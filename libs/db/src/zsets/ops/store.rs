//! Set algebra: union and intersection stored into a destination key.
//!
//! Sources are read under one snapshot; only the destination takes a
//! record lock. The destination is overwritten wholesale — its meta gets a
//! fresh version, so any previous contents become compaction garbage, and
//! the new rows land in the same atomic batch as the meta.

use std::collections::BTreeMap;

use rocksdb::{Snapshot, WriteBatch};

use crate::error::{Error, Result};
use crate::zsets::ops::reject_nan;
use crate::zsets::schema::{
    decode_score_bits, encode_score_bits, MemberKey, MetaValue, ParsedScoreKey, ScoreKey, Version,
};
use crate::zsets::{Aggregate, ScoreMember, ZSets};

/// Set-algebra outputs fold `-0.0` into `+0.0`.
fn normalize_zero(score: f64) -> f64 {
    if score == 0.0 {
        0.0
    } else {
        score
    }
}

impl ZSets {
    /// Union of `keys`, each scaled by its weight (default 1), aggregated
    /// per member, stored into `destination`. Missing sources contribute
    /// nothing. Returns the resulting cardinality.
    pub fn zunionstore(
        &self,
        destination: &[u8],
        keys: &[&[u8]],
        weights: &[f64],
        agg: Aggregate,
    ) -> Result<usize> {
        let snapshot = self.db.snapshot();
        let _lock = self.lock_mgr.lock(destination);

        let mut acc: BTreeMap<Vec<u8>, f64> = BTreeMap::new();
        for (idx, &source) in keys.iter().enumerate() {
            let Some(meta) = self.meta_at(&snapshot, source)? else {
                continue;
            };
            if meta.is_stale() || meta.count() == 0 {
                continue;
            }
            let version = meta.version();
            let weight = weights.get(idx).copied().unwrap_or(1.0);

            let mut iter = snapshot.raw_iterator_cf(self.score_cf()?);
            iter.seek(ScoreKey::seek_min(source, version));
            while iter.valid() {
                {
                    let Some(raw) = iter.key() else { break };
                    let parsed = ParsedScoreKey::parse(raw)?;
                    if !parsed.belongs_to(source, version) {
                        break;
                    }
                    let weighted = weight * parsed.score();
                    let score = match acc.get(parsed.member()) {
                        None => weighted,
                        Some(&prev) => agg.combine(prev, weighted),
                    };
                    reject_nan(score)?;
                    acc.insert(parsed.member().to_vec(), normalize_zero(score));
                }
                iter.next();
            }
            iter.status()?;
        }

        let entries: Vec<(Vec<u8>, f64)> = acc.into_iter().collect();
        tracing::debug!(
            destination = %String::from_utf8_lossy(destination),
            sources = keys.len(),
            cardinality = entries.len(),
            "zunionstore"
        );
        self.overwrite_destination(&snapshot, destination, &entries)
    }

    /// Intersection of `keys` (at least one required), weighted and
    /// aggregated as in [`ZSets::zunionstore`]. If any source is absent,
    /// stale, or empty the result is empty — but the destination is still
    /// overwritten. Returns the resulting cardinality.
    pub fn zinterstore(
        &self,
        destination: &[u8],
        keys: &[&[u8]],
        weights: &[f64],
        agg: Aggregate,
    ) -> Result<usize> {
        if keys.is_empty() {
            return Err(Error::Corruption(
                "zinterstore requires at least one source key".to_string(),
            ));
        }

        let snapshot = self.db.snapshot();
        let _lock = self.lock_mgr.lock(destination);

        let mut sources: Vec<(&[u8], Version)> = Vec::with_capacity(keys.len());
        let mut have_invalid = false;
        for &source in keys {
            match self.meta_at(&snapshot, source)? {
                Some(meta) if !meta.is_stale() && meta.count() != 0 => {
                    sources.push((source, meta.version()));
                }
                _ => have_invalid = true,
            }
        }

        let mut entries: Vec<(Vec<u8>, f64)> = Vec::new();
        if !have_invalid {
            // Seed candidates from the first source, then probe the member
            // index of every other source; a miss anywhere drops the
            // candidate.
            let (first_key, first_version) = sources[0];
            let first_weight = weights.first().copied().unwrap_or(1.0);

            let mut candidates: Vec<ScoreMember> = Vec::new();
            let mut iter = snapshot.raw_iterator_cf(self.score_cf()?);
            iter.seek(ScoreKey::seek_min(first_key, first_version));
            while iter.valid() {
                {
                    let Some(raw) = iter.key() else { break };
                    let parsed = ParsedScoreKey::parse(raw)?;
                    if !parsed.belongs_to(first_key, first_version) {
                        break;
                    }
                    candidates.push(ScoreMember::new(parsed.score(), parsed.member()));
                }
                iter.next();
            }
            iter.status()?;

            for candidate in candidates {
                let mut score = first_weight * candidate.score;
                let mut in_all = true;
                for (idx, (source, version)) in sources.iter().enumerate().skip(1) {
                    let weight = weights.get(idx).copied().unwrap_or(1.0);
                    let member_key =
                        MemberKey::new(source, *version, &candidate.member).encode();
                    match snapshot.get_cf(self.member_cf()?, &member_key)? {
                        Some(raw) => {
                            score = agg.combine(score, weight * decode_score_bits(&raw)?);
                        }
                        None => {
                            in_all = false;
                            break;
                        }
                    }
                }
                if in_all {
                    reject_nan(score)?;
                    entries.push((candidate.member, normalize_zero(score)));
                }
            }
        }

        tracing::debug!(
            destination = %String::from_utf8_lossy(destination),
            sources = keys.len(),
            cardinality = entries.len(),
            "zinterstore"
        );
        self.overwrite_destination(&snapshot, destination, &entries)
    }

    /// Replace `destination` with exactly `entries`: reuse (or create) its
    /// meta slot with a fresh version and stage every row in one batch.
    fn overwrite_destination(
        &self,
        snapshot: &Snapshot<'_>,
        destination: &[u8],
        entries: &[(Vec<u8>, f64)],
    ) -> Result<usize> {
        let meta_cf = self.meta_cf()?;
        let member_cf = self.member_cf()?;
        let score_cf = self.score_cf()?;

        let mut batch = WriteBatch::default();
        let version = match self.meta_at(snapshot, destination)? {
            Some(mut meta) => {
                let version = meta.initial_meta_value();
                meta.set_count(entries.len() as u32);
                batch.put_cf(meta_cf, destination, meta.encode());
                version
            }
            None => {
                let mut meta = MetaValue::new(entries.len() as u32);
                let version = meta.update_version();
                batch.put_cf(meta_cf, destination, meta.encode());
                version
            }
        };

        for (member, score) in entries {
            batch.put_cf(
                member_cf,
                MemberKey::new(destination, version, member).encode(),
                encode_score_bits(*score),
            );
            batch.put_cf(
                score_cf,
                ScoreKey::new(destination, version, *score, member).encode(),
                b"",
            );
        }
        self.db.write(batch)?;
        Ok(entries.len())
    }
}
