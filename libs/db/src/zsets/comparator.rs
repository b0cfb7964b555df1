//! Total order for the score index.
//!
//! RocksDB compares keys bytewise by default, which would interleave
//! different sets' rows and put scores in bit-pattern order. The score
//! family instead installs this comparator:
//!
//! 1. user key, raw bytes
//! 2. version, as a signed integer
//! 3. score, numerically (`-0.0` and `+0.0` compare equal)
//! 4. member, raw bytes
//!
//! A key may legally end right after the version — reverse scans seek with
//! such bare-prefix sentinels. A key that ends before the other sorts
//! first, the same way memcmp treats a proper prefix.

use std::cmp::Ordering;

use crate::encoding::decode_fixed32;
use crate::zsets::schema::decode_score;

/// Compare two score-index keys. Installed on `score_cf` at open.
pub fn compare_score_keys(a: &[u8], b: &[u8]) -> Ordering {
    let (Some(a), Some(b)) = (split(a), split(b)) else {
        // Malformed inputs never come from the engine; stay total anyway.
        return fallback(a, b);
    };

    a.user_key
        .cmp(b.user_key)
        .then_with(|| a.version.cmp(&b.version))
        .then_with(|| compare_suffix(a.suffix, b.suffix))
}

struct SplitKey<'a> {
    user_key: &'a [u8],
    version: i32,
    /// `score | member`, possibly empty for seek sentinels.
    suffix: &'a [u8],
}

fn split(raw: &[u8]) -> Option<SplitKey<'_>> {
    let key_len = decode_fixed32(raw).ok()? as usize;
    let suffix_start = 4 + key_len + 4;
    if raw.len() < suffix_start {
        return None;
    }
    let version = decode_fixed32(&raw[4 + key_len..]).ok()? as i32;
    Some(SplitKey {
        user_key: &raw[4..4 + key_len],
        version,
        suffix: &raw[suffix_start..],
    })
}

fn compare_suffix(a: &[u8], b: &[u8]) -> Ordering {
    match (a.is_empty(), b.is_empty()) {
        (true, true) => return Ordering::Equal,
        (true, false) => return Ordering::Less,
        (false, true) => return Ordering::Greater,
        (false, false) => {}
    }
    let (Ok(score_a), Ok(score_b)) = (decode_score(a), decode_score(b)) else {
        return a.cmp(b);
    };
    if score_a == score_b {
        // Covers -0.0 == +0.0; members break the tie.
        return a[8..].cmp(&b[8..]);
    }
    score_a.total_cmp(&score_b)
}

fn fallback(a: &[u8], b: &[u8]) -> Ordering {
    a.cmp(b)
}
