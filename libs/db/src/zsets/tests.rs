use rand::seq::SliceRandom;
use tempfile::TempDir;

use crate::storage::Config;
use crate::zsets::schema::{ParsedMemberKey, ParsedScoreKey};
use crate::zsets::{Aggregate, ScoreMember, ZSets};

fn open_store() -> (TempDir, ZSets) {
    let dir = TempDir::new().unwrap();
    let zs = ZSets::open(dir.path().join("zsets_db"), Config::default()).unwrap();
    (dir, zs)
}

fn sm(score: f64, member: &str) -> ScoreMember {
    ScoreMember::new(score, member)
}

fn members_of(range: &[ScoreMember]) -> Vec<&str> {
    range
        .iter()
        .map(|sm| std::str::from_utf8(&sm.member).unwrap())
        .collect()
}

/// Rows in the member index, as `(user_key, version, member, score)`.
fn member_rows(zs: &ZSets) -> Vec<(Vec<u8>, i32, Vec<u8>, f64)> {
    let mut rows = Vec::new();
    let mut iter = zs.db.raw_iterator_cf(zs.member_cf().unwrap());
    iter.seek_to_first();
    while iter.valid() {
        let parsed = ParsedMemberKey::parse(iter.key().unwrap()).unwrap();
        let score = crate::zsets::schema::decode_score_bits(iter.value().unwrap()).unwrap();
        rows.push((
            parsed.user_key().to_vec(),
            parsed.version(),
            parsed.member().to_vec(),
            score,
        ));
        iter.next();
    }
    rows
}

/// Rows in the score index, as `(user_key, version, score, member)`.
fn score_rows(zs: &ZSets) -> Vec<(Vec<u8>, i32, f64, Vec<u8>)> {
    let mut rows = Vec::new();
    let mut iter = zs.db.raw_iterator_cf(zs.score_cf().unwrap());
    iter.seek_to_first();
    while iter.valid() {
        let parsed = ParsedScoreKey::parse(iter.key().unwrap()).unwrap();
        rows.push((
            parsed.user_key().to_vec(),
            parsed.version(),
            parsed.score(),
            parsed.member().to_vec(),
        ));
        iter.next();
    }
    rows
}

// ============================================================================
// zadd / zcard / zscore / zincrby
// ============================================================================

#[test]
fn test_zadd_creates_set() {
    let (_dir, zs) = open_store();
    let added = zs
        .zadd(b"z", &[sm(1.0, "a"), sm(2.0, "b"), sm(3.0, "c")])
        .unwrap();
    assert_eq!(added, 3);
    assert_eq!(zs.zcard(b"z").unwrap(), 3);
    assert_eq!(
        zs.zrange(b"z", 0, -1).unwrap(),
        vec![sm(1.0, "a"), sm(2.0, "b"), sm(3.0, "c")]
    );
}

#[test]
fn test_zadd_dedups_input_keeping_first() {
    let (_dir, zs) = open_store();
    let added = zs.zadd(b"z", &[sm(1.0, "a"), sm(9.0, "a")]).unwrap();
    assert_eq!(added, 1);
    assert_eq!(zs.zscore(b"z", b"a").unwrap(), 1.0);
}

#[test]
fn test_zadd_update_counts_only_new_members() {
    let (_dir, zs) = open_store();
    assert_eq!(zs.zadd(b"z", &[sm(1.0, "a")]).unwrap(), 1);
    assert_eq!(zs.zadd(b"z", &[sm(2.0, "a")]).unwrap(), 0);
    assert_eq!(zs.zscore(b"z", b"a").unwrap(), 2.0);
    assert_eq!(zs.zcard(b"z").unwrap(), 1);
}

#[test]
fn test_zadd_identical_pair_is_idempotent() {
    let (_dir, zs) = open_store();
    assert_eq!(zs.zadd(b"z", &[sm(5.0, "m")]).unwrap(), 1);
    let before = score_rows(&zs);
    assert_eq!(zs.zadd(b"z", &[sm(5.0, "m")]).unwrap(), 0);
    assert_eq!(score_rows(&zs), before);
}

#[test]
fn test_zadd_rejects_nan() {
    let (_dir, zs) = open_store();
    assert!(zs.zadd(b"z", &[sm(f64::NAN, "a")]).is_err());
}

#[test]
fn test_zcard_and_zscore_missing() {
    let (_dir, zs) = open_store();
    assert!(zs.zcard(b"nope").unwrap_err().is_not_found());
    zs.zadd(b"z", &[sm(1.0, "a")]).unwrap();
    assert!(zs.zscore(b"z", b"ghost").unwrap_err().is_not_found());
}

#[test]
fn test_zscore_returns_last_written() {
    let (_dir, zs) = open_store();
    zs.zadd(b"z", &[sm(1.5, "a")]).unwrap();
    zs.zadd(b"z", &[sm(-7.25, "a")]).unwrap();
    assert_eq!(zs.zscore(b"z", b"a").unwrap(), -7.25);
}

#[test]
fn test_zincrby() {
    let (_dir, zs) = open_store();
    assert_eq!(zs.zincrby(b"z", b"a", 2.5).unwrap(), 2.5);
    assert_eq!(zs.zincrby(b"z", b"a", -1.0).unwrap(), 1.5);
    assert_eq!(zs.zcard(b"z").unwrap(), 1);
    assert_eq!(zs.zscore(b"z", b"a").unwrap(), 1.5);

    // New member on an existing set bumps the count.
    assert_eq!(zs.zincrby(b"z", b"b", 4.0).unwrap(), 4.0);
    assert_eq!(zs.zcard(b"z").unwrap(), 2);
}

// ============================================================================
// Range and rank reads
// ============================================================================

#[test]
fn test_member_lex_tiebreak_on_equal_scores() {
    let (_dir, zs) = open_store();
    zs.zadd(b"z", &[sm(5.0, "z"), sm(5.0, "x"), sm(5.0, "y")])
        .unwrap();
    assert_eq!(members_of(&zs.zrange(b"z", 0, -1).unwrap()), ["x", "y", "z"]);
}

#[test]
fn test_zrange_negative_indices_and_clamping() {
    let (_dir, zs) = open_store();
    zs.zadd(b"z", &[sm(1.0, "a"), sm(2.0, "b"), sm(3.0, "c"), sm(4.0, "d")])
        .unwrap();
    assert_eq!(members_of(&zs.zrange(b"z", -2, -1).unwrap()), ["c", "d"]);
    assert_eq!(members_of(&zs.zrange(b"z", 1, 2).unwrap()), ["b", "c"]);
    assert_eq!(members_of(&zs.zrange(b"z", -100, 100).unwrap()), ["a", "b", "c", "d"]);
    assert!(zs.zrange(b"z", 2, 1).unwrap().is_empty());
    assert!(zs.zrange(b"z", 9, 12).unwrap().is_empty());
}

#[test]
fn test_zrevrange_is_pointwise_reverse_of_zrange() {
    let (_dir, zs) = open_store();
    zs.zadd(b"z", &[sm(1.0, "a"), sm(2.0, "b"), sm(3.0, "c"), sm(4.0, "d")])
        .unwrap();
    for (start, stop) in [(0, -1), (1, 2), (-3, -1), (0, 0)] {
        let mut forward = zs.zrange(b"z", start, stop).unwrap();
        forward.reverse();
        assert_eq!(zs.zrevrange(b"z", start, stop).unwrap(), forward);
    }
}

#[test]
fn test_zrangebyscore_bounds() {
    let (_dir, zs) = open_store();
    zs.zadd(b"z", &[sm(1.0, "a"), sm(2.0, "b"), sm(3.0, "c")])
        .unwrap();
    // (1, 3] excludes the left endpoint.
    assert_eq!(
        members_of(&zs.zrangebyscore(b"z", 1.0, 3.0, false, true).unwrap()),
        ["b", "c"]
    );
    assert_eq!(
        members_of(&zs.zrangebyscore(b"z", 1.0, 3.0, true, true).unwrap()),
        ["a", "b", "c"]
    );
    assert_eq!(
        members_of(&zs.zrangebyscore(b"z", 1.0, 3.0, true, false).unwrap()),
        ["a", "b"]
    );
}

#[test]
fn test_zrangebyscore_unbounded_returns_all_in_order() {
    let (_dir, zs) = open_store();
    zs.zadd(
        b"z",
        &[sm(-1e300, "low"), sm(0.0, "mid"), sm(f64::INFINITY, "hi")],
    )
    .unwrap();
    let all = zs
        .zrangebyscore(b"z", f64::NEG_INFINITY, f64::INFINITY, true, true)
        .unwrap();
    assert_eq!(all.len() as u32, zs.zcard(b"z").unwrap());
    assert_eq!(members_of(&all), ["low", "mid", "hi"]);
}

#[test]
fn test_zrevrangebyscore_descending_and_includes_infinite_scores() {
    let (_dir, zs) = open_store();
    zs.zadd(b"z", &[sm(1.0, "a"), sm(2.0, "b"), sm(f64::INFINITY, "top")])
        .unwrap();
    let all = zs
        .zrevrangebyscore(b"z", f64::NEG_INFINITY, f64::INFINITY, true, true)
        .unwrap();
    assert_eq!(members_of(&all), ["top", "b", "a"]);

    let bounded = zs.zrevrangebyscore(b"z", 1.0, 2.0, false, true).unwrap();
    assert_eq!(members_of(&bounded), ["b"]);
}

#[test]
fn test_zcount() {
    let (_dir, zs) = open_store();
    zs.zadd(b"z", &[sm(1.0, "a"), sm(2.0, "b"), sm(3.0, "c")])
        .unwrap();
    assert_eq!(zs.zcount(b"z", 1.0, 3.0, true, true).unwrap(), 3);
    assert_eq!(zs.zcount(b"z", 1.0, 3.0, false, false).unwrap(), 1);
    assert_eq!(
        zs.zcount(b"z", f64::NEG_INFINITY, f64::INFINITY, true, true)
            .unwrap(),
        3
    );
    assert_eq!(zs.zcount(b"z", 10.0, 20.0, true, true).unwrap(), 0);
}

#[test]
fn test_zrank_and_zrevrank() {
    let (_dir, zs) = open_store();
    zs.zadd(b"z", &[sm(1.0, "a"), sm(2.0, "b"), sm(3.0, "c")])
        .unwrap();
    assert_eq!(zs.zrank(b"z", b"a").unwrap(), 0);
    assert_eq!(zs.zrank(b"z", b"c").unwrap(), 2);
    assert_eq!(zs.zrevrank(b"z", b"c").unwrap(), 0);
    assert_eq!(zs.zrevrank(b"z", b"a").unwrap(), 2);
    assert!(zs.zrank(b"z", b"ghost").unwrap_err().is_not_found());
    assert!(zs.zrevrank(b"z", b"ghost").unwrap_err().is_not_found());

    // rank + revrank + 1 == count for every present member.
    let count = zs.zcard(b"z").unwrap() as usize;
    for member in [b"a".as_slice(), b"b", b"c"] {
        let rank = zs.zrank(b"z", member).unwrap();
        let rev = zs.zrevrank(b"z", member).unwrap();
        assert_eq!(rank + rev + 1, count);
    }
}

#[test]
fn test_score_order_is_independent_of_insertion_order() {
    let (_dir, zs) = open_store();
    let mut pairs: Vec<ScoreMember> = (0..64)
        .map(|i| sm(f64::from(i) * 0.5 - 16.0, &format!("m{i:02}")))
        .collect();
    pairs.shuffle(&mut rand::thread_rng());
    zs.zadd(b"z", &pairs).unwrap();

    let ranged = zs.zrange(b"z", 0, -1).unwrap();
    assert_eq!(ranged.len(), 64);
    for window in ranged.windows(2) {
        assert!(
            window[0].score < window[1].score
                || (window[0].score == window[1].score && window[0].member < window[1].member)
        );
    }
}

// ============================================================================
// Lexicographic operations
// ============================================================================

#[test]
fn test_zrangebylex() {
    let (_dir, zs) = open_store();
    zs.zadd(
        b"z",
        &[sm(0.0, "a"), sm(0.0, "b"), sm(0.0, "c"), sm(0.0, "d")],
    )
    .unwrap();
    assert_eq!(
        zs.zrangebylex(b"z", b"-", b"+", true, true).unwrap(),
        vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec(), b"d".to_vec()]
    );
    assert_eq!(
        zs.zrangebylex(b"z", b"b", b"d", true, false).unwrap(),
        vec![b"b".to_vec(), b"c".to_vec()]
    );
    assert_eq!(
        zs.zrangebylex(b"z", b"a", b"c", false, true).unwrap(),
        vec![b"b".to_vec(), b"c".to_vec()]
    );
    assert_eq!(zs.zlexcount(b"z", b"-", b"+", true, true).unwrap(), 4);
    assert_eq!(zs.zlexcount(b"z", b"b", b"c", true, true).unwrap(), 2);
}

#[test]
fn test_zremrangebylex() {
    let (_dir, zs) = open_store();
    zs.zadd(
        b"z",
        &[sm(1.0, "a"), sm(2.0, "b"), sm(3.0, "c"), sm(4.0, "d")],
    )
    .unwrap();
    let removed = zs.zremrangebylex(b"z", b"b", b"c", true, true).unwrap();
    assert_eq!(removed, 2);
    assert_eq!(zs.zcard(b"z").unwrap(), 2);
    assert_eq!(members_of(&zs.zrange(b"z", 0, -1).unwrap()), ["a", "d"]);
    // Score rows must be gone too, not just member rows.
    assert_eq!(
        zs.zcount(b"z", f64::NEG_INFINITY, f64::INFINITY, true, true)
            .unwrap(),
        2
    );
}

// ============================================================================
// Removal
// ============================================================================

#[test]
fn test_zrem() {
    let (_dir, zs) = open_store();
    zs.zadd(b"z", &[sm(1.0, "a"), sm(2.0, "b"), sm(3.0, "c")])
        .unwrap();
    let removed = zs
        .zrem(b"z", &[b"a".as_slice(), b"ghost", b"a", b"c"])
        .unwrap();
    assert_eq!(removed, 2);
    assert_eq!(zs.zcard(b"z").unwrap(), 1);
    assert_eq!(members_of(&zs.zrange(b"z", 0, -1).unwrap()), ["b"]);
}

#[test]
fn test_zremrangebyrank() {
    let (_dir, zs) = open_store();
    zs.zadd(
        b"z",
        &[sm(1.0, "a"), sm(2.0, "b"), sm(3.0, "c"), sm(4.0, "d")],
    )
    .unwrap();
    assert_eq!(zs.zremrangebyrank(b"z", 0, 1).unwrap(), 2);
    assert_eq!(members_of(&zs.zrange(b"z", 0, -1).unwrap()), ["c", "d"]);
    assert_eq!(zs.zremrangebyrank(b"z", -1, -1).unwrap(), 1);
    assert_eq!(members_of(&zs.zrange(b"z", 0, -1).unwrap()), ["c"]);
}

#[test]
fn test_zremrangebyscore() {
    let (_dir, zs) = open_store();
    zs.zadd(
        b"z",
        &[sm(1.0, "a"), sm(2.0, "b"), sm(3.0, "c"), sm(4.0, "d")],
    )
    .unwrap();
    assert_eq!(zs.zremrangebyscore(b"z", 2.0, 3.0, true, true).unwrap(), 2);
    assert_eq!(members_of(&zs.zrange(b"z", 0, -1).unwrap()), ["a", "d"]);
    assert_eq!(zs.zremrangebyscore(b"z", 0.0, 10.0, true, true).unwrap(), 2);
    assert!(zs.zrange(b"z", 0, -1).unwrap_err().is_not_found());
}

// ============================================================================
// Expiry, TTL, deletion
// ============================================================================

#[test]
fn test_ttl_lifecycle() {
    let (_dir, zs) = open_store();
    assert_eq!(zs.ttl(b"z").unwrap(), -2);

    zs.zadd(b"z", &[sm(1.0, "a")]).unwrap();
    assert_eq!(zs.ttl(b"z").unwrap(), -1);

    zs.expire(b"z", 100).unwrap();
    let remaining = zs.ttl(b"z").unwrap();
    assert!(remaining > 0 && remaining <= 100);

    zs.persist(b"z").unwrap();
    assert_eq!(zs.ttl(b"z").unwrap(), -1);

    // No timeout to clear anymore.
    let err = zs.persist(b"z").unwrap_err();
    assert!(err.is_not_found() && !err.is_stale());
}

#[test]
fn test_expireat_past_makes_key_stale() {
    let (_dir, zs) = open_store();
    zs.zadd(b"z", &[sm(1.0, "a"), sm(2.0, "b")]).unwrap();
    zs.expireat(b"z", 1).unwrap();

    assert!(zs.zcard(b"z").unwrap_err().is_stale());
    assert!(zs.zrange(b"z", 0, -1).unwrap_err().is_stale());
    assert_eq!(zs.ttl(b"z").unwrap(), -2);
}

#[test]
fn test_expire_nonpositive_ttl_collapses() {
    let (_dir, zs) = open_store();
    zs.zadd(b"z", &[sm(1.0, "a")]).unwrap();
    zs.expire(b"z", 0).unwrap();
    assert!(zs.zcard(b"z").unwrap_err().is_not_found());
}

#[test]
fn test_del_then_reads_not_found() {
    let (_dir, zs) = open_store();
    zs.zadd(b"z", &[sm(1.0, "a"), sm(2.0, "b")]).unwrap();
    zs.del(b"z").unwrap();
    assert!(zs.zcard(b"z").unwrap_err().is_not_found());
    assert!(zs.zscore(b"z", b"a").unwrap_err().is_not_found());
    assert!(zs.del(b"z").unwrap_err().is_not_found());
}

#[test]
fn test_stale_key_reincarnates_on_zadd() {
    let (_dir, zs) = open_store();
    zs.zadd(b"z", &[sm(1.0, "old-a"), sm(2.0, "old-b")]).unwrap();
    zs.expireat(b"z", 1).unwrap();

    // The stale slot is reused with a fresh version: the old members do
    // not resurface.
    assert_eq!(zs.zadd(b"z", &[sm(9.0, "new")]).unwrap(), 1);
    assert_eq!(zs.zcard(b"z").unwrap(), 1);
    assert_eq!(members_of(&zs.zrange(b"z", 0, -1).unwrap()), ["new"]);
    assert_eq!(zs.ttl(b"z").unwrap(), -1);
}

#[test]
fn test_del_bumps_version_so_new_set_is_clean() {
    let (_dir, zs) = open_store();
    zs.zadd(b"z", &[sm(1.0, "a")]).unwrap();
    let v1 = zs.meta(b"z").unwrap().unwrap().version();
    zs.del(b"z").unwrap();
    let v2 = zs.meta(b"z").unwrap().unwrap().version();
    assert!(v2 > v1);

    zs.zadd(b"z", &[sm(5.0, "b")]).unwrap();
    assert_eq!(members_of(&zs.zrange(b"z", 0, -1).unwrap()), ["b"]);
}

// ============================================================================
// Set algebra
// ============================================================================

#[test]
fn test_zunionstore_weights_and_sum() {
    let (_dir, zs) = open_store();
    zs.zadd(b"A", &[sm(1.0, "x"), sm(2.0, "y")]).unwrap();
    zs.zadd(b"B", &[sm(10.0, "y"), sm(20.0, "z")]).unwrap();

    let n = zs
        .zunionstore(b"U", &[b"A".as_slice(), b"B"], &[1.0, 2.0], Aggregate::Sum)
        .unwrap();
    assert_eq!(n, 3);
    assert_eq!(
        zs.zrange(b"U", 0, -1).unwrap(),
        vec![sm(1.0, "x"), sm(22.0, "y"), sm(40.0, "z")]
    );
}

#[test]
fn test_zunionstore_min_max() {
    let (_dir, zs) = open_store();
    zs.zadd(b"A", &[sm(1.0, "m"), sm(5.0, "n")]).unwrap();
    zs.zadd(b"B", &[sm(3.0, "m"), sm(2.0, "n")]).unwrap();

    zs.zunionstore(b"MIN", &[b"A".as_slice(), b"B"], &[], Aggregate::Min)
        .unwrap();
    assert_eq!(
        zs.zrange(b"MIN", 0, -1).unwrap(),
        vec![sm(1.0, "m"), sm(2.0, "n")]
    );

    zs.zunionstore(b"MAX", &[b"A".as_slice(), b"B"], &[], Aggregate::Max)
        .unwrap();
    assert_eq!(
        zs.zrange(b"MAX", 0, -1).unwrap(),
        vec![sm(3.0, "m"), sm(5.0, "n")]
    );
}

#[test]
fn test_zunionstore_single_source_is_identity() {
    let (_dir, zs) = open_store();
    zs.zadd(b"k", &[sm(1.5, "a"), sm(-2.0, "b")]).unwrap();
    let n = zs
        .zunionstore(b"d", &[b"k".as_slice()], &[1.0], Aggregate::Sum)
        .unwrap();
    assert_eq!(n, 2);
    assert_eq!(zs.zrange(b"d", 0, -1).unwrap(), zs.zrange(b"k", 0, -1).unwrap());
}

#[test]
fn test_zunionstore_missing_sources_contribute_nothing() {
    let (_dir, zs) = open_store();
    zs.zadd(b"A", &[sm(1.0, "x")]).unwrap();
    let n = zs
        .zunionstore(b"U", &[b"A".as_slice(), b"missing"], &[], Aggregate::Sum)
        .unwrap();
    assert_eq!(n, 1);
}

#[test]
fn test_zunionstore_overwrites_destination() {
    let (_dir, zs) = open_store();
    zs.zadd(b"U", &[sm(99.0, "stale-member")]).unwrap();
    zs.zadd(b"A", &[sm(1.0, "x")]).unwrap();
    zs.zunionstore(b"U", &[b"A".as_slice()], &[], Aggregate::Sum).unwrap();
    assert_eq!(members_of(&zs.zrange(b"U", 0, -1).unwrap()), ["x"]);
}

#[test]
fn test_zunionstore_normalizes_negative_zero() {
    let (_dir, zs) = open_store();
    zs.zadd(b"A", &[sm(0.0, "zero")]).unwrap();
    zs.zunionstore(b"U", &[b"A".as_slice()], &[-1.0], Aggregate::Sum)
        .unwrap();
    let got = zs.zscore(b"U", b"zero").unwrap();
    assert_eq!(got.to_bits(), 0.0f64.to_bits());
}

#[test]
fn test_zinterstore() {
    let (_dir, zs) = open_store();
    zs.zadd(b"A", &[sm(1.0, "x"), sm(2.0, "y")]).unwrap();
    zs.zadd(b"B", &[sm(10.0, "y"), sm(20.0, "z")]).unwrap();

    let n = zs
        .zinterstore(b"I", &[b"A".as_slice(), b"B"], &[1.0, 2.0], Aggregate::Max)
        .unwrap();
    assert_eq!(n, 1);
    assert_eq!(zs.zrange(b"I", 0, -1).unwrap(), vec![sm(20.0, "y")]);
}

#[test]
fn test_zinterstore_self_with_zero_weight_preserves_scores() {
    let (_dir, zs) = open_store();
    zs.zadd(b"k", &[sm(1.0, "a"), sm(2.5, "b")]).unwrap();
    let n = zs
        .zinterstore(b"d", &[b"k".as_slice(), b"k"], &[1.0, 0.0], Aggregate::Sum)
        .unwrap();
    assert_eq!(n, 2);
    assert_eq!(zs.zrange(b"d", 0, -1).unwrap(), zs.zrange(b"k", 0, -1).unwrap());
}

#[test]
fn test_zinterstore_empty_when_any_source_missing() {
    let (_dir, zs) = open_store();
    zs.zadd(b"A", &[sm(1.0, "x")]).unwrap();
    zs.zadd(b"I", &[sm(9.0, "leftover")]).unwrap();
    let n = zs
        .zinterstore(b"I", &[b"A".as_slice(), b"missing"], &[], Aggregate::Sum)
        .unwrap();
    assert_eq!(n, 0);
    // Destination is still overwritten (now logically empty).
    assert!(zs.zcard(b"I").unwrap_err().is_not_found());
}

#[test]
fn test_zinterstore_requires_keys() {
    let (_dir, zs) = open_store();
    let err = zs.zinterstore(b"I", &[], &[], Aggregate::Sum).unwrap_err();
    assert!(matches!(err, crate::error::Error::Corruption(_)));
}

// ============================================================================
// Keyspace scan / zscan
// ============================================================================

#[test]
fn test_scan_with_pattern_and_budget() {
    let (_dir, zs) = open_store();
    for name in ["alpha", "beta", "gamma", "alpine"] {
        zs.zadd(name.as_bytes(), &[sm(1.0, "m")]).unwrap();
    }
    zs.zadd(b"expired", &[sm(1.0, "m")]).unwrap();
    zs.expireat(b"expired", 1).unwrap();

    let full = zs.scan(b"", b"al*", 100).unwrap();
    assert!(full.finished);
    assert_eq!(full.keys, vec![b"alpha".to_vec(), b"alpine".to_vec()]);

    // Budget of 2 live rows: resumes where it stopped.
    let page = zs.scan(b"", b"*", 2).unwrap();
    assert!(!page.finished);
    assert_eq!(page.keys.len(), 2);
    let rest = zs.scan(&page.next_key, b"*", 100).unwrap();
    assert!(rest.finished);
    assert_eq!(page.keys.len() + rest.keys.len(), 4);
}

#[test]
fn test_scan_key_num_and_scan_keys_skip_stale_and_empty() {
    let (_dir, zs) = open_store();
    zs.zadd(b"live-1", &[sm(1.0, "m")]).unwrap();
    zs.zadd(b"live-2", &[sm(1.0, "m")]).unwrap();
    zs.zadd(b"gone", &[sm(1.0, "m")]).unwrap();
    zs.del(b"gone").unwrap();
    zs.zadd(b"stale", &[sm(1.0, "m")]).unwrap();
    zs.expireat(b"stale", 1).unwrap();

    assert_eq!(zs.scan_key_num().unwrap(), 2);
    assert_eq!(
        zs.scan_keys(b"live-*").unwrap(),
        vec![b"live-1".to_vec(), b"live-2".to_vec()]
    );
}

#[test]
fn test_zscan_paginates_whole_set() {
    let (_dir, zs) = open_store();
    let pairs: Vec<ScoreMember> = (0..25).map(|i| sm(f64::from(i), &format!("m{i:02}"))).collect();
    zs.zadd(b"z", &pairs).unwrap();

    let mut collected = Vec::new();
    let mut cursor = 0;
    loop {
        let (page, next) = zs.zscan(b"z", cursor, b"*", 10).unwrap();
        collected.extend(page);
        if next == 0 {
            break;
        }
        cursor = next;
    }
    assert_eq!(collected.len(), 25);
    // Member-ordered, no duplicates.
    for window in collected.windows(2) {
        assert!(window[0].member < window[1].member);
    }
}

#[test]
fn test_zscan_pattern_filtering() {
    let (_dir, zs) = open_store();
    zs.zadd(
        b"z",
        &[sm(1.0, "apple"), sm(2.0, "banana"), sm(3.0, "avocado")],
    )
    .unwrap();
    let (page, next) = zs.zscan(b"z", 0, b"a*", 100).unwrap();
    assert_eq!(next, 0);
    assert_eq!(members_of(&page), ["apple", "avocado"]);
}

#[test]
fn test_zscan_negative_cursor_is_empty() {
    let (_dir, zs) = open_store();
    zs.zadd(b"z", &[sm(1.0, "a")]).unwrap();
    let (page, next) = zs.zscan(b"z", -3, b"*", 10).unwrap();
    assert!(page.is_empty());
    assert_eq!(next, 0);
}

// ============================================================================
// Cross-family invariants and compaction GC
// ============================================================================

#[test]
fn test_member_and_score_rows_agree_bit_exactly() {
    let (_dir, zs) = open_store();
    zs.zadd(b"z", &[sm(1.25, "a"), sm(-0.0, "b"), sm(3e7, "c")])
        .unwrap();
    let version = zs.meta(b"z").unwrap().unwrap().version();

    let members = member_rows(&zs);
    let scores = score_rows(&zs);
    assert_eq!(members.len(), 3);
    assert_eq!(scores.len(), 3);
    for (user_key, row_version, member, score) in &members {
        assert_eq!(user_key, b"z");
        assert_eq!(*row_version, version);
        let twin = scores
            .iter()
            .find(|(_, _, _, m)| m == member)
            .expect("score row exists for member");
        assert_eq!(twin.2.to_bits(), score.to_bits());
    }
}

#[test]
fn test_meta_count_matches_row_counts() {
    let (_dir, zs) = open_store();
    zs.zadd(b"z", &[sm(1.0, "a"), sm(2.0, "b"), sm(3.0, "c")])
        .unwrap();
    zs.zrem(b"z", &[b"b".as_slice()]).unwrap();

    let meta = zs.meta(b"z").unwrap().unwrap();
    let version = meta.version();
    let live_members = member_rows(&zs)
        .into_iter()
        .filter(|(k, v, _, _)| k == b"z" && *v == version)
        .count();
    let live_scores = score_rows(&zs)
        .into_iter()
        .filter(|(k, v, _, _)| k == b"z" && *v == version)
        .count();
    assert_eq!(meta.count() as usize, live_members);
    assert_eq!(meta.count() as usize, live_scores);
}

#[test]
fn test_compaction_reclaims_superseded_versions() {
    let (_dir, zs) = open_store();
    zs.zadd(b"z", &[sm(1.0, "a"), sm(2.0, "b")]).unwrap();
    let old_version = zs.meta(b"z").unwrap().unwrap().version();
    zs.del(b"z").unwrap();

    // Rows of the old generation are still physically present.
    assert_eq!(member_rows(&zs).len(), 2);
    assert_eq!(score_rows(&zs).len(), 2);

    zs.compact_range(None, None).unwrap();

    let stale_members = member_rows(&zs)
        .into_iter()
        .filter(|(k, v, _, _)| k == b"z" && *v == old_version)
        .count();
    let stale_scores = score_rows(&zs)
        .into_iter()
        .filter(|(k, v, _, _)| k == b"z" && *v == old_version)
        .count();
    assert_eq!(stale_members, 0);
    assert_eq!(stale_scores, 0);
}

#[test]
fn test_compaction_keeps_live_generation() {
    let (_dir, zs) = open_store();
    zs.zadd(b"z", &[sm(1.0, "a"), sm(2.0, "b")]).unwrap();
    zs.compact_range(None, None).unwrap();
    assert_eq!(zs.zcard(b"z").unwrap(), 2);
    assert_eq!(member_rows(&zs).len(), 2);
    assert_eq!(score_rows(&zs).len(), 2);
}

#[test]
fn test_reopen_preserves_data() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("zsets_db");
    {
        let zs = ZSets::open(&path, Config::default()).unwrap();
        zs.zadd(b"z", &[sm(1.0, "a"), sm(2.0, "b")]).unwrap();
    }
    let zs = ZSets::open(&path, Config::default()).unwrap();
    assert_eq!(zs.zcard(b"z").unwrap(), 2);
    assert_eq!(members_of(&zs.zrange(b"z", 0, -1).unwrap()), ["a", "b"]);
}
