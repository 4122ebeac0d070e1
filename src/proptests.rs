use super::*;

use proptest::prelude::*;
use std::collections::BTreeMap;

use crate::scan::{scan, CURSOR_START};

fn validate_tree<V>(t: &RadixTree<V>) {
    let issues = t.verify_integrity();
    assert!(issues.is_empty(), "tree integrity: {issues:?}");
}

fn validate_zset<V>(z: &SortedSet<V>) {
    let issues = z.check_integrity();
    assert!(issues.is_empty(), "sorted set integrity: {issues:?}");
}

#[derive(Clone, Debug)]
enum Op<V> {
    Insert(Vec<u8>, V),
    Remove(Vec<u8>),
    RemovePrefix(Vec<u8>),
    Get(Vec<u8>),
    LongestPrefix(Vec<u8>),
}

fn key_strategy() -> impl Strategy<Value = Vec<u8>> + Clone {
    // A narrow alphabet forces shared prefixes, splits and merges; the wide
    // one covers arbitrary bytes.
    prop_oneof![
        4 => prop::collection::vec(b'a'..=b'd', 0..=6),
        1 => prop::collection::vec(any::<u8>(), 0..=12),
    ]
}

fn ops_strategy() -> impl Strategy<Value = Vec<Op<u64>>> {
    let key = key_strategy();
    let op = prop_oneof![
        50 => (key.clone(), any::<u64>()).prop_map(|(k, v)| Op::Insert(k, v)),
        25 => key.clone().prop_map(Op::Remove),
        3 => key.clone().prop_map(Op::RemovePrefix),
        15 => key.clone().prop_map(Op::Get),
        7 => key.clone().prop_map(Op::LongestPrefix),
    ];
    prop::collection::vec(op, 0..=1000)
}

fn apply(t: &mut RadixTree<u64>, m: &mut BTreeMap<Vec<u8>, u64>, op: Op<u64>) -> Result<(), TestCaseError> {
    match op {
        Op::Insert(key, value) => {
            let old_t = t.insert(&key, value).unwrap();
            let old_m = m.insert(key, value);
            prop_assert_eq!(old_t, old_m);
        }
        Op::Remove(key) => {
            prop_assert_eq!(t.remove(&key), m.remove(key.as_slice()));
        }
        Op::RemovePrefix(prefix) => {
            let doomed: Vec<Vec<u8>> = m.keys().filter(|k| k.starts_with(&prefix)).cloned().collect();
            for k in &doomed {
                m.remove(k);
            }
            prop_assert_eq!(t.remove_prefix(&prefix), doomed.len());
        }
        Op::Get(key) => {
            prop_assert_eq!(t.get(&key).copied(), m.get(key.as_slice()).copied());
        }
        Op::LongestPrefix(key) => {
            let got = t.longest_prefix_match(&key).map(|(k, v)| (k.to_vec(), *v));
            let expected = (0..=key.len())
                .rev()
                .find_map(|n| m.get(&key[..n]).map(|v| (key[..n].to_vec(), *v)));
            prop_assert_eq!(got, expected);
        }
    }
    prop_assert_eq!(t.len(), m.len());
    Ok(())
}

#[derive(Clone, Debug)]
enum ZOp {
    Add(Vec<(f64, Vec<u8>)>),
    Remove(Vec<Vec<u8>>),
}

fn member_strategy() -> impl Strategy<Value = Vec<u8>> + Clone {
    prop::collection::vec(b'a'..=b'e', 1..=3)
}

fn score_strategy() -> impl Strategy<Value = f64> + Clone {
    // Few distinct scores, so buckets are shared, emptied and recreated.
    prop_oneof![
        6 => (-3i32..=3).prop_map(|s| s as f64 * 0.5),
        1 => Just(f64::INFINITY),
        1 => Just(f64::NEG_INFINITY),
        1 => Just(-0.0),
    ]
}

fn zops_strategy() -> impl Strategy<Value = Vec<ZOp>> {
    let add = prop::collection::vec((score_strategy(), member_strategy()), 1..=4).prop_map(ZOp::Add);
    let remove = prop::collection::vec(member_strategy(), 1..=3).prop_map(ZOp::Remove);
    prop::collection::vec(prop_oneof![3 => add, 2 => remove], 0..=300)
}

fn model_order(m: &BTreeMap<Vec<u8>, f64>) -> Vec<(Vec<u8>, f64)> {
    let mut entries: Vec<(Vec<u8>, f64)> = m.iter().map(|(k, s)| (k.clone(), *s)).collect();
    entries.sort_by(|a, b| {
        zset::ScoreKey::new(a.1)
            .cmp(&zset::ScoreKey::new(b.1))
            .then_with(|| a.0.cmp(&b.0))
    });
    entries
}

fn score_range(z: &SortedSet<()>, opts: RangeOptions) -> Vec<(Vec<u8>, f64)> {
    z.range_by_score(ScoreBound::MIN, ScoreBound::MAX, opts.with_scores())
        .into_iter()
        .map(|e| (e.member.to_vec(), e.score.unwrap_or(f64::NAN)))
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        max_shrink_iters: 50_000,
        .. ProptestConfig::default()
    })]

    #[test]
    fn prop_equivalence_u64(ops in ops_strategy()) {
        let mut t: RadixTree<u64> = RadixTree::new();
        let mut m: BTreeMap<Vec<u8>, u64> = BTreeMap::new();

        for op in ops {
            apply(&mut t, &mut m, op)?;
        }

        validate_tree(&t);
        let got: Vec<(Vec<u8>, u64)> = t.iter().map(|(k, v)| (k.to_vec(), *v)).collect();
        let expected: Vec<(Vec<u8>, u64)> = m.iter().map(|(k, v)| (k.clone(), *v)).collect();
        prop_assert_eq!(&got, &expected);

        let mut backward: Vec<(Vec<u8>, u64)> = t.iter().rev().map(|(k, v)| (k.to_vec(), *v)).collect();
        backward.reverse();
        prop_assert_eq!(backward, expected);
    }

    #[test]
    fn prop_prefix_containment(
        keys in prop::collection::btree_set(key_strategy(), 0..=200),
        prefix in key_strategy(),
    ) {
        let mut t: RadixTree<()> = RadixTree::new();
        for k in &keys {
            t.insert(k, ()).unwrap();
        }

        let got: Vec<Vec<u8>> = t.iter_prefix(&prefix).map(|(k, _)| k.to_vec()).collect();
        let expected: Vec<Vec<u8>> = keys.iter().filter(|k| k.starts_with(&prefix)).cloned().collect();
        prop_assert_eq!(&got, &expected);

        let got_rev: Vec<Vec<u8>> = t.iter_prefix(&prefix).rev().map(|(k, _)| k.to_vec()).collect();
        let mut expected_rev = expected.clone();
        expected_rev.reverse();
        prop_assert_eq!(got_rev, expected_rev);

        let from: Vec<Vec<u8>> = t.range_from(&prefix).map(|(k, _)| k.to_vec()).collect();
        let expected_from: Vec<Vec<u8>> = keys.range(prefix.clone()..).cloned().collect();
        prop_assert_eq!(from, expected_from);

        let removed = t.remove_prefix(&prefix);
        prop_assert_eq!(removed, expected.len());
        prop_assert_eq!(t.len(), keys.len() - removed);
        prop_assert!(t.iter_prefix(&prefix).next().is_none());
        validate_tree(&t);
    }

    #[test]
    fn prop_clone_is_isolated(ops in ops_strategy(), later in ops_strategy()) {
        let mut t: RadixTree<u64> = RadixTree::new();
        let mut m: BTreeMap<Vec<u8>, u64> = BTreeMap::new();
        for op in ops {
            apply(&mut t, &mut m, op)?;
        }

        let snapshot = t.clone();
        let mut scratch = m.clone();
        for op in later {
            apply(&mut t, &mut scratch, op)?;
        }

        validate_tree(&snapshot);
        validate_tree(&t);
        let got: Vec<(Vec<u8>, u64)> = snapshot.iter().map(|(k, v)| (k.to_vec(), *v)).collect();
        let expected: Vec<(Vec<u8>, u64)> = m.into_iter().collect();
        prop_assert_eq!(got, expected);
    }

    #[test]
    fn prop_scan_resumption(
        keys in prop::collection::btree_set(key_strategy(), 0..=120),
        prefix in prop::collection::vec(b'a'..=b'd', 0..=1),
    ) {
        let mut t: RadixTree<()> = RadixTree::new();
        for k in &keys {
            t.insert(k, ()).unwrap();
        }
        let mut hashes: Vec<u32> = keys.iter().map(|k| scan::cursor_hash(k)).collect();
        hashes.sort_unstable();
        hashes.dedup();
        prop_assume!(hashes.len() == keys.len());

        let whole = scan(&t, CURSOR_START, &prefix, usize::MAX);
        prop_assert!(whole.is_done());

        let mut paged = Vec::new();
        let mut cursor = CURSOR_START;
        loop {
            let page = scan(&t, cursor, &prefix, 1);
            paged.extend(page.entries.iter().map(|(k, _)| k.to_vec()));
            if page.is_done() {
                break;
            }
            cursor = page.cursor;
        }
        let expected: Vec<Vec<u8>> = whole.entries.iter().map(|(k, _)| k.to_vec()).collect();
        prop_assert_eq!(paged, expected);
    }

    #[test]
    fn prop_zset_global_order(ops in zops_strategy()) {
        let mut z: SortedSet<()> = SortedSet::new();
        let mut m: BTreeMap<Vec<u8>, f64> = BTreeMap::new();

        for op in ops {
            match op {
                ZOp::Add(items) => {
                    let fresh = {
                        let mut seen = std::collections::BTreeSet::new();
                        items.iter().filter(|(_, k)| !m.contains_key(k) && seen.insert(k.clone())).count()
                    };
                    let added = z.add(items.iter().map(|(s, k)| (*s, k.as_slice(), ()))).unwrap();
                    prop_assert_eq!(added, fresh);
                    for (s, k) in items {
                        m.insert(k, s);
                    }
                }
                ZOp::Remove(members) => {
                    let expected = {
                        let mut seen = std::collections::BTreeSet::new();
                        members.iter().filter(|k| m.contains_key(*k) && seen.insert((*k).clone())).count()
                    };
                    prop_assert_eq!(z.remove(members.iter()), expected);
                    for k in &members {
                        m.remove(k);
                    }
                }
            }
            validate_zset(&z);
            prop_assert_eq!(z.card(), m.len());
        }

        let expected = model_order(&m);
        let forward = score_range(&z, RangeOptions::default());
        prop_assert_eq!(&forward, &expected);

        let mut backward = score_range(&z, RangeOptions::default().rev());
        backward.reverse();
        prop_assert_eq!(&backward, &expected);

        let lex: Vec<Vec<u8>> = z.range_by_lex(b"", RangeOptions::default()).iter().map(|e| e.member.to_vec()).collect();
        let model_lex: Vec<Vec<u8>> = m.keys().cloned().collect();
        prop_assert_eq!(lex, model_lex);
    }

    #[test]
    fn prop_zset_score_window(
        items in prop::collection::vec((score_strategy(), member_strategy()), 0..=60),
        lo in -4i32..=4,
        hi in -4i32..=4,
        lo_open in any::<bool>(),
        hi_open in any::<bool>(),
        offset in 0usize..4,
        count in 0usize..6,
    ) {
        let mut z: SortedSet<()> = SortedSet::new();
        let mut m: BTreeMap<Vec<u8>, f64> = BTreeMap::new();
        z.add(items.iter().map(|(s, k)| (*s, k.as_slice(), ()))).unwrap();
        for (s, k) in items {
            m.insert(k, s);
        }

        let (lo, hi) = (lo as f64 * 0.5, hi as f64 * 0.5);
        let min = if lo_open { ScoreBound::Exclusive(lo) } else { ScoreBound::Inclusive(lo) };
        let max = if hi_open { ScoreBound::Exclusive(hi) } else { ScoreBound::Inclusive(hi) };

        let window: Vec<Vec<u8>> = model_order(&m)
            .into_iter()
            .filter(|(_, s)| min.admits_from_below(*s) && max.admits_from_above(*s))
            .map(|(k, _)| k)
            .collect();

        let opts = RangeOptions::default().limit(offset, count);
        let got: Vec<Vec<u8>> = z.range_by_score(min, max, opts).iter().map(|e| e.member.to_vec()).collect();
        let expected: Vec<Vec<u8>> = window.iter().skip(offset).take(count).cloned().collect();
        prop_assert_eq!(got, expected);

        let got_rev: Vec<Vec<u8>> = z.range_by_score(min, max, opts.rev()).iter().map(|e| e.member.to_vec()).collect();
        let expected_rev: Vec<Vec<u8>> = window.iter().rev().skip(offset).take(count).cloned().collect();
        prop_assert_eq!(got_rev, expected_rev);
    }
}

fn for_each_permutation<T: Clone>(items: &[T], mut f: impl FnMut(Vec<T>)) {
    fn rec<T: Clone>(items: &[T], used: &mut [bool], out: &mut Vec<T>, f: &mut impl FnMut(Vec<T>)) {
        if out.len() == items.len() {
            f(out.clone());
            return;
        }
        for i in 0..items.len() {
            if used[i] {
                continue;
            }
            used[i] = true;
            out.push(items[i].clone());
            rec(items, used, out, f);
            out.pop();
            used[i] = false;
        }
    }

    let mut used = vec![false; items.len()];
    let mut out = Vec::with_capacity(items.len());
    rec(items, &mut used, &mut out, &mut f);
}

fn small_keys() -> Vec<Vec<u8>> {
    vec![
        b"".to_vec(),
        b"a".to_vec(),
        b"b".to_vec(),
        b"aa".to_vec(),
        b"ab".to_vec(),
        b"abc".to_vec(),
        b"ba".to_vec(),
    ]
}

#[test]
fn exhaustive_insert_order_small_set() {
    let keys = small_keys();

    for_each_permutation(&keys, |perm| {
        let mut t: RadixTree<u64> = RadixTree::new();
        let mut m: BTreeMap<Vec<u8>, u64> = BTreeMap::new();

        for (i, k) in perm.into_iter().enumerate() {
            let v = i as u64;
            assert_eq!(t.insert(&k, v).unwrap(), m.insert(k, v));
        }

        validate_tree(&t);
        let got: Vec<(Vec<u8>, u64)> = t.iter().map(|(k, v)| (k.to_vec(), *v)).collect();
        let expected: Vec<(Vec<u8>, u64)> = m.iter().map(|(k, v)| (k.clone(), *v)).collect();
        assert_eq!(got, expected);
    });
}

#[test]
fn exhaustive_remove_order_small_set() {
    let keys = small_keys();

    // Insert in a fixed order, then remove in all permutations.
    let mut base_tree: RadixTree<u64> = RadixTree::new();
    let mut base_map: BTreeMap<Vec<u8>, u64> = BTreeMap::new();
    for (i, k) in keys.iter().enumerate() {
        let v = i as u64;
        assert_eq!(base_tree.insert(k, v).unwrap(), base_map.insert(k.clone(), v));
    }

    for_each_permutation(&keys, |perm| {
        let mut t = base_tree.clone();
        let mut m = base_map.clone();

        for k in perm {
            assert_eq!(t.remove(&k), m.remove(k.as_slice()));
            assert_eq!(t.len(), m.len());
            validate_tree(&t);
        }
        assert_eq!(t.len(), 0);
        assert!(t.first().is_none());
    });
    validate_tree(&base_tree);
    assert_eq!(base_tree.len(), keys.len());
}

#[test]
fn exhaustive_zset_removal_order() {
    let members: Vec<(f64, &str)> = vec![(1.0, "a"), (1.0, "b"), (2.0, "c"), (0.0, "d"), (2.0, "e"), (3.0, "f")];

    let mut base: SortedSet<()> = SortedSet::new();
    base.add(members.iter().map(|(s, m)| (*s, *m, ()))).unwrap();
    validate_zset(&base);

    for_each_permutation(&members, |perm| {
        let mut z = base.clone();
        let mut left: Vec<(f64, &str)> = members.clone();
        for (_, member) in perm {
            assert_eq!(z.remove([member]), 1);
            left.retain(|(_, m)| *m != member);
            validate_zset(&z);

            let mut expected = left.clone();
            expected.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(b.1)));
            let got: Vec<String> = z
                .iter()
                .map(|(m, _)| String::from_utf8_lossy(m).into_owned())
                .collect();
            let expected: Vec<String> = expected.iter().map(|(_, m)| m.to_string()).collect();
            assert_eq!(got, expected);
        }
        assert!(z.is_empty());
    });
}
