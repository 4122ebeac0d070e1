//! Sorted sets.
//!
//! A [`SortedSet`] keeps every member twice:
//! - in a lexicographic index mapping member to score and payload,
//! - in the score bucket for its exact score, a small trie keyed by member.
//!
//! Buckets are indexed by the big-endian bytes of their [`ScoreKey`] in a
//! [`RadixTree`], so the bucket index is ordered by score and shares
//! structure with snapshots like every other tree.
//!
//! All bucket tries allocate leaves from one shared arena. Their chains are
//! spliced at the bucket boundaries, so walking `next` from the lowest
//! bucket's first leaf visits every member by (score, member) order without
//! touching the bucket map again.

mod score;

use std::fmt;

use tracing::trace;

use crate::error::Result;
use crate::tree::trie::Trie;
use crate::tree::{Iter, LeafArena, LeafId, RadixTree};

pub use score::{check_score, parse_score, parse_score_bound, ScoreBound, ScoreKey};

/// A member's score and payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Scored<V> {
    pub score: f64,
    pub payload: V,
}

/// Paging and presentation for range queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RangeOptions {
    /// Matching entries to skip first.
    pub offset: usize,
    /// Entries to return; `None` for all.
    pub count: Option<usize>,
    /// Attach each member's score.
    pub with_scores: bool,
    /// Walk from the high end.
    pub reverse: bool,
}

impl RangeOptions {
    pub fn limit(mut self, offset: usize, count: usize) -> Self {
        self.offset = offset;
        self.count = Some(count);
        self
    }

    pub fn with_scores(mut self) -> Self {
        self.with_scores = true;
        self
    }

    pub fn rev(mut self) -> Self {
        self.reverse = true;
        self
    }
}

/// One entry of a range result.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeEntry<'a, V> {
    pub member: &'a [u8],
    pub score: Option<f64>,
    pub payload: &'a V,
}

#[derive(Clone)]
pub struct SortedSet<V> {
    by_lex: RadixTree<Scored<V>>,
    buckets: RadixTree<Trie>,
    chain: LeafArena<Scored<V>>,
}

impl<V> SortedSet<V> {
    pub fn new() -> Self {
        Self::with_max_member_len(crate::config::DEFAULT_MAX_KEY_LEN)
    }

    pub fn with_max_member_len(max_member_len: usize) -> Self {
        Self {
            by_lex: RadixTree::with_max_key_len(max_member_len),
            buckets: RadixTree::new(),
            chain: LeafArena::new(),
        }
    }

    /// Number of members.
    pub fn card(&self) -> usize {
        self.by_lex.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_lex.is_empty()
    }

    /// Number of distinct scores.
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn score_of(&self, member: &[u8]) -> Option<f64> {
        self.by_lex.get(member).map(|s| s.score)
    }

    pub fn get(&self, member: &[u8]) -> Option<&Scored<V>> {
        self.by_lex.get(member)
    }

    /// Lowest-scored member.
    pub fn first(&self) -> Option<(&[u8], &Scored<V>)> {
        self.iter().next()
    }

    /// Highest-scored member.
    pub fn last(&self) -> Option<(&[u8], &Scored<V>)> {
        self.iter().next_back()
    }

    /// Every member by (score, member) order, following the spliced chain.
    pub fn iter(&self) -> Iter<'_, Scored<V>> {
        match self.bounds() {
            Some((first, last)) => Iter::new(&self.chain, first, last),
            None => Iter::empty(&self.chain),
        }
    }

    /// Members starting with `prefix`, in member order.
    pub fn range_by_lex(&self, prefix: &[u8], opts: RangeOptions) -> Vec<RangeEntry<'_, V>> {
        let iter = self.by_lex.iter_prefix(prefix);
        if opts.reverse {
            Self::page(iter.rev(), opts)
        } else {
            Self::page(iter, opts)
        }
    }

    /// Members with a score inside `[min, max]`, each end inclusive or
    /// exclusive per its bound.
    ///
    /// Positions once through the bucket map, then walks the chain across
    /// bucket boundaries until the score leaves the range.
    pub fn range_by_score(&self, min: ScoreBound, max: ScoreBound, opts: RangeOptions) -> Vec<RangeEntry<'_, V>> {
        let Some((first, last)) = self.bounds() else {
            return Vec::new();
        };
        if min.is_nan() || max.is_nan() || min.value() > max.value() {
            return Vec::new();
        }

        if opts.reverse {
            let Some(start) = self
                .buckets
                .range_to_rev(&ScoreKey::new(max.value()).to_bytes())
                .next()
                .map(|(_, bucket)| bucket.root.max)
            else {
                return Vec::new();
            };
            let walk = Iter::new(&self.chain, first, start)
                .rev()
                .skip_while(|(_, s)| !max.admits_from_above(s.score))
                .take_while(|(_, s)| min.admits_from_below(s.score));
            Self::page(walk, opts)
        } else {
            let Some(start) = self
                .buckets
                .range_from(&ScoreKey::new(min.value()).to_bytes())
                .next()
                .map(|(_, bucket)| bucket.root.min)
            else {
                return Vec::new();
            };
            let walk = Iter::new(&self.chain, start, last)
                .skip_while(|(_, s)| !min.admits_from_below(s.score))
                .take_while(|(_, s)| max.admits_from_above(s.score));
            Self::page(walk, opts)
        }
    }

    /// Nodes and leaf tables not shared with `earlier`, an older version of
    /// this set. Score bucket tries count through the chain they share.
    pub fn copied_since(&self, earlier: &Self) -> usize {
        self.by_lex.copied_since(&earlier.by_lex)
            + self.buckets.copied_since(&earlier.buckets)
            + self.chain.copied_since(&earlier.chain)
    }

    /// First leaf of the lowest bucket and last leaf of the highest.
    fn bounds(&self) -> Option<(LeafId, LeafId)> {
        let first = self.buckets.first()?.1.first()?;
        let last = self.buckets.last()?.1.last()?;
        Some((first, last))
    }

    fn page<'a>(
        iter: impl Iterator<Item = (&'a [u8], &'a Scored<V>)>,
        opts: RangeOptions,
    ) -> Vec<RangeEntry<'a, V>>
    where
        V: 'a,
    {
        iter.skip(opts.offset)
            .take(opts.count.unwrap_or(usize::MAX))
            .map(|(member, scored)| RangeEntry {
                member,
                score: opts.with_scores.then_some(scored.score),
                payload: &scored.payload,
            })
            .collect()
    }

    /// Check bucket structure, index agreement and the spliced chain.
    /// Returns a list of issues, empty when consistent.
    pub fn check_integrity(&self) -> Vec<String> {
        let mut issues: Vec<String> = self
            .by_lex
            .verify_integrity()
            .into_iter()
            .map(|issue| format!("lex index: {issue}"))
            .collect();

        let mut bucket_total = 0;
        for (bytes, bucket) in &self.buckets {
            let Some(key) = ScoreKey::from_bytes(bytes) else {
                issues.push(format!("bucket index holds a {}-byte key", bytes.len()));
                continue;
            };
            if bucket.is_empty() {
                issues.push(format!("empty bucket {key:?} kept in the score index"));
                continue;
            }
            bucket_total += bucket.len;
            for issue in bucket.verify(&self.chain) {
                issues.push(format!("bucket {key:?}: {issue}"));
            }
            let (first, last) = (bucket.root.min, bucket.root.max);
            for (member, scored) in Iter::new(&self.chain, first, last) {
                if ScoreKey::new(scored.score) != key {
                    issues.push(format!("member {member:?} with score {} in bucket {key:?}", scored.score));
                }
                match self.by_lex.get(member) {
                    Some(indexed) if indexed.score == scored.score => {}
                    Some(indexed) => issues.push(format!(
                        "member {member:?} scored {} in its bucket but {} in the lex index",
                        scored.score, indexed.score
                    )),
                    None => issues.push(format!("member {member:?} missing from the lex index")),
                }
            }
        }
        if bucket_total != self.card() {
            issues.push(format!("buckets hold {} members, lex index {}", bucket_total, self.card()));
        }
        if self.chain.live() != bucket_total {
            issues.push(format!("chain arena holds {} leaves for {} members", self.chain.live(), bucket_total));
        }

        self.check_chain(&mut issues);
        issues
    }

    fn check_chain(&self, issues: &mut Vec<String>) {
        let Some((mut cur, _)) = self.bounds() else {
            return;
        };
        if !self.chain.prev_of(cur).is_null() {
            issues.push("lowest member has a predecessor".to_string());
        }

        let mut visited = 1;
        loop {
            let next = self.chain.next_of(cur);
            if next.is_null() {
                break;
            }
            if self.chain.prev_of(next) != cur {
                issues.push(format!("broken prev link at {:?}", self.chain.get(next).key()));
            }
            let (a, b) = (self.chain.get(cur), self.chain.get(next));
            let ordered = (ScoreKey::new(a.value().score), a.key()) < (ScoreKey::new(b.value().score), b.key());
            if !ordered {
                issues.push(format!("chain out of order at {:?}", b.key()));
            }
            visited += 1;
            if visited > self.card() {
                issues.push("chain visits more leaves than there are members".to_string());
                return;
            }
            cur = next;
        }
        if visited != self.card() {
            issues.push(format!("chain visits {} of {} members", visited, self.card()));
        }
    }
}

impl<V: Clone> SortedSet<V> {
    /// Add or update members. Returns how many were not present before.
    ///
    /// The whole batch is validated first; a NaN score or an oversized member
    /// rejects it with nothing applied. A member re-added at its current
    /// score gets the new payload in place; at a different score it moves to
    /// the other bucket.
    pub fn add<M: AsRef<[u8]>>(&mut self, items: impl IntoIterator<Item = (f64, M, V)>) -> Result<usize> {
        let items: Vec<_> = items.into_iter().collect();
        for (score, member, _) in &items {
            check_score(*score)?;
            self.by_lex.check_key(member.as_ref())?;
        }

        let mut added = 0;
        for (score, member, payload) in items {
            if self.insert_one(score, member.as_ref(), payload) {
                added += 1;
            }
        }
        Ok(added)
    }

    /// Add or update one member. Returns whether it is new.
    pub fn insert(&mut self, score: f64, member: &[u8], payload: V) -> Result<bool> {
        check_score(score)?;
        self.by_lex.check_key(member)?;
        Ok(self.insert_one(score, member, payload))
    }

    fn insert_one(&mut self, score: f64, member: &[u8], payload: V) -> bool {
        let key = ScoreKey::new(score);
        let scored = Scored { score, payload };

        let is_new = match self.by_lex.get(member).map(|old| ScoreKey::new(old.score)) {
            Some(old_key) if old_key == key => {
                bucket_mut(&mut self.buckets, key).insert(&mut self.chain, member, scored.clone());
                false
            }
            Some(old_key) => {
                self.remove_from_bucket(old_key, member);
                self.insert_into_bucket(key, member, scored.clone());
                false
            }
            None => {
                self.insert_into_bucket(key, member, scored.clone());
                true
            }
        };

        // The member length was checked by the caller.
        let _ = self.by_lex.insert(member, scored);
        is_new
    }

    /// Remove members. Returns how many were present.
    pub fn remove<M: AsRef<[u8]>>(&mut self, members: impl IntoIterator<Item = M>) -> usize {
        members
            .into_iter()
            .filter(|member| self.remove_one(member.as_ref()).is_some())
            .count()
    }

    /// Remove one member, returning its score and payload.
    pub fn remove_one(&mut self, member: &[u8]) -> Option<Scored<V>> {
        let scored = self.by_lex.remove(member)?;
        self.remove_from_bucket(ScoreKey::new(scored.score), member);
        Some(scored)
    }

    fn insert_into_bucket(&mut self, key: ScoreKey, member: &[u8], scored: Scored<V>) {
        if !self.buckets.contains_key(&key.to_bytes()) {
            trace!(score = key.score(), "creating score bucket");
            // Eight-byte keys are always within the length limit.
            let _ = self.buckets.insert(&key.to_bytes(), Trie::new());
        }
        let replaced = bucket_mut(&mut self.buckets, key).insert(&mut self.chain, member, scored);
        debug_assert!(replaced.is_none(), "member already present in its new bucket");
        self.relink(key);
    }

    fn remove_from_bucket(&mut self, key: ScoreKey, member: &[u8]) {
        let bucket = bucket_mut(&mut self.buckets, key);
        let removed = bucket.remove(&mut self.chain, member);
        assert!(removed.is_some(), "member missing from its score bucket");

        if bucket.is_empty() {
            self.buckets.remove(&key.to_bytes());
            let (pred, succ) = self.outer_neighbors(key);
            trace!(score = key.score(), "dropping empty score bucket");
            self.chain.join(pred, succ);
        } else {
            self.relink(key);
        }
    }

    /// Connect bucket `key` to the last leaf of the bucket below it and the
    /// first leaf of the bucket above it.
    fn relink(&mut self, key: ScoreKey) {
        let (first, last) = match self.buckets.get(&key.to_bytes()) {
            Some(bucket) => (bucket.root.min, bucket.root.max),
            None => panic!("no score bucket for {key:?}"),
        };
        let (pred, succ) = self.outer_neighbors(key);
        self.chain.join(pred, first);
        self.chain.join(last, succ);
    }

    /// Last leaf of the closest lower bucket and first leaf of the closest
    /// higher bucket, NULL where there is none.
    fn outer_neighbors(&self, key: ScoreKey) -> (LeafId, LeafId) {
        let bytes = key.to_bytes();
        let pred = self
            .buckets
            .range_to_rev(&bytes)
            .find(|(k, _)| *k != &bytes[..])
            .map_or(LeafId::NULL, |(_, bucket)| bucket.root.max);
        let succ = self
            .buckets
            .range_from(&bytes)
            .find(|(k, _)| *k != &bytes[..])
            .map_or(LeafId::NULL, |(_, bucket)| bucket.root.min);
        (pred, succ)
    }
}

fn bucket_mut(buckets: &mut RadixTree<Trie>, key: ScoreKey) -> &mut Trie {
    buckets
        .get_mut(&key.to_bytes())
        .unwrap_or_else(|| panic!("no score bucket for {key:?}"))
}

impl<V> Default for SortedSet<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: fmt::Debug> fmt::Debug for SortedSet<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.iter().map(|(m, s)| (String::from_utf8_lossy(m), s.score)))
            .finish()
    }
}
